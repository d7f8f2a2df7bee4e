//! Event queue and the serial engine loop.
//!
//! Two actors: the ingress reader (blocking on the socket) pushes normalized
//! events; the engine task pops and processes them one at a time in arrival
//! order. The queue is bounded; under pressure the oldest depth snapshot is
//! dropped first — depth is refreshable, trades and reconciliation events
//! are not.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::engine::MakerEngine;
use crate::sink::OrderSink;
use crate::types::EngineEvent;

/// Bounded multi-producer event queue with depth-shedding backpressure.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<VecDeque<EngineEvent>>,
    notify: Notify,
    capacity: usize,
    depth_drops: AtomicU64,
    /// Events rejected outright because the queue was full of non-droppable
    /// events.
    rejected: AtomicU64,
    closed: AtomicBool,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            depth_drops: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue one event. When full, the oldest queued depth snapshot is
    /// evicted to make room; if none exists and the incoming event is itself
    /// a depth snapshot it is dropped, otherwise the oldest event gives way.
    ///
    /// Returns false when the event was not enqueued.
    pub fn push(&self, event: EngineEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut queue = self.inner.lock().expect("event queue poisoned");
        if queue.len() >= self.capacity {
            if let Some(pos) = queue.iter().position(|e| e.is_depth()) {
                queue.remove(pos);
                self.depth_drops.fetch_add(1, Ordering::Relaxed);
            } else if event.is_depth() {
                self.depth_drops.fetch_add(1, Ordering::Relaxed);
                return false;
            } else {
                // Queue solid with trades/reconciliation: shed the oldest to
                // keep the stream moving rather than stall the socket.
                queue.pop_front();
                self.rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Pop the next event, waiting until one arrives or the queue closes.
    /// Returns `None` once closed and drained.
    pub async fn pop(&self) -> Option<EngineEvent> {
        loop {
            // Register for wakeups before the emptiness check so a push or
            // close landing in between cannot be lost.
            let notified = self.notify.notified();
            {
                let mut queue = self.inner.lock().expect("event queue poisoned");
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking pop for drain loops.
    pub fn try_pop(&self) -> Option<EngineEvent> {
        self.inner
            .lock()
            .expect("event queue poisoned")
            .pop_front()
    }

    /// Stop accepting new events; `pop` returns `None` once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth snapshots shed under backpressure.
    pub fn depth_drops(&self) -> u64 {
        self.depth_drops.load(Ordering::Relaxed)
    }

    /// Non-depth events shed or refused.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Drive the engine from the queue until it closes, then drain.
///
/// On shutdown the queue is drained best-effort within `drain_deadline`, a
/// final CLOSE_ALL is emitted when the engine is configured to flatten, and
/// the function returns the number of events processed.
pub async fn run_engine_loop<S: OrderSink>(
    engine: &mut MakerEngine<S>,
    queue: &EventQueue,
    drain_deadline: Duration,
) -> u64 {
    let mut processed: u64 = 0;

    while let Some(event) = queue.pop().await {
        engine.on_event(&event);
        processed += 1;
    }

    // Closed: drain what is left, bounded.
    let drain_until = tokio::time::Instant::now() + drain_deadline;
    while tokio::time::Instant::now() < drain_until {
        match queue.try_pop() {
            Some(event) => {
                engine.on_event(&event);
                processed += 1;
            }
            None => break,
        }
    }
    let leftover = queue.len();
    if leftover > 0 {
        warn!(
            target: "index_maker::runtime",
            leftover,
            "drain deadline hit with events still queued"
        );
    }

    if engine.config().flatten_on_shutdown {
        info!(target: "index_maker::runtime", "flattening on shutdown");
        engine.flatten_all();
    }

    debug!(
        target: "index_maker::runtime",
        processed,
        depth_drops = queue.depth_drops(),
        "engine loop finished"
    );
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomSnapshot, TickEvent};
    use smallvec::smallvec;

    fn tick(t_ms: u64) -> EngineEvent {
        EngineEvent::Tick(TickEvent {
            t_ms,
            es: 6800.0,
            nq: None,
            ym: None,
            btc: None,
        })
    }

    fn dom(t_ms: u64) -> EngineEvent {
        EngineEvent::Dom(DomSnapshot {
            t_ms,
            best_bid: 6800.0,
            best_ask: 6800.25,
            bids: smallvec![(6800.0, 10.0)],
            asks: smallvec![(6800.25, 10.0)],
        })
    }

    #[test]
    fn test_fifo_order_preserved() {
        let queue = EventQueue::new(8);
        queue.push(tick(1));
        queue.push(dom(2));
        queue.push(tick(3));
        assert_eq!(queue.try_pop().unwrap().t_ms(), 1);
        assert_eq!(queue.try_pop().unwrap().t_ms(), 2);
        assert_eq!(queue.try_pop().unwrap().t_ms(), 3);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_full_queue_sheds_oldest_depth_first() {
        let queue = EventQueue::new(3);
        queue.push(tick(1));
        queue.push(dom(2));
        queue.push(tick(3));
        // Full: the depth snapshot at t=2 must give way, trades survive.
        assert!(queue.push(tick(4)));
        assert_eq!(queue.depth_drops(), 1);

        let times: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.t_ms())
            .collect();
        assert_eq!(times, vec![1, 3, 4]);
    }

    #[test]
    fn test_incoming_depth_dropped_when_full_of_trades() {
        let queue = EventQueue::new(2);
        queue.push(tick(1));
        queue.push(tick(2));
        assert!(!queue.push(dom(3)));
        assert_eq!(queue.depth_drops(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_closed_queue_refuses_pushes() {
        let queue = EventQueue::new(4);
        queue.push(tick(1));
        queue.close();
        assert!(!queue.push(tick(2)));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close_and_drain() {
        let queue = EventQueue::new(4);
        queue.push(tick(1));
        queue.close();
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        use std::sync::Arc;

        let queue = Arc::new(EventQueue::new(4));
        let popper = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(tick(42));
        let event = popper.await.unwrap().unwrap();
        assert_eq!(event.t_ms(), 42);
    }
}
