//! Frame-to-event normalization and the per-symbol state cache.
//!
//! The normalizer is the single writer of the price cache. It runs on the
//! ingress actor; the engine receives value-copied events through the queue
//! and never touches ingress state.

use smallvec::SmallVec;
use tracing::debug;

use crate::errors::FrameError;
use crate::types::{DomSnapshot, EngineEvent, TickEvent, TradeEvent};

use super::frame::{dotnet_ticks_to_unix_ms, Frame};
use super::Instrument;

/// Per-symbol feed liveness, derived from frame watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressHealth {
    pub es_ok: bool,
    pub nq_ok: bool,
    pub ym_ok: bool,
    pub btc_ok: bool,
}

impl IngressHealth {
    /// Connection status line for operators, one token per symbol.
    pub fn summary(&self) -> String {
        let token = |name: &str, ok: bool| format!("{name}:{}", if ok { "OK" } else { "--" });
        [
            token("ES", self.es_ok),
            token("NQ", self.nq_ok),
            token("YM", self.ym_ok),
            token("BTC", self.btc_ok),
        ]
        .join(" | ")
    }
}

/// Turns raw wire frames into typed engine events.
#[derive(Debug, Default)]
pub struct IngressNormalizer {
    /// Last trade price per instrument: ES, NQ, YM, BTC.
    last_price: [Option<f64>; 4],
    /// Last frame wall-clock per instrument (trades, depth, heartbeats).
    last_seen_ms: [Option<u64>; 4],
    /// Monotonic floor for emitted event timestamps.
    last_emitted_ms: u64,
    malformed: u64,
    frames_ok: u64,
    /// Depth frames skipped because one side of the book was empty.
    unusable_depth: u64,
}

impl IngressNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one wire frame.
    ///
    /// Returns the events to feed the engine, in order. Malformed frames are
    /// counted and produce nothing; the ingress loop never fails.
    pub fn on_frame(&mut self, line: &str, wall_ms: u64) -> SmallVec<[EngineEvent; 2]> {
        let mut events = SmallVec::new();

        let frame = match Frame::parse(line) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed += 1;
                self.log_malformed(line, &err);
                return events;
            }
        };
        self.frames_ok += 1;

        match frame {
            Frame::Trade {
                symbol,
                price,
                volume,
                side,
                exch_ticks,
            } => {
                let instrument = Instrument::classify(&symbol);
                let Some(idx) = instrument.cache_index() else {
                    return events;
                };
                if price <= 0.0 || volume <= 0.0 {
                    self.malformed += 1;
                    return events;
                }
                let t_ms = self.stamp(exch_ticks.map(dotnet_ticks_to_unix_ms), wall_ms);
                self.last_price[idx] = Some(price);
                self.last_seen_ms[idx] = Some(wall_ms);

                if instrument == Instrument::Es {
                    events.push(EngineEvent::Trade(TradeEvent {
                        t_ms,
                        instrument,
                        price,
                        volume,
                        aggressor: side,
                    }));
                }
                // Every lead/correlator print refreshes the composite tick.
                if let Some(es) = self.last_price[0] {
                    events.push(EngineEvent::Tick(TickEvent {
                        t_ms,
                        es,
                        nq: self.last_price[1],
                        ym: self.last_price[2],
                        btc: self.last_price[3],
                    }));
                }
            }
            Frame::Depth {
                symbol,
                bids,
                asks,
                exch_ticks,
            } => {
                let instrument = Instrument::classify(&symbol);
                let Some(idx) = instrument.cache_index() else {
                    return events;
                };
                self.last_seen_ms[idx] = Some(wall_ms);
                if instrument != Instrument::Es {
                    return events;
                }
                let (Some(&(best_bid, _)), Some(&(best_ask, _))) =
                    (bids.first(), asks.first())
                else {
                    self.unusable_depth += 1;
                    return events;
                };
                let t_ms = self.stamp(exch_ticks.map(dotnet_ticks_to_unix_ms), wall_ms);
                events.push(EngineEvent::Dom(DomSnapshot {
                    t_ms,
                    best_bid,
                    best_ask,
                    bids,
                    asks,
                }));
            }
            Frame::Heartbeat { symbol, .. } => {
                if let Some(idx) = Instrument::classify(&symbol).cache_index() {
                    self.last_seen_ms[idx] = Some(wall_ms);
                }
            }
            Frame::Position {
                symbol,
                signed_volume,
            } => {
                if Instrument::classify(&symbol) == Instrument::Es {
                    let t_ms = self.stamp(None, wall_ms);
                    events.push(EngineEvent::Position {
                        t_ms,
                        signed_volume,
                    });
                }
            }
            Frame::MonitoredLimit { symbol, price } => {
                if Instrument::classify(&symbol) == Instrument::Es {
                    let t_ms = self.stamp(None, wall_ms);
                    events.push(EngineEvent::MonitoredLimit { t_ms, price });
                }
            }
        }

        events
    }

    /// Pick the event timestamp, enforcing per-stream monotonicity.
    fn stamp(&mut self, venue_ms: Option<u64>, wall_ms: u64) -> u64 {
        let t = venue_ms.unwrap_or(wall_ms).max(self.last_emitted_ms);
        self.last_emitted_ms = t;
        t
    }

    fn log_malformed(&self, line: &str, err: &FrameError) {
        // Sampled so a flood of garbage cannot drown the log stream.
        if self.malformed == 1 || self.malformed % 1000 == 0 {
            debug!(
                target: "index_maker::ingress",
                total = self.malformed,
                error = %err,
                frame = &line[..line.len().min(80)],
                "malformed frame dropped"
            );
        }
    }

    /// Latest cached price for an instrument.
    pub fn last_price(&self, instrument: Instrument) -> Option<f64> {
        instrument.cache_index().and_then(|i| self.last_price[i])
    }

    /// Malformed frames dropped so far.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed
    }

    /// Well-formed frames accepted so far.
    pub fn frames_ok(&self) -> u64 {
        self.frames_ok
    }

    /// Feed liveness against `timeout_ms`-old watermarks.
    pub fn health(&self, now_ms: u64, timeout_ms: u64) -> IngressHealth {
        let fresh = |idx: usize| {
            self.last_seen_ms[idx]
                .is_some_and(|seen| now_ms.saturating_sub(seen) < timeout_ms)
        };
        IngressHealth {
            es_ok: fresh(0),
            nq_ok: fresh(1),
            ym_ok: fresh(2),
            btc_ok: fresh(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AggressorSide;

    #[test]
    fn test_lead_trade_emits_trade_and_tick() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("T,ESZ5,6800.25,12,BUY", 1_000);
        assert_eq!(events.len(), 2);
        match &events[0] {
            EngineEvent::Trade(t) => {
                assert_eq!(t.price, 6800.25);
                assert_eq!(t.aggressor, AggressorSide::Buy);
            }
            other => panic!("expected trade, got {other:?}"),
        }
        match &events[1] {
            EngineEvent::Tick(t) => {
                assert_eq!(t.es, 6800.25);
                assert_eq!(t.nq, None);
                assert_eq!(t.t_ms, 1_000);
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn test_correlator_trade_carries_cached_prices() {
        let mut norm = IngressNormalizer::new();
        norm.on_frame("T,ESZ5,6800.25,1,BUY", 1_000);
        norm.on_frame("T,NQH6,21500,1,SELL", 1_001);
        let events = norm.on_frame("T,BTCUSD,95000,1,NONE", 1_002);
        // A correlator print emits no TradeEvent, only the composite tick.
        assert_eq!(events.len(), 1);
        match &events[0] {
            EngineEvent::Tick(t) => {
                assert_eq!(t.es, 6800.25);
                assert_eq!(t.nq, Some(21500.0));
                assert_eq!(t.ym, None);
                assert_eq!(t.btc, Some(95000.0));
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn test_no_tick_before_lead_price_known() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("T,NQH6,21500,1,BUY", 1_000);
        assert!(events.is_empty());
    }

    #[test]
    fn test_depth_emitted_for_lead_only() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("D,ESZ5,6800@40,6800.25@30", 1_000);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EngineEvent::Dom(_)));

        let events = norm.on_frame("D,NQH6,21500@10,21500.25@10", 1_001);
        assert!(events.is_empty());
    }

    #[test]
    fn test_one_sided_depth_is_skipped() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("D,ESZ5,0@0,6800.25@30", 1_000);
        assert!(events.is_empty());
        assert_eq!(norm.unusable_depth, 1);
    }

    #[test]
    fn test_heartbeat_updates_health_without_events() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("H,ESZ5,638500000000000000", 1_000);
        assert!(events.is_empty());
        let health = norm.health(2_000, 5_000);
        assert!(health.es_ok);
        assert!(!health.nq_ok);
        assert_eq!(health.summary(), "ES:OK | NQ:-- | YM:-- | BTC:--");
    }

    #[test]
    fn test_position_and_monitor_forwarded_for_lead() {
        let mut norm = IngressNormalizer::new();
        let events = norm.on_frame("P,ESZ5,1", 1_000);
        assert_eq!(
            events.as_slice(),
            &[EngineEvent::Position {
                t_ms: 1_000,
                signed_volume: 1.0
            }]
        );
        let events = norm.on_frame("M,ESZ5,6799.5", 1_001);
        assert_eq!(
            events.as_slice(),
            &[EngineEvent::MonitoredLimit {
                t_ms: 1_001,
                price: 6799.5
            }]
        );
        // Position updates for other symbols are ignored.
        assert!(norm.on_frame("P,NQH6,3", 1_002).is_empty());
    }

    #[test]
    fn test_malformed_frames_counted_and_dropped() {
        let mut norm = IngressNormalizer::new();
        assert!(norm.on_frame("garbage", 1_000).is_empty());
        assert!(norm.on_frame("T,ESZ5,-1,5,BUY", 1_000).is_empty());
        assert_eq!(norm.malformed_frames(), 2);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut norm = IngressNormalizer::new();
        norm.on_frame("T,ESZ5,6800.25,1,BUY", 5_000);
        let events = norm.on_frame("T,ESZ5,6800.50,1,BUY", 4_000);
        match &events[1] {
            EngineEvent::Tick(t) => assert_eq!(t.t_ms, 5_000),
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn test_venue_clock_preferred_when_present() {
        let mut norm = IngressNormalizer::new();
        // One second past the .NET unix epoch.
        let events = norm.on_frame("T,ESZ5,6800.25,1,BUY,621355968010000000", 99);
        match &events[1] {
            EngineEvent::Tick(t) => assert_eq!(t.t_ms, 1_000),
            other => panic!("expected tick, got {other:?}"),
        }
    }
}
