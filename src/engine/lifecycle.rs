//! Per-side passive order register.
//!
//! Two optional slots keyed by side, not a general order book: the engine
//! never works more than one order per side. The executor is authoritative;
//! local phases advance through position deltas and monitored-limit
//! reconciliation, never through assumed acknowledgements.

use tracing::{debug, info};

use crate::types::{OrderCommand, OrderPhase, OrderType, RestingOrder, Side};

/// Outcome of a monitored-limit reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ReconcileOutcome {
    /// Orders confirmed live this pass.
    pub confirmed: u32,
    /// Orders cleared because the venue stopped reporting them.
    pub cleared_externally: u32,
}

/// The engine's two-slot order register with a monotonic id source.
#[derive(Debug, Default)]
pub(crate) struct OrderRegister {
    slots: [Option<RestingOrder>; 2],
    next_client_id: u64,
}

impl OrderRegister {
    pub(crate) fn new() -> Self {
        Self {
            slots: [None, None],
            next_client_id: 1,
        }
    }

    pub(crate) fn order(&self, side: Side) -> Option<&RestingOrder> {
        self.slots[side.index()].as_ref()
    }

    pub(crate) fn order_mut(&mut self, side: Side) -> Option<&mut RestingOrder> {
        self.slots[side.index()].as_mut()
    }

    /// Whether a working order occupies the side's slot.
    pub(crate) fn has_working(&self, side: Side) -> bool {
        self.order(side).is_some_and(|o| o.is_working())
    }

    /// Create a new pending order and the PLACE command for it.
    ///
    /// Panics in debug builds if the slot is occupied; callers check
    /// `has_working` first (single-order-per-side invariant).
    pub(crate) fn place(
        &mut self,
        side: Side,
        price: f64,
        quantity: u32,
        now_ms: u64,
    ) -> OrderCommand {
        debug_assert!(!self.has_working(side), "slot already occupied: {side}");
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.slots[side.index()] = Some(RestingOrder::new(client_id, side, price, quantity, now_ms));
        info!(
            target: "index_maker::engine",
            client_id,
            %side,
            price,
            quantity,
            "placing passive order"
        );
        OrderCommand::Place {
            client_id,
            side,
            order_type: OrderType::Limit,
            price,
            quantity,
        }
    }

    /// Transition a working order to PendingCancel and build its CANCEL.
    /// No-op if the side is empty or already cancelling.
    pub(crate) fn cancel(&mut self, side: Side, reason: &'static str) -> Option<OrderCommand> {
        let order = self.slots[side.index()].as_mut()?;
        if order.phase == OrderPhase::PendingCancel {
            return None;
        }
        order.phase = OrderPhase::PendingCancel;
        info!(
            target: "index_maker::engine",
            client_id = order.client_id,
            %side,
            reason,
            "cancelling order"
        );
        Some(OrderCommand::Cancel {
            client_id: order.client_id,
        })
    }

    /// Re-price a live order, tracking the attempt count. Returns the MODIFY
    /// command, or `None` when the order is not live.
    pub(crate) fn modify(&mut self, side: Side, new_price: f64) -> Option<OrderCommand> {
        let order = self.slots[side.index()].as_mut()?;
        if order.phase != OrderPhase::Live {
            return None;
        }
        let old_price = order.price;
        order.price = new_price;
        order.modify_attempts += 1;
        debug!(
            target: "index_maker::engine",
            client_id = order.client_id,
            %side,
            old_price,
            new_price,
            attempt = order.modify_attempts,
            "re-pricing order"
        );
        Some(OrderCommand::Modify {
            client_id: order.client_id,
            old_price,
            new_price,
        })
    }

    pub(crate) fn clear(&mut self, side: Side) -> Option<RestingOrder> {
        self.slots[side.index()].take()
    }

    /// Fold in a venue-observed active-limit price.
    ///
    /// A report matching an order's price confirms it (PendingPlace → Live,
    /// modify attempts cleared). A report not matching counts a miss against
    /// live and cancelling orders; on the second consecutive miss the order
    /// is considered gone at the venue and the slot is cleared. Orders still
    /// in PendingPlace are exempt from misses — the venue may simply not
    /// have registered them yet; the placement timeout covers that path.
    pub(crate) fn on_monitored_limit(&mut self, price: f64, tolerance: f64) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for slot in self.slots.iter_mut() {
            let Some(order) = slot.as_mut() else {
                continue;
            };
            if (order.price - price).abs() <= tolerance {
                if order.phase == OrderPhase::PendingPlace {
                    info!(
                        target: "index_maker::engine",
                        client_id = order.client_id,
                        side = %order.side,
                        price = order.price,
                        "order confirmed live at venue"
                    );
                    order.phase = OrderPhase::Live;
                    outcome.confirmed += 1;
                }
                order.monitor_misses = 0;
                order.modify_attempts = 0;
            } else if order.phase != OrderPhase::PendingPlace {
                order.monitor_misses += 1;
                if order.monitor_misses >= 2 {
                    info!(
                        target: "index_maker::engine",
                        client_id = order.client_id,
                        side = %order.side,
                        "order no longer reported by venue; clearing"
                    );
                    *slot = None;
                    outcome.cleared_externally += 1;
                }
            }
        }

        outcome
    }

    /// Fold in an executor position delta. A delta toward a working order's
    /// side means that order filled; the slot is cleared and the side
    /// returned.
    pub(crate) fn on_position_delta(&mut self, delta: f64) -> Option<RestingOrder> {
        let side = if delta > 0.0 {
            Side::Buy
        } else if delta < 0.0 {
            Side::Sell
        } else {
            return None;
        };
        let filled = self.slots[side.index()].take();
        if let Some(ref order) = filled {
            info!(
                target: "index_maker::engine",
                client_id = order.client_id,
                %side,
                price = order.price,
                "order filled (position reconciliation)"
            );
        }
        filled
    }
}
