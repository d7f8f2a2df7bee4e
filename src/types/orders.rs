//! Order lifecycle types.
//!
//! The engine holds at most one working order per side (a two-slot register,
//! not a general order book). Commands are value copies; no engine-internal
//! state escapes through the sink.

use std::fmt;

/// Side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    /// Register slot index.
    pub(crate) fn index(&self) -> usize {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. Passive entries are always LIMIT; MARKET exists only for
/// emergency flattening paths on the executor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

/// Lifecycle phase of a working order.
///
/// ```text
/// (none) ──PLACE──► PendingPlace ──M reconcile──► Live
///                        │                          │ timeout / invalidation /
///                        │                          │ reprice fallback
///                        ▼                          ▼
///                     (cleared on          PendingCancel ──► (cleared)
///                      terminal signal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPhase {
    /// Command emitted, not yet observed at the venue.
    PendingPlace,
    /// Venue-confirmed via monitored-limit reconciliation.
    Live,
    /// Cancel emitted, awaiting disappearance from the venue feed.
    PendingCancel,
}

/// One working passive order held by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestingOrder {
    /// Engine-assigned monotonic identifier.
    pub client_id: u64,
    pub side: Side,
    pub price: f64,
    pub quantity: u32,
    /// Event time at which PLACE was emitted.
    pub placed_ms: u64,
    pub phase: OrderPhase,
    /// Failed MODIFY attempts; past the limit the engine falls back to
    /// cancel-and-replace.
    pub modify_attempts: u32,
    /// Consecutive monitored-limit reports that did not contain this order's
    /// price. Two misses mean the order is gone at the venue.
    pub monitor_misses: u32,
}

impl RestingOrder {
    pub fn new(client_id: u64, side: Side, price: f64, quantity: u32, placed_ms: u64) -> Self {
        Self {
            client_id,
            side,
            price,
            quantity,
            placed_ms,
            phase: OrderPhase::PendingPlace,
            modify_attempts: 0,
            monitor_misses: 0,
        }
    }

    /// Whether the order counts against the single-order-per-side invariant.
    pub fn is_working(&self) -> bool {
        matches!(
            self.phase,
            OrderPhase::PendingPlace | OrderPhase::Live | OrderPhase::PendingCancel
        )
    }
}

/// Command emitted through the order sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderCommand {
    /// Place a new passive order.
    Place {
        client_id: u64,
        side: Side,
        order_type: OrderType,
        price: f64,
        quantity: u32,
    },
    /// Re-price a working order in place.
    Modify {
        client_id: u64,
        old_price: f64,
        new_price: f64,
    },
    /// Cancel a working order.
    Cancel { client_id: u64 },
    /// Join the current best bid/ask without naming a price.
    JoinBest { client_id: u64, side: Side },
    /// Flatten position and cancel everything. Emitted on regime trips.
    CloseAll,
}

impl OrderCommand {
    /// The client order id this command refers to, if any.
    pub fn client_id(&self) -> Option<u64> {
        match self {
            OrderCommand::Place { client_id, .. }
            | OrderCommand::Modify { client_id, .. }
            | OrderCommand::Cancel { client_id }
            | OrderCommand::JoinBest { client_id, .. } => Some(*client_id),
            OrderCommand::CloseAll => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite_and_sign() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Buy.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
    }

    #[test]
    fn test_new_order_is_pending_and_working() {
        let order = RestingOrder::new(7, Side::Buy, 6799.50, 1, 1_000);
        assert_eq!(order.phase, OrderPhase::PendingPlace);
        assert!(order.is_working());
        assert_eq!(order.modify_attempts, 0);
    }

    #[test]
    fn test_command_client_id() {
        let place = OrderCommand::Place {
            client_id: 3,
            side: Side::Sell,
            order_type: OrderType::Limit,
            price: 6800.25,
            quantity: 1,
        };
        assert_eq!(place.client_id(), Some(3));
        assert_eq!(OrderCommand::CloseAll.client_id(), None);
    }
}
