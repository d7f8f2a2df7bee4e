//! Order command egress.
//!
//! The engine pushes value-copied commands into an `OrderSink` and never
//! blocks on acknowledgement. A failed send is counted by the engine but
//! does not roll back order state; resynchronisation happens through the
//! position and monitored-limit feedback on the ingress side.

use crate::types::{OrderCommand, OrderType, Side};

/// Fire-and-forget command sink.
///
/// Implementations must not block: the real transport pushes onto an
/// outbound queue, test sinks record into a vector.
pub trait OrderSink {
    /// Deliver one command. Returns false when the transport rejected it.
    fn send(&mut self, cmd: &OrderCommand) -> bool;
}

/// Wire encoding understood by the executor.
///
/// The richer typed command carries a client order id for internal
/// correlation; the executor protocol itself is the flat string set below,
/// so per-order cancels map to `CANCEL_ALL` (the engine works at most one
/// order per side).
pub fn encode_wire(cmd: &OrderCommand) -> String {
    match cmd {
        OrderCommand::Place {
            side,
            order_type: OrderType::Limit,
            price,
            ..
        } => match side {
            Side::Buy => format!("BUY_LIMIT,{price}"),
            Side::Sell => format!("SELL_LIMIT,{price}"),
        },
        OrderCommand::Place {
            side,
            order_type: OrderType::Market,
            ..
        } => match side {
            Side::Buy => "BUY_MARKET".to_string(),
            Side::Sell => "SELL_MARKET".to_string(),
        },
        OrderCommand::JoinBest { side, .. } => match side {
            Side::Buy => "JOIN_BID".to_string(),
            Side::Sell => "JOIN_ASK".to_string(),
        },
        OrderCommand::Modify {
            old_price,
            new_price,
            ..
        } => format!("MODIFY,{old_price},{new_price}"),
        OrderCommand::Cancel { .. } => "CANCEL_ALL".to_string(),
        OrderCommand::CloseAll => "CLOSE_ALL".to_string(),
    }
}

/// Test sink that records every command and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub commands: Vec<OrderCommand>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands of a given wire form, for assertions.
    pub fn encoded(&self) -> Vec<String> {
        self.commands.iter().map(encode_wire).collect()
    }
}

impl OrderSink for RecordingSink {
    fn send(&mut self, cmd: &OrderCommand) -> bool {
        self.commands.push(*cmd);
        true
    }
}
