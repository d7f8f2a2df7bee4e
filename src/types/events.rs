//! Typed market-data events produced by the ingress normalizer.

use smallvec::SmallVec;

use crate::ingress::Instrument;

/// Aggregated depth levels, `(price, size)` pairs.
///
/// Platform-visible depth is 5 or 15 levels, so the inline capacity covers
/// every snapshot without a heap allocation.
pub type BookLevels = SmallVec<[(f64, f64); 16]>;

/// Aggressor side of a trade print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggressorSide {
    Buy,
    Sell,
    /// The venue did not classify the print. Iceberg detection skips these.
    Unknown,
}

impl AggressorSide {
    /// Parse the wire token (`BUY` / `SELL` / `NONE`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(AggressorSide::Buy),
            "SELL" => Some(AggressorSide::Sell),
            "NONE" => Some(AggressorSide::Unknown),
            _ => None,
        }
    }

    /// Wire token for encoding.
    pub fn wire(&self) -> &'static str {
        match self {
            AggressorSide::Buy => "BUY",
            AggressorSide::Sell => "SELL",
            AggressorSide::Unknown => "NONE",
        }
    }
}

/// Multi-instrument tick observation.
///
/// `es` is the lead-instrument last price; correlators carry the latest
/// cached value and may be absent early in the session.
///
/// Invariant: `t_ms` is monotonically non-decreasing per stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickEvent {
    /// Event time in unix milliseconds.
    pub t_ms: u64,
    /// Lead instrument (ES) last price.
    pub es: f64,
    /// NQ last price, if seen.
    pub nq: Option<f64>,
    /// YM last price, if seen.
    pub ym: Option<f64>,
    /// BTC index price for the regime monitor, if seen.
    pub btc: Option<f64>,
}

/// L2 snapshot for the lead instrument.
///
/// Bids are price-descending, asks price-ascending, every level has
/// `size > 0`, and `best_ask >= best_bid + tick_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct DomSnapshot {
    pub t_ms: u64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bids: BookLevels,
    pub asks: BookLevels,
}

impl DomSnapshot {
    /// Midpoint of the touch.
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Resting size at `price`, 0.0 if the level is not visible.
    pub fn size_at(&self, price: f64, tolerance: f64) -> f64 {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .find(|(p, _)| (p - price).abs() < tolerance)
            .map(|&(_, v)| v)
            .unwrap_or(0.0)
    }
}

/// A single trade print on the lead instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeEvent {
    pub t_ms: u64,
    pub instrument: Instrument,
    pub price: f64,
    /// Always strictly positive.
    pub volume: f64,
    pub aggressor: AggressorSide,
}

/// Normalized event stream consumed by the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Tick(TickEvent),
    Dom(DomSnapshot),
    Trade(TradeEvent),
    /// Executor-reported signed position for the lead instrument.
    Position { t_ms: u64, signed_volume: f64 },
    /// Venue-observed active limit price (0.0 = no active limit).
    MonitoredLimit { t_ms: u64, price: f64 },
}

impl EngineEvent {
    /// Event timestamp in unix milliseconds.
    pub fn t_ms(&self) -> u64 {
        match self {
            EngineEvent::Tick(t) => t.t_ms,
            EngineEvent::Dom(d) => d.t_ms,
            EngineEvent::Trade(t) => t.t_ms,
            EngineEvent::Position { t_ms, .. } => *t_ms,
            EngineEvent::MonitoredLimit { t_ms, .. } => *t_ms,
        }
    }

    /// Depth snapshots are refreshable; everything else is not.
    pub fn is_depth(&self) -> bool {
        matches!(self, EngineEvent::Dom(_))
    }
}
