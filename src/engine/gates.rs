//! Layered entry gates.
//!
//! Pure decision logic: all inputs come from upstream components, the
//! function mutates nothing, and feeding it the same snapshot twice yields
//! the same answer. Gates short-circuit in a fixed order:
//!
//! 1. warm-up → 2. spread → 3. ridge corroboration → 4. regime →
//! 5. depth present → 6. iceberg → 7. OBI → 8. queue
//!
//! The spread sign picks the candidate side, so a tick can never qualify
//! both sides at once; the larger-|spread| tie-break exists only as a
//! defensive branch in the engine.

use std::fmt;

use crate::config::MakerConfig;
use crate::features::IcebergDetector;
use crate::types::{DomSnapshot, Side};

/// Why the pipeline refused to produce an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// One of the models has fewer valid updates than required.
    WarmingUp,
    /// No model output yet (correlator prices still unknown).
    NoModelOutput,
    SpreadBelowThreshold,
    /// Ridge model disagrees in sign or magnitude.
    RidgeDisagrees,
    RegimeTripped,
    /// No depth snapshot received yet.
    NoDepth,
    /// Hidden liquidity sits in the way of the entry.
    IcebergResistance,
    /// Book imbalance points against the trade.
    ObiAgainst,
    /// Visible queue at the entry price is too long to join.
    QueueTooLong,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::WarmingUp => "warming_up",
            RejectReason::NoModelOutput => "no_model_output",
            RejectReason::SpreadBelowThreshold => "spread_below_threshold",
            RejectReason::RidgeDisagrees => "ridge_disagrees",
            RejectReason::RegimeTripped => "regime_tripped",
            RejectReason::NoDepth => "no_depth",
            RejectReason::IcebergResistance => "iceberg_resistance",
            RejectReason::ObiAgainst => "obi_against",
            RejectReason::QueueTooLong => "queue_too_long",
        };
        write!(f, "{name}")
    }
}

/// Inputs to one gate evaluation. All fields come from upstream components;
/// this struct is a pure data transfer.
pub struct GateContext<'a> {
    pub cfg: &'a MakerConfig,
    pub kalman_updates: usize,
    pub ridge_updates: usize,
    /// Kalman spread in index points, if the model has produced output.
    pub spread_kf: Option<f64>,
    /// Ridge spread in index points.
    pub spread_rd: Option<f64>,
    pub regime_ok: bool,
    /// Weighted book imbalance of the latest snapshot.
    pub obi: f64,
    pub dom: Option<&'a DomSnapshot>,
    pub iceberg: &'a IcebergDetector,
}

/// A fully gated entry decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub side: Side,
    pub price: f64,
    /// Kalman spread in ticks, signed.
    pub spread_ticks: f64,
}

/// Run the gate pipeline. Short-circuits on the first failing gate.
pub(crate) fn evaluate(ctx: &GateContext) -> Result<EntrySignal, RejectReason> {
    let cfg = ctx.cfg;

    // 1. Warm-up: both models must have digested enough frames.
    if ctx.kalman_updates < cfg.warmup_updates || ctx.ridge_updates < cfg.warmup_updates {
        return Err(RejectReason::WarmingUp);
    }

    let Some(spread_kf) = ctx.spread_kf else {
        return Err(RejectReason::NoModelOutput);
    };

    // 2. Spread gate, inclusive at the threshold. Sign picks the side.
    let spread_ticks = spread_kf / cfg.tick_size;
    if spread_ticks.abs() < cfg.base_spread_threshold_ticks {
        return Err(RejectReason::SpreadBelowThreshold);
    }
    let side = if spread_ticks > 0.0 { Side::Buy } else { Side::Sell };

    // 3. Optional corroboration: ridge must agree in sign and reach half
    // the entry threshold.
    if cfg.require_ridge_agreement {
        let Some(spread_rd) = ctx.spread_rd else {
            return Err(RejectReason::RidgeDisagrees);
        };
        let rd_ticks = spread_rd / cfg.tick_size;
        let agrees = rd_ticks.signum() == spread_ticks.signum()
            && rd_ticks.abs() >= 0.5 * cfg.base_spread_threshold_ticks;
        if !agrees {
            return Err(RejectReason::RidgeDisagrees);
        }
    }

    // 4. Regime gate.
    if !ctx.regime_ok {
        return Err(RejectReason::RegimeTripped);
    }

    // 5. Entry pricing needs a book.
    let Some(dom) = ctx.dom else {
        return Err(RejectReason::NoDepth);
    };

    // Join the best level; on an outsized dislocation step one bucket back
    // and let the market come to us.
    let improve = spread_kf.abs() > 2.0 * cfg.base_spread_threshold_ticks;
    let price = match side {
        Side::Buy => {
            if improve {
                dom.best_bid - cfg.tick_size
            } else {
                dom.best_bid
            }
        }
        Side::Sell => {
            if improve {
                dom.best_ask + cfg.tick_size
            } else {
                dom.best_ask
            }
        }
    };

    // 6. Iceberg gate: hidden liquidity on the resting side opposite the
    // order blocks the trade.
    let hidden =
        ctx.iceberg
            .max_hidden_within(side.opposite(), price, cfg.iceberg.band_ticks);
    if hidden >= cfg.iceberg.min_hidden {
        return Err(RejectReason::IcebergResistance);
    }

    // 7. OBI gate: the book must lean with the trade.
    match side {
        Side::Buy if ctx.obi < cfg.min_obi_long => return Err(RejectReason::ObiAgainst),
        Side::Sell if ctx.obi > -cfg.min_obi_short => return Err(RejectReason::ObiAgainst),
        _ => {}
    }

    // 8. Queue gate: joining a long visible queue has no expected value.
    if dom.size_at(price, cfg.tick_size / 2.0) > cfg.max_queue_size {
        return Err(RejectReason::QueueTooLong);
    }

    Ok(EntrySignal {
        side,
        price,
        spread_ticks,
    })
}
