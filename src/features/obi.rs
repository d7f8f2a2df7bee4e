//! Weighted order-book imbalance.
//!
//! `OBI = (W_b - W_a) / (W_b + W_a)` with per-level geometric weights
//! `w_i = decay^i`. The first levels carry real intent; deep levels are
//! mostly decoration, so they are discounted hard. Range [-1, +1], positive
//! means bid-heavy. Stateless: a snapshot fed twice yields the same value.

use crate::config::ObiConfig;
use crate::types::DomSnapshot;

/// Order-book imbalance calculator with precomputed level weights.
#[derive(Debug, Clone)]
pub struct ObiCalculator {
    weights: Vec<f64>,
}

impl ObiCalculator {
    pub fn new(cfg: ObiConfig) -> Self {
        let weights = (0..cfg.depth).map(|i| cfg.decay.powi(i as i32)).collect();
        Self { weights }
    }

    /// Weighted imbalance of one snapshot. Missing levels contribute 0;
    /// an empty book maps to 0.
    pub fn calculate(&self, dom: &DomSnapshot) -> f64 {
        let weighted = |levels: &[(f64, f64)]| -> f64 {
            levels
                .iter()
                .zip(&self.weights)
                .map(|(&(_, size), w)| size.max(0.0) * w)
                .sum()
        };

        let w_bid: f64 = weighted(&dom.bids);
        let w_ask: f64 = weighted(&dom.asks);
        let total = w_bid + w_ask;
        if total <= 0.0 {
            return 0.0;
        }
        (w_bid - w_ask) / total
    }
}
