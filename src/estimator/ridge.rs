//! Forgetting-factor ridge regression fair-value model.
//!
//! Structurally independent corroboration for the Kalman filter: recursive
//! least squares with forgetting factor λ and an L2 penalty α. The penalty
//! keeps the fit from collapsing onto the observed price when NQ and YM
//! move together, which is what preserves a usable spread signal.

use nalgebra::{Matrix3, Vector3};
use tracing::warn;

use crate::config::RidgeConfig;
use crate::types::TickEvent;

use super::{
    clamp_abs, FairValueModel, ModelOutput, Observation, RegressorState, DENOM_FLOOR,
    GAIN_NORM_MAX, INNOVATION_MAX, P_ENTRY_MAX, THETA_MAX,
};

/// Online ridge regressor producing a fair price and spread for the lead
/// instrument.
#[derive(Debug, Clone)]
pub struct RidgeFairValue {
    cfg: RidgeConfig,
    theta: Vector3<f64>,
    p: Matrix3<f64>,
    regressors: RegressorState,
    valid_updates: usize,
    guard_skips: u64,
    last_output: Option<ModelOutput>,
}

impl RidgeFairValue {
    pub fn new(cfg: RidgeConfig) -> Self {
        Self {
            theta: Vector3::zeros(),
            p: Matrix3::identity() * cfg.init_p0,
            regressors: RegressorState::default(),
            valid_updates: 0,
            guard_skips: 0,
            last_output: None,
            cfg,
        }
    }

    /// Current parameter vector `(β_NQ, β_YM, α)`.
    pub fn theta(&self) -> Vector3<f64> {
        self.theta
    }

    fn step(&mut self, tick: &TickEvent) -> Option<ModelOutput> {
        let (x, y, es, es0) = match self.regressors.observe(tick) {
            Observation::Incomplete => return None,
            Observation::BaselineSet { es } => {
                let out = ModelOutput {
                    fair: es,
                    spread: 0.0,
                };
                self.last_output = Some(out);
                return Some(out);
            }
            Observation::Frame { x, y, es, es0 } => (x, y, es, es0),
        };

        // Inflate and discount: P <- (P + alpha I) / lambda.
        let p_pred = (self.p + Matrix3::identity() * self.cfg.alpha) / self.cfg.lambda;

        let px = p_pred * x;
        let g = (self.cfg.lambda + x.dot(&px)).max(DENOM_FLOOR);
        let mut k = px / g;
        let k_norm = k.norm();
        if k_norm > GAIN_NORM_MAX {
            k *= GAIN_NORM_MAX / k_norm;
        }

        let e = clamp_abs(y - x.dot(&self.theta), INNOVATION_MAX);

        let theta_new = (self.theta + k * e).map(|v| clamp_abs(v, THETA_MAX));
        let p_new =
            (p_pred - k * (x.transpose() * p_pred)).map(|v| clamp_abs(v, P_ENTRY_MAX));

        let finite =
            theta_new.iter().all(|v| v.is_finite()) && p_new.iter().all(|v| v.is_finite());
        if !finite {
            self.guard_skips += 1;
            warn!(
                target: "index_maker::estimator",
                skips = self.guard_skips,
                "ridge update discarded: non-finite result"
            );
            return None;
        }

        self.theta = theta_new;
        self.p = p_new;
        self.valid_updates += 1;

        let fair = x.dot(&self.theta) + es0;
        let out = ModelOutput {
            fair,
            spread: fair - es,
        };
        self.last_output = Some(out);
        Some(out)
    }
}

impl FairValueModel for RidgeFairValue {
    fn on_tick(&mut self, tick: &TickEvent) -> Option<ModelOutput> {
        self.step(tick)
    }

    fn valid_updates(&self) -> usize {
        self.valid_updates
    }

    fn guard_skips(&self) -> u64 {
        self.guard_skips
    }

    fn last_output(&self) -> Option<ModelOutput> {
        self.last_output
    }

    fn reset(&mut self) {
        self.theta = Vector3::zeros();
        self.p = Matrix3::identity() * self.cfg.init_p0;
        self.regressors.clear();
        self.valid_updates = 0;
        self.last_output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(es: f64, nq: f64, ym: f64) -> TickEvent {
        TickEvent {
            t_ms: 0,
            es,
            nq: Some(nq),
            ym: Some(ym),
            btc: None,
        }
    }

    #[test]
    fn test_baseline_then_counts_updates() {
        let mut model = RidgeFairValue::new(RidgeConfig::default());
        let out = model.on_tick(&tick(6800.0, 21500.0, 44000.0)).unwrap();
        assert_eq!(out.spread, 0.0);
        assert_eq!(model.valid_updates(), 0);
        model.on_tick(&tick(6800.25, 21501.0, 44002.0)).unwrap();
        assert_eq!(model.valid_updates(), 1);
    }

    #[test]
    fn test_learns_linear_relation() {
        let mut model = RidgeFairValue::new(RidgeConfig::default());
        // ES moves 0.3 points per NQ point and 0.05 per YM point.
        for i in 0..400 {
            let d = (i % 41) as f64 - 20.0;
            model.on_tick(&tick(6800.0 + 0.3 * d + 0.05 * (2.0 * d), 21500.0 + d, 44000.0 + 2.0 * d));
        }
        let theta = model.theta();
        // The individual betas are only identified up to the collinearity of
        // the two regressors; their combined effect must match.
        let combined = theta[0] + 2.0 * theta[1];
        assert!((combined - 0.4).abs() < 0.05, "combined {combined}");
    }

    #[test]
    fn test_lagging_lead_gives_positive_spread() {
        let mut model = RidgeFairValue::new(RidgeConfig::default());
        for i in 0..400 {
            let d = (i % 41) as f64 - 20.0;
            model.on_tick(&tick(6800.0 + 0.4 * d, 21500.0 + d, 44000.0 + 2.0 * d));
        }
        // Correlators jump along the learned direction; the lead lags half
        // a point behind the predicted move.
        let out = model
            .on_tick(&tick(6800.0 + 0.4 * 30.0 - 0.5, 21530.0, 44060.0))
            .unwrap();
        assert!(out.spread > 0.1, "spread {}", out.spread);
    }

    #[test]
    fn test_extreme_regressor_keeps_state_bounded() {
        let mut model = RidgeFairValue::new(RidgeConfig::default());
        for _ in 0..250 {
            model.on_tick(&tick(6800.0, 21500.0, 44000.0));
        }
        model.on_tick(&tick(6800.0, 1e12, 44000.0));
        let theta = model.theta();
        assert!(theta.iter().all(|v| v.is_finite()));
        assert!(theta.iter().all(|v| v.abs() <= THETA_MAX));
        let out = model.on_tick(&tick(6800.0, 21500.0, 44000.0)).unwrap();
        assert!(out.fair.is_finite());
    }

    #[test]
    fn test_guard_skip_counter_starts_at_zero() {
        let model = RidgeFairValue::new(RidgeConfig::default());
        assert_eq!(model.guard_skips(), 0);
    }
}
