//! Kalman fair-value model with time-varying betas.
//!
//! State-space model in baseline-offset coordinates:
//!
//! - State: `θ_t = (β_NQ, β_YM, α)`, random walk `θ_t = θ_{t-1} + w_t`,
//!   `w_t ~ N(0, Q)`
//! - Observation: `y_t = x_t · θ_t + v_t`, `v_t ~ N(0, R)` with
//!   `x_t = (NQ_t - nq0, YM_t - ym0, 1)` and `y_t = ES_t - es0`
//!
//! The initial covariance is deliberately mixed-scale: `1e-8` on the beta
//! diagonal against `init_p0` on the intercept. Equal scales would let the
//! gain swamp the betas, fit the price exactly, and drive the spread signal
//! to zero.

use nalgebra::{Matrix3, Vector3};
use tracing::warn;

use crate::config::KalmanConfig;
use crate::types::TickEvent;

use super::{
    clamp_abs, FairValueModel, ModelOutput, Observation, RegressorState, DENOM_FLOOR,
    GAIN_NORM_MAX, INNOVATION_MAX, P_ENTRY_MAX, THETA_MAX,
};

/// Online Kalman filter producing a fair price and spread for the lead
/// instrument.
#[derive(Debug, Clone)]
pub struct KalmanFairValue {
    cfg: KalmanConfig,
    theta: Vector3<f64>,
    p: Matrix3<f64>,
    q: Matrix3<f64>,
    regressors: RegressorState,
    valid_updates: usize,
    guard_skips: u64,
    last_output: Option<ModelOutput>,
}

impl KalmanFairValue {
    pub fn new(cfg: KalmanConfig) -> Self {
        Self {
            theta: Vector3::zeros(),
            p: Self::initial_p(&cfg),
            q: Matrix3::from_diagonal(&Vector3::new(cfg.q_beta, cfg.q_beta, cfg.q_alpha)),
            regressors: RegressorState::default(),
            valid_updates: 0,
            guard_skips: 0,
            last_output: None,
            cfg,
        }
    }

    fn initial_p(cfg: &KalmanConfig) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(1e-8, 1e-8, cfg.init_p0))
    }

    /// Current parameter vector `(β_NQ, β_YM, α)`.
    pub fn theta(&self) -> Vector3<f64> {
        self.theta
    }

    /// Current covariance matrix.
    pub fn covariance(&self) -> Matrix3<f64> {
        self.p
    }

    /// One filter step. Returns `None` until the observation is complete and
    /// on guard-discarded updates.
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

        // Predict.
        let p_pred = self.p + self.q;

        // Innovation against the prior state, clipped so a single bad print
        // cannot yank the parameters.
        let e = clamp_abs(y - x.dot(&self.theta), INNOVATION_MAX);

        // Innovation variance with a floor, then the bounded gain.
        let s = (x.dot(&(p_pred * x)) + self.cfg.r_obs).max(DENOM_FLOOR);
        let mut k = (p_pred * x) / s;
        let k_norm = k.norm();
        if k_norm > GAIN_NORM_MAX {
            k *= GAIN_NORM_MAX / k_norm;
        }

        // Candidate state and covariance; committed only if finite.
        let theta_new = (self.theta + k * e).map(|v| clamp_abs(v, THETA_MAX));
        let mut p_new = (Matrix3::identity() - k * x.transpose()) * p_pred;
        p_new = (p_new + p_new.transpose()) * 0.5;
        p_new = p_new.map(|v| clamp_abs(v, P_ENTRY_MAX));

        let finite =
            theta_new.iter().all(|v| v.is_finite()) && p_new.iter().all(|v| v.is_finite());
        if !finite {
            self.guard_skips += 1;
            warn!(
                target: "index_maker::estimator",
                skips = self.guard_skips,
                "kalman update discarded: non-finite result"
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

impl FairValueModel for KalmanFairValue {
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
        self.p = Self::initial_p(&self.cfg);
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

    fn warmed_model(n: usize) -> KalmanFairValue {
        let mut model = KalmanFairValue::new(KalmanConfig::default());
        for _ in 0..n {
            model.on_tick(&tick(6800.0, 21500.0, 44000.0));
        }
        model
    }

    #[test]
    fn test_first_complete_tick_sets_baseline() {
        let mut model = KalmanFairValue::new(KalmanConfig::default());
        let out = model.on_tick(&tick(6800.0, 21500.0, 44000.0)).unwrap();
        assert_eq!(out.fair, 6800.0);
        assert_eq!(out.spread, 0.0);
        assert_eq!(model.valid_updates(), 0);
        assert_eq!(model.last_output(), Some(out));
    }

    #[test]
    fn test_flat_market_spread_stays_near_zero() {
        let mut model = warmed_model(300);
        let out = model.on_tick(&tick(6800.0, 21500.0, 44000.0)).unwrap();
        assert!(out.spread.abs() < 0.05, "spread {}", out.spread);
        assert_eq!(model.valid_updates(), 300);
    }

    #[test]
    fn test_lagging_lead_gives_positive_spread() {
        let mut model = warmed_model(300);
        // Correlators jump, the lead lags behind: fair above actual.
        let out = model.on_tick(&tick(6799.50, 21520.0, 44020.0)).unwrap();
        assert!(out.spread > 0.1, "spread {}", out.spread);
        assert!(out.fair > 6799.50);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut model = warmed_model(50);
        for i in 0..200 {
            let drift = (i % 17) as f64 - 8.0;
            model.on_tick(&tick(6800.0 + drift * 0.25, 21500.0 + drift, 44000.0 + drift * 2.0));
        }
        let p = model.covariance();
        for i in 0..3 {
            for j in 0..3 {
                assert!((p[(i, j)] - p[(j, i)]).abs() < 1e-12);
                assert!(p[(i, j)].abs() <= P_ENTRY_MAX);
            }
            // Diagonal entries of a PSD matrix are non-negative.
            assert!(p[(i, i)] >= -1e-12);
        }
    }

    #[test]
    fn test_extreme_regressor_keeps_state_finite() {
        let mut model = warmed_model(250);
        model.on_tick(&tick(6800.0, 1e12, 44000.0));
        let theta = model.theta();
        assert!(theta.iter().all(|v| v.is_finite()));
        assert!(theta.iter().all(|v| v.abs() <= THETA_MAX));
        assert!(model.covariance().iter().all(|v| v.is_finite()));
        // Follow-up ticks still produce finite output.
        let out = model.on_tick(&tick(6800.0, 21500.0, 44000.0)).unwrap();
        assert!(out.fair.is_finite());
        assert!(out.spread.is_finite());
    }

    #[test]
    fn test_reset_clears_baseline_and_counts() {
        let mut model = warmed_model(10);
        model.reset();
        assert_eq!(model.valid_updates(), 0);
        let out = model.on_tick(&tick(7000.0, 22000.0, 45000.0)).unwrap();
        assert_eq!(out.fair, 7000.0);
        assert_eq!(out.spread, 0.0);
    }
}
