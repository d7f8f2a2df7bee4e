//! Engine configuration.
//!
//! One record covers the whole decision core, with nested sections per
//! component. Every field has a production default; `validate` rejects any
//! out-of-range value and is fatal at startup.

use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

/// Kalman fair-value model parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Initial covariance on the intercept. The beta rows/columns are seeded
    /// at 1e-8 instead: regressors live on ~2e4 while betas live on ~0.1, so
    /// an equal-scale P would let the gain swamp the beta estimates.
    pub init_p0: f64,
    /// Process noise on each beta.
    pub q_beta: f64,
    /// Process noise on the intercept.
    pub q_alpha: f64,
    /// Observation noise (price units squared).
    pub r_obs: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            init_p0: 100.0,
            q_beta: 1e-12,
            q_alpha: 1e-6,
            r_obs: 100.0,
        }
    }
}

/// Forgetting-factor ridge model parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    /// Forgetting factor. 0.999 remembers ~1000 ticks, 0.99 ~100.
    pub lambda: f64,
    /// L2 penalty. This is what keeps the model from fitting the price
    /// exactly and eating the spread signal.
    pub alpha: f64,
    /// Initial covariance scale.
    pub init_p0: f64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            lambda: 0.995,
            alpha: 1e-4,
            init_p0: 100.0,
        }
    }
}

/// Weighted order-book imbalance parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ObiConfig {
    /// Number of levels per side.
    pub depth: usize,
    /// Per-level geometric weight, `w_i = decay^i`. Level 1 dominates; deep
    /// levels are mostly spoof.
    pub decay: f64,
}

impl Default for ObiConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            decay: 0.5,
        }
    }
}

/// Iceberg detector parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IcebergConfig {
    /// Rolling window in seconds; also the decay time constant.
    pub window_s: f64,
    /// Minimum consumed volume before a level can be flagged.
    pub min_hidden: f64,
    /// Consumed-to-observed ratio that flags hidden liquidity.
    pub k_ratio: f64,
    /// Only levels within this many ticks of the touch are tracked.
    pub band_ticks: u32,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            window_s: 5.0,
            min_hidden: 200.0,
            k_ratio: 1.5,
            band_ticks: 3,
        }
    }
}

/// BTC relative-volatility regime gate parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Decimation rate for BTC samples.
    pub sample_hz: f64,
    /// Short volatility window, in samples.
    pub short_n: usize,
    /// Long baseline window, in samples.
    pub long_n: usize,
    /// Trip when short/long volatility ratio exceeds this.
    pub trip: f64,
    /// Re-arm only after the ratio stays at or below this...
    pub reset: f64,
    /// ...for this long.
    pub cool_off_s: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            sample_hz: 1.0,
            short_n: 60,
            long_n: 600,
            trip: 3.0,
            reset: 2.0,
            cool_off_s: 30.0,
        }
    }
}

/// Top-level configuration for the decision core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MakerConfig {
    /// Minimum price increment of the lead instrument (ES = 0.25).
    pub tick_size: f64,
    /// Entry threshold on the Kalman spread, in ticks. The comparison is
    /// inclusive: spread exactly at the threshold qualifies.
    pub base_spread_threshold_ticks: f64,
    /// Require the ridge model to agree in sign (and reach half the
    /// threshold) before entering.
    pub require_ridge_agreement: bool,
    /// Minimum OBI for a buy entry.
    pub min_obi_long: f64,
    /// Minimum |OBI| on the sell side (OBI must be at or below the negated
    /// value).
    pub min_obi_short: f64,
    pub obi: ObiConfig,
    /// Maximum visible resting size at the entry price.
    pub max_queue_size: f64,
    /// Cancel a working order unfilled for this long.
    pub cancel_timeout_ms: u64,
    /// Re-price only once the desired price drifts this many ticks.
    pub reprice_hysteresis_ticks: f64,
    /// Cancel once a previously-passing gate stays false for this long.
    pub invalidation_ms: u64,
    /// Valid model updates required in both models before trading.
    pub warmup_updates: usize,
    /// Failed MODIFYs tolerated before falling back to cancel-and-replace.
    pub max_modify_attempts: u32,
    /// Emit a final CLOSE_ALL when the runtime shuts down.
    pub flatten_on_shutdown: bool,
    pub kalman: KalmanConfig,
    pub ridge: RidgeConfig,
    pub iceberg: IcebergConfig,
    pub regime: RegimeConfig,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            base_spread_threshold_ticks: 0.5,
            require_ridge_agreement: false,
            min_obi_long: 0.1,
            min_obi_short: 0.1,
            obi: ObiConfig::default(),
            max_queue_size: 300.0,
            cancel_timeout_ms: 3000,
            reprice_hysteresis_ticks: 1.0,
            invalidation_ms: 500,
            warmup_updates: 200,
            max_modify_attempts: 3,
            flatten_on_shutdown: true,
            kalman: KalmanConfig::default(),
            ridge: RidgeConfig::default(),
            iceberg: IcebergConfig::default(),
            regime: RegimeConfig::default(),
        }
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn require_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl MakerConfig {
    /// Validate every field. Any violation is a fatal startup error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("tick_size", self.tick_size)?;
        require_positive(
            "base_spread_threshold_ticks",
            self.base_spread_threshold_ticks,
        )?;
        require_range("min_obi_long", self.min_obi_long, 0.0, 1.0)?;
        require_range("min_obi_short", self.min_obi_short, 0.0, 1.0)?;
        if self.obi.depth == 0 {
            return Err(ConfigError::NotPositive {
                field: "obi.depth",
                value: 0.0,
            });
        }
        require_range("obi.decay", self.obi.decay, f64::MIN_POSITIVE, 1.0)?;
        require_positive("max_queue_size", self.max_queue_size)?;
        require_positive("cancel_timeout_ms", self.cancel_timeout_ms as f64)?;
        require_positive(
            "reprice_hysteresis_ticks",
            self.reprice_hysteresis_ticks,
        )?;
        require_positive("invalidation_ms", self.invalidation_ms as f64)?;
        require_positive("warmup_updates", self.warmup_updates as f64)?;
        require_positive("max_modify_attempts", self.max_modify_attempts as f64)?;

        require_positive("kalman.init_p0", self.kalman.init_p0)?;
        require_positive("kalman.q_beta", self.kalman.q_beta)?;
        require_positive("kalman.q_alpha", self.kalman.q_alpha)?;
        require_positive("kalman.r_obs", self.kalman.r_obs)?;

        require_range("ridge.lambda", self.ridge.lambda, 0.99, 0.999)?;
        require_range("ridge.alpha", self.ridge.alpha, 1e-5, 1e-2)?;
        require_positive("ridge.init_p0", self.ridge.init_p0)?;

        require_positive("iceberg.window_s", self.iceberg.window_s)?;
        require_positive("iceberg.min_hidden", self.iceberg.min_hidden)?;
        require_positive("iceberg.k_ratio", self.iceberg.k_ratio)?;
        require_positive("iceberg.band_ticks", self.iceberg.band_ticks as f64)?;

        require_positive("regime.sample_hz", self.regime.sample_hz)?;
        if self.regime.short_n < 2 {
            return Err(ConfigError::NotPositive {
                field: "regime.short_n",
                value: self.regime.short_n as f64,
            });
        }
        if self.regime.long_n <= self.regime.short_n {
            return Err(ConfigError::WindowOrder {
                short: self.regime.short_n,
                long: self.regime.long_n,
            });
        }
        require_positive("regime.trip", self.regime.trip)?;
        require_range("regime.reset", self.regime.reset, 0.0, self.regime.trip)?;
        require_positive("regime.cool_off_s", self.regime.cool_off_s)?;

        Ok(())
    }

    /// Spread threshold in price units.
    pub fn spread_threshold_points(&self) -> f64 {
        self.base_spread_threshold_ticks * self.tick_size
    }

    /// Load overrides from a JSON file and validate the result.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: MakerConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(MakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lambda_out_of_range_is_fatal() {
        let mut cfg = MakerConfig::default();
        cfg.ridge.lambda = 0.95;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { field: "ridge.lambda", .. })
        ));
    }

    #[test]
    fn test_window_order_enforced() {
        let mut cfg = MakerConfig::default();
        cfg.regime.long_n = cfg.regime.short_n;
        assert!(matches!(cfg.validate(), Err(ConfigError::WindowOrder { .. })));
    }

    #[test]
    fn test_zero_tick_size_rejected() {
        let cfg = MakerConfig {
            tick_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NotPositive { field: "tick_size", .. })
        ));
    }

    #[test]
    fn test_partial_json_overrides() {
        let cfg: MakerConfig =
            serde_json::from_str(r#"{"base_spread_threshold_ticks": 1.0, "ridge": {"lambda": 0.999}}"#)
                .unwrap();
        assert_eq!(cfg.base_spread_threshold_ticks, 1.0);
        assert_eq!(cfg.ridge.lambda, 0.999);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.tick_size, 0.25);
        assert_eq!(cfg.warmup_updates, 200);
        assert!(cfg.validate().is_ok());
    }
}
