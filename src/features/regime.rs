//! BTC relative-volatility regime gate.
//!
//! When BTC short-window volatility runs hot against its own baseline the
//! cross-index correlation structure the pricing models rely on tends to
//! break down, so the engine refuses new entries until conditions settle.
//!
//! Prices are decimated to ~1 Hz before entering the return series; the
//! monitor compares the standard deviation of the last `short_n` log-returns
//! against the full `long_n`-sample baseline. Warm-up reports OK: an
//! unfilled baseline must not block trading.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::RegimeConfig;

/// Binary market-state classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegimeState {
    /// Normal volatility; trading allowed.
    #[default]
    Ok,
    /// Short-window volatility ran past the trip ratio; no new entries.
    Tripped,
}

/// Rolling relative-volatility monitor over the BTC index price.
#[derive(Debug)]
pub struct RegimeMonitor {
    cfg: RegimeConfig,
    /// Decimated price samples, newest last, capacity `long_n`.
    samples: VecDeque<f64>,
    last_sample_ms: Option<u64>,
    state: RegimeState,
    vol_ratio: f64,
    short_vol: f64,
    long_vol: f64,
    /// Sample time since which the ratio has stayed at or below the reset
    /// threshold while tripped.
    reset_since_ms: Option<u64>,
    trips: u64,
}

/// Sample standard deviation (ddof = 1).
fn sample_stdev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

impl RegimeMonitor {
    pub fn new(cfg: RegimeConfig) -> Self {
        Self {
            cfg,
            samples: VecDeque::with_capacity(cfg.long_n),
            last_sample_ms: None,
            state: RegimeState::Ok,
            vol_ratio: 1.0,
            short_vol: 0.0,
            long_vol: 0.0,
            reset_since_ms: None,
            trips: 0,
        }
    }

    /// Feed a BTC price observation. Internally decimated to the configured
    /// sample rate; most calls return without doing any work.
    pub fn on_btc(&mut self, t_ms: u64, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let interval_ms = (1000.0 / self.cfg.sample_hz) as u64;
        if let Some(last) = self.last_sample_ms {
            if t_ms < last.saturating_add(interval_ms) {
                return;
            }
        }
        self.last_sample_ms = Some(t_ms);

        if self.samples.len() == self.cfg.long_n {
            self.samples.pop_front();
        }
        self.samples.push_back(price);
        self.evaluate(t_ms);
    }

    fn evaluate(&mut self, t_ms: u64) {
        if self.samples.len() < 2 {
            return;
        }

        let prices: Vec<f64> = self.samples.iter().copied().collect();
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

        let short_start = returns.len().saturating_sub(self.cfg.short_n);
        self.short_vol = sample_stdev(&returns[short_start..]);
        self.long_vol = sample_stdev(&returns);

        self.vol_ratio = if self.long_vol < 1e-12 {
            1.0
        } else {
            self.short_vol / self.long_vol
        };

        // An unfilled baseline window never blocks trading.
        if self.samples.len() < self.cfg.long_n {
            return;
        }

        match self.state {
            RegimeState::Ok => {
                if self.vol_ratio > self.cfg.trip {
                    self.state = RegimeState::Tripped;
                    self.reset_since_ms = None;
                    self.trips += 1;
                    info!(
                        target: "index_maker::features",
                        ratio = self.vol_ratio,
                        short_vol = self.short_vol,
                        long_vol = self.long_vol,
                        "volatility regime tripped"
                    );
                }
            }
            RegimeState::Tripped => {
                if self.vol_ratio <= self.cfg.reset {
                    let since = *self.reset_since_ms.get_or_insert(t_ms);
                    let cool_off_ms = (self.cfg.cool_off_s * 1000.0) as u64;
                    if t_ms.saturating_sub(since) >= cool_off_ms {
                        self.state = RegimeState::Ok;
                        self.reset_since_ms = None;
                        info!(
                            target: "index_maker::features",
                            ratio = self.vol_ratio,
                            "volatility regime reset"
                        );
                    }
                } else if self.reset_since_ms.take().is_some() {
                    debug!(
                        target: "index_maker::features",
                        ratio = self.vol_ratio,
                        "regime cool-off interrupted"
                    );
                }
            }
        }
    }

    pub fn state(&self) -> RegimeState {
        self.state
    }

    pub fn is_ok(&self) -> bool {
        self.state == RegimeState::Ok
    }

    /// Current short/long volatility ratio (1.0 during warm-up).
    pub fn vol_ratio(&self) -> f64 {
        self.vol_ratio
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Times the monitor has transitioned into `Tripped`.
    pub fn trips(&self) -> u64 {
        self.trips
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last_sample_ms = None;
        self.state = RegimeState::Ok;
        self.vol_ratio = 1.0;
        self.short_vol = 0.0;
        self.long_vol = 0.0;
        self.reset_since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> RegimeMonitor {
        RegimeMonitor::new(RegimeConfig::default())
    }

    /// Alternating ±delta log-returns around `base`, one sample per second.
    fn feed_alternating(
        mon: &mut RegimeMonitor,
        start_ms: u64,
        n: usize,
        base: f64,
        delta: f64,
    ) -> u64 {
        let mut t = start_ms;
        let mut price = base;
        for i in 0..n {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            price *= (sign * delta).exp();
            mon.on_btc(t, price);
            t += 1_000;
        }
        t
    }

    #[test]
    fn test_single_sample_reports_ok() {
        let mut mon = monitor();
        mon.on_btc(0, 95_000.0);
        assert!(mon.is_ok());
        assert_eq!(mon.vol_ratio(), 1.0);
    }

    #[test]
    fn test_warmup_never_trips() {
        let mut mon = monitor();
        // Violent moves, but the baseline window is not yet filled.
        feed_alternating(&mut mon, 0, 300, 95_000.0, 0.05);
        assert!(mon.is_ok());
    }

    #[test]
    fn test_decimation_drops_fast_ticks() {
        let mut mon = monitor();
        for i in 0..5_000 {
            mon.on_btc(i * 10, 95_000.0 + i as f64);
        }
        // 50 seconds of 100 Hz input decimates to ~50 samples.
        assert!(mon.sample_count() <= 51);
    }

    #[test]
    fn test_vol_spike_trips_after_warmup() {
        let mut mon = monitor();
        let t = feed_alternating(&mut mon, 0, 600, 95_000.0, 1e-4);
        assert!(mon.is_ok());
        // Short window twenty times the baseline return size.
        feed_alternating(&mut mon, t, 60, 95_000.0, 2e-3);
        assert_eq!(mon.state(), RegimeState::Tripped);
        assert!(mon.vol_ratio() > 3.0);
        assert_eq!(mon.trips(), 1);
    }

    #[test]
    fn test_reset_requires_cool_off() {
        let mut mon = monitor();
        let t = feed_alternating(&mut mon, 0, 600, 95_000.0, 1e-4);
        let t = feed_alternating(&mut mon, t, 60, 95_000.0, 2e-3);
        assert_eq!(mon.state(), RegimeState::Tripped);

        // Calm returns: the spike takes ~60 samples to leave the short
        // window, after which the ratio must hold below reset for 30 s.
        let mut t = t;
        let mut calmed_at = None;
        for _ in 0..400 {
            t = feed_alternating(&mut mon, t, 1, 95_000.0, 1e-4);
            if calmed_at.is_none() && mon.vol_ratio() <= 2.0 {
                calmed_at = Some(t);
            }
            if mon.state() == RegimeState::Ok {
                break;
            }
        }
        assert_eq!(mon.state(), RegimeState::Ok);
        let calmed_at = calmed_at.expect("ratio never calmed");
        // Reset must not have happened before the cool-off elapsed.
        assert!(t.saturating_sub(calmed_at) >= 30_000 - 1_000);
    }
}
