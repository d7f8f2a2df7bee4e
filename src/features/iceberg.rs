//! Iceberg detection from trade/depth divergence.
//!
//! For each price level near the touch, two exponentially decayed
//! accumulators are maintained:
//!
//! - `consumed`: volume traded into the level (aggressor opposite to the
//!   resting side)
//! - `observed`: the largest resting size seen at the level within the same
//!   window
//!
//! When consumption outruns what was ever visible (`consumed >= k * observed`
//! and `consumed >= min_hidden`), the level is flagged as holding hidden
//! liquidity and the excess is reported as the hidden-size estimate.
//!
//! The venue splits large aggressor orders into many prints with the same
//! timestamp, so same-millisecond prints are aggregated per (price, side)
//! before detection. Unclassified prints are skipped.

use std::collections::HashMap;

use tracing::debug;

use crate::config::IcebergConfig;
use crate::types::{AggressorSide, DomSnapshot, Side, TradeEvent};

/// A price level flagged as holding hidden liquidity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcebergFinding {
    pub price: f64,
    /// Resting side of the hidden order: `Buy` = bid-side support,
    /// `Sell` = ask-side resistance.
    pub side: Side,
    /// Consumed volume in excess of what was visible.
    pub est_hidden: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct LevelFlow {
    consumed: f64,
    observed: f64,
}

/// Rolling iceberg detector for the lead instrument.
#[derive(Debug)]
pub struct IcebergDetector {
    cfg: IcebergConfig,
    tick_size: f64,
    /// Decayed per-level flow, keyed by (resting side slot, price in ticks).
    flows: HashMap<(usize, i64), LevelFlow>,
    best_bid: Option<f64>,
    best_ask: Option<f64>,
    last_event_ms: Option<u64>,
    /// Same-millisecond prints awaiting aggregation: (price, volume, side).
    pending: Vec<(f64, f64, AggressorSide)>,
    pending_ms: Option<u64>,
    findings_flagged: u64,
}

impl IcebergDetector {
    pub fn new(cfg: IcebergConfig, tick_size: f64) -> Self {
        Self {
            cfg,
            tick_size,
            flows: HashMap::new(),
            best_bid: None,
            best_ask: None,
            last_event_ms: None,
            pending: Vec::new(),
            pending_ms: None,
            findings_flagged: 0,
        }
    }

    fn price_key(&self, price: f64) -> i64 {
        (price / self.tick_size).round() as i64
    }

    /// Decay all accumulators to `t_ms` and prune dead levels.
    fn decay_to(&mut self, t_ms: u64) {
        if let Some(last) = self.last_event_ms {
            if t_ms > last {
                let dt_s = (t_ms - last) as f64 / 1000.0;
                let factor = (-dt_s / self.cfg.window_s).exp();
                for flow in self.flows.values_mut() {
                    flow.consumed *= factor;
                    flow.observed *= factor;
                }
                self.flows
                    .retain(|_, f| f.consumed >= 1e-3 || f.observed >= 1e-3);
            }
        }
        self.last_event_ms = Some(self.last_event_ms.map_or(t_ms, |last| last.max(t_ms)));
    }

    fn within_band(&self, price: f64, reference: Option<f64>) -> bool {
        let Some(reference) = reference else {
            return false;
        };
        (price - reference).abs() <= self.cfg.band_ticks as f64 * self.tick_size + 1e-9
    }

    /// Record a depth snapshot: refresh best prices and the observed resting
    /// size of levels near the touch.
    pub fn on_dom(&mut self, dom: &DomSnapshot) {
        // Prints buffered before this snapshot belong to the previous book.
        self.flush_pending();
        self.decay_to(dom.t_ms);

        self.best_bid = Some(dom.best_bid);
        self.best_ask = Some(dom.best_ask);

        for &(price, size) in &dom.bids {
            if size > 0.0 && self.within_band(price, self.best_bid) {
                let key = (Side::Buy.index(), self.price_key(price));
                let flow = self.flows.entry(key).or_default();
                flow.observed = flow.observed.max(size);
            }
        }
        for &(price, size) in &dom.asks {
            if size > 0.0 && self.within_band(price, self.best_ask) {
                let key = (Side::Sell.index(), self.price_key(price));
                let flow = self.flows.entry(key).or_default();
                flow.observed = flow.observed.max(size);
            }
        }
    }

    /// Record a trade print. Unclassified prints are ignored.
    pub fn on_trade(&mut self, trade: &TradeEvent) {
        if trade.aggressor == AggressorSide::Unknown || trade.volume <= 0.0 {
            return;
        }
        if self.pending_ms.is_some_and(|ms| ms != trade.t_ms) {
            self.flush_pending();
        }
        self.decay_to(trade.t_ms);
        self.pending_ms = Some(trade.t_ms);
        self.pending
            .push((trade.price, trade.volume, trade.aggressor));
    }

    /// Aggregate buffered same-millisecond prints into the accumulators.
    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            self.pending_ms = None;
            return;
        }

        let mut agg: HashMap<(usize, i64), f64> = HashMap::new();
        for (price, volume, aggressor) in std::mem::take(&mut self.pending) {
            // A buy aggressor consumes the ask side; a sell aggressor the bid.
            let (resting, reference) = match aggressor {
                AggressorSide::Buy => (Side::Sell, self.best_ask),
                AggressorSide::Sell => (Side::Buy, self.best_bid),
                AggressorSide::Unknown => continue,
            };
            if !self.within_band(price, reference) {
                continue;
            }
            *agg.entry((resting.index(), self.price_key(price))).or_default() += volume;
        }
        self.pending_ms = None;

        for (key, volume) in agg {
            let flow = self.flows.entry(key).or_default();
            flow.consumed += volume;
            if flow.consumed >= self.cfg.k_ratio * flow.observed
                && flow.consumed >= self.cfg.min_hidden
            {
                self.findings_flagged += 1;
                debug!(
                    target: "index_maker::features",
                    price = key.1 as f64 * self.tick_size,
                    consumed = flow.consumed,
                    observed = flow.observed,
                    "hidden liquidity flagged"
                );
            }
        }
    }

    /// Current findings across all tracked levels.
    pub fn findings(&self) -> Vec<IcebergFinding> {
        self.flows
            .iter()
            .filter(|(_, f)| {
                f.consumed >= self.cfg.k_ratio * f.observed && f.consumed >= self.cfg.min_hidden
            })
            .map(|(&(side_idx, key), f)| IcebergFinding {
                price: key as f64 * self.tick_size,
                side: if side_idx == Side::Buy.index() {
                    Side::Buy
                } else {
                    Side::Sell
                },
                est_hidden: f.consumed - f.observed,
            })
            .collect()
    }

    /// Largest hidden-size estimate on `side` within `band_ticks` of `price`.
    ///
    /// Flushes nothing; callers drive flushing through `on_dom`/`on_trade`.
    pub fn max_hidden_within(&self, side: Side, price: f64, band_ticks: u32) -> f64 {
        let band = band_ticks as f64 * self.tick_size + 1e-9;
        self.findings()
            .iter()
            .filter(|f| f.side == side && (f.price - price).abs() <= band)
            .map(|f| f.est_hidden)
            .fold(0.0, f64::max)
    }

    /// Total levels ever flagged (observability counter).
    pub fn findings_flagged(&self) -> u64 {
        self.findings_flagged
    }

    /// Force aggregation of any buffered prints (end of batch or shutdown).
    pub fn flush(&mut self) {
        self.flush_pending();
    }

    pub fn reset(&mut self) {
        self.flows.clear();
        self.pending.clear();
        self.pending_ms = None;
        self.best_bid = None;
        self.best_ask = None;
        self.last_event_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::Instrument;
    use smallvec::smallvec;

    fn detector() -> IcebergDetector {
        IcebergDetector::new(IcebergConfig::default(), 0.25)
    }

    fn dom(t_ms: u64, best_bid: f64, best_ask: f64, bid_size: f64, ask_size: f64) -> DomSnapshot {
        DomSnapshot {
            t_ms,
            best_bid,
            best_ask,
            bids: smallvec![(best_bid, bid_size)],
            asks: smallvec![(best_ask, ask_size)],
        }
    }

    fn trade(t_ms: u64, price: f64, volume: f64, aggressor: AggressorSide) -> TradeEvent {
        TradeEvent {
            t_ms,
            instrument: Instrument::Es,
            price,
            volume,
            aggressor,
        }
    }

    #[test]
    fn test_heavy_consumption_at_ask_flags_resistance() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 50.0, 40.0));
        // 300 contracts print into a 40-lot visible ask: hidden seller.
        det.on_trade(&trade(1_001, 6800.25, 300.0, AggressorSide::Buy));
        det.flush();

        let findings = det.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].side, Side::Sell);
        assert_eq!(findings[0].price, 6800.25);
        assert!((findings[0].est_hidden - 260.0).abs() < 1e-9);
        assert!(det.max_hidden_within(Side::Sell, 6800.25, 3) >= 200.0);
        assert_eq!(det.max_hidden_within(Side::Buy, 6800.25, 3), 0.0);
    }

    #[test]
    fn test_sell_aggressor_flags_bid_support() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 30.0, 30.0));
        det.on_trade(&trade(1_001, 6800.0, 250.0, AggressorSide::Sell));
        det.flush();

        let findings = det.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].side, Side::Buy);
    }

    #[test]
    fn test_small_prints_do_not_flag() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 100.0, 100.0));
        det.on_trade(&trade(1_001, 6800.25, 50.0, AggressorSide::Buy));
        det.flush();
        assert!(det.findings().is_empty());
    }

    #[test]
    fn test_same_millisecond_prints_are_aggregated() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 50.0, 40.0));
        // The venue splits one 300-lot sweep into three prints.
        for _ in 0..3 {
            det.on_trade(&trade(1_001, 6800.25, 100.0, AggressorSide::Buy));
        }
        det.flush();
        let findings = det.findings();
        assert_eq!(findings.len(), 1);
        assert!((findings[0].est_hidden - 260.0).abs() < 1e-9);
    }

    #[test]
    fn test_unclassified_prints_are_skipped() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 50.0, 40.0));
        det.on_trade(&trade(1_001, 6800.25, 500.0, AggressorSide::Unknown));
        det.flush();
        assert!(det.findings().is_empty());
    }

    #[test]
    fn test_findings_decay_away() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 50.0, 40.0));
        det.on_trade(&trade(1_001, 6800.25, 300.0, AggressorSide::Buy));
        det.flush();
        assert_eq!(det.findings().len(), 1);

        // Seven windows later the accumulators have decayed below threshold.
        det.on_dom(&dom(36_001, 6800.0, 6800.25, 50.0, 40.0));
        assert!(det.findings().is_empty());
    }

    #[test]
    fn test_prints_outside_band_are_ignored() {
        let mut det = detector();
        det.on_dom(&dom(1_000, 6800.0, 6800.25, 50.0, 40.0));
        // Four ticks above the ask, outside the default three-tick band.
        det.on_trade(&trade(1_001, 6801.25, 500.0, AggressorSide::Buy));
        det.flush();
        assert!(det.findings().is_empty());
    }
}
