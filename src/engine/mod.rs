//! Decision engine and order lifecycle.
//!
//! `MakerEngine` owns every piece of strategy state: both pricing models,
//! the feature detectors, the regime monitor, and the per-side order
//! register. `on_tick` and `on_dom` are the only decision entry points;
//! position and monitored-limit events reconcile the register against the
//! executor, which is authoritative.
//!
//! The engine is synchronous and single-threaded. Every call is a
//! microsecond-scale computation; timeouts are checked lazily against event
//! timestamps, so no timer thread exists and replays are deterministic.

mod gates;
mod lifecycle;
mod metrics;

pub use gates::{EntrySignal, GateContext, RejectReason};
pub use metrics::EngineCounters;

use tracing::{debug, info, warn};

use crate::config::MakerConfig;
use crate::errors::ConfigError;
use crate::estimator::{FairValueModel, KalmanFairValue, ModelOutput, RidgeFairValue};
use crate::features::{IcebergDetector, ObiCalculator, RegimeMonitor, RegimeState};
use crate::sink::{encode_wire, OrderSink};
use crate::types::{
    DomSnapshot, EngineEvent, OrderCommand, OrderPhase, Side, TickEvent, TradeEvent,
};
use crate::EPSILON;

use lifecycle::OrderRegister;

/// The market-making decision core.
pub struct MakerEngine<S: OrderSink> {
    cfg: MakerConfig,
    kalman: KalmanFairValue,
    ridge: RidgeFairValue,
    obi_calc: ObiCalculator,
    iceberg: IcebergDetector,
    regime: RegimeMonitor,
    register: OrderRegister,
    sink: S,

    last_dom: Option<DomSnapshot>,
    last_obi: f64,
    last_kf: Option<ModelOutput>,
    last_rd: Option<ModelOutput>,
    /// Executor-reported signed position (authoritative).
    position: f64,
    /// One CLOSE_ALL per regime trip.
    flatten_sent: bool,
    /// Event time since which the side's gates have been failing, used for
    /// the invalidation cancel.
    gates_false_since: [Option<u64>; 2],
    counters: EngineCounters,
}

impl<S: OrderSink> MakerEngine<S> {
    /// Build an engine. Configuration violations are fatal here.
    pub fn new(cfg: MakerConfig, sink: S) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            kalman: KalmanFairValue::new(cfg.kalman),
            ridge: RidgeFairValue::new(cfg.ridge),
            obi_calc: ObiCalculator::new(cfg.obi),
            iceberg: IcebergDetector::new(cfg.iceberg, cfg.tick_size),
            regime: RegimeMonitor::new(cfg.regime),
            register: OrderRegister::new(),
            sink,
            last_dom: None,
            last_obi: 0.0,
            last_kf: None,
            last_rd: None,
            position: 0.0,
            flatten_sent: false,
            gates_false_since: [None, None],
            counters: EngineCounters::default(),
            cfg,
        })
    }

    /// Dispatch one normalized event.
    pub fn on_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Tick(tick) => self.on_tick(tick),
            EngineEvent::Dom(dom) => self.on_dom(dom),
            EngineEvent::Trade(trade) => self.on_trade(trade),
            EngineEvent::Position {
                t_ms,
                signed_volume,
            } => self.on_position(*t_ms, *signed_volume),
            EngineEvent::MonitoredLimit { t_ms, price } => {
                self.on_monitored_limit(*t_ms, *price)
            }
        }
    }

    /// Tick entry point: update regime and both models, then decide.
    pub fn on_tick(&mut self, tick: &TickEvent) {
        self.counters.ticks += 1;

        let regime_was_ok = self.regime.is_ok();
        if let Some(btc) = tick.btc {
            self.regime.on_btc(tick.t_ms, btc);
        }

        // A guard-discarded update blanks the signal for this tick rather
        // than trading on stale model output.
        self.last_kf = self.kalman.on_tick(tick);
        self.last_rd = self.ridge.on_tick(tick);

        if regime_was_ok && !self.regime.is_ok() {
            warn!(
                target: "index_maker::engine",
                ratio = self.regime.vol_ratio(),
                position = self.position,
                "regime tripped"
            );
            if self.position != 0.0 && !self.flatten_sent {
                self.flatten_sent = true;
                self.counters.flattens += 1;
                self.emit(OrderCommand::CloseAll);
            }
        }
        if self.regime.is_ok() {
            self.flatten_sent = false;
        }

        self.decide(tick.t_ms);
    }

    /// Depth entry point: refresh book-derived features, then decide.
    pub fn on_dom(&mut self, dom: &DomSnapshot) {
        self.counters.doms += 1;
        self.iceberg.on_dom(dom);
        self.last_obi = self.obi_calc.calculate(dom);
        self.last_dom = Some(dom.clone());
        self.decide(dom.t_ms);
    }

    /// Lead-instrument trade print: feeds the iceberg detector only.
    pub fn on_trade(&mut self, trade: &TradeEvent) {
        self.counters.trades += 1;
        self.iceberg.on_trade(trade);
    }

    /// Executor-reported position. A delta toward a working order's side
    /// marks that order filled.
    pub fn on_position(&mut self, _t_ms: u64, signed_volume: f64) {
        let delta = signed_volume - self.position;
        if delta.abs() < EPSILON {
            return;
        }
        info!(
            target: "index_maker::engine",
            from = self.position,
            to = signed_volume,
            "position synced from executor"
        );
        self.position = signed_volume;
        if self.register.on_position_delta(delta).is_some() {
            self.counters.orders_filled += 1;
        }
    }

    /// Venue-observed active-limit price (0 = none). Reconciles the order
    /// register.
    pub fn on_monitored_limit(&mut self, _t_ms: u64, price: f64) {
        let outcome = self
            .register
            .on_monitored_limit(price, self.cfg.tick_size / 2.0);
        self.counters.orders_cancelled_externally += outcome.cleared_externally as u64;
    }

    /// Run the gate pipeline and the order lifecycle for one event time.
    fn decide(&mut self, t_ms: u64) {
        self.iceberg.flush();

        let outcome = {
            let ctx = GateContext {
                cfg: &self.cfg,
                kalman_updates: self.kalman.valid_updates(),
                ridge_updates: self.ridge.valid_updates(),
                spread_kf: self.last_kf.map(|o| o.spread),
                spread_rd: self.last_rd.map(|o| o.spread),
                regime_ok: self.regime.is_ok(),
                obi: self.last_obi,
                dom: self.last_dom.as_ref(),
                iceberg: &self.iceberg,
            };
            gates::evaluate(&ctx)
        };

        match outcome {
            Ok(signal) => {
                // The spread sign is unique, so at most one side qualifies
                // per event; the opposite side is by definition failing.
                self.gates_false_since[signal.side.index()] = None;
                self.mark_gates_false(signal.side.opposite(), t_ms);

                self.manage_orders(t_ms, Some(signal));

                if !self.register.has_working(signal.side) {
                    let cmd = self.register.place(signal.side, signal.price, 1, t_ms);
                    self.counters.orders_placed += 1;
                    self.emit(cmd);
                }
            }
            Err(reason) => {
                self.counters.record_rejection(reason);
                debug!(
                    target: "index_maker::engine",
                    %reason,
                    "entry rejected"
                );
                self.mark_gates_false(Side::Buy, t_ms);
                self.mark_gates_false(Side::Sell, t_ms);
                self.manage_orders(t_ms, None);
            }
        }
    }

    fn mark_gates_false(&mut self, side: Side, t_ms: u64) {
        self.gates_false_since[side.index()].get_or_insert(t_ms);
    }

    /// Working-order maintenance: timeout, invalidation, re-pricing.
    fn manage_orders(&mut self, t_ms: u64, signal: Option<EntrySignal>) {
        for side in [Side::Buy, Side::Sell] {
            let Some(&order) = self.register.order(side) else {
                continue;
            };
            if order.phase == OrderPhase::PendingCancel {
                continue;
            }

            // Timeout: unfilled past the deadline.
            if t_ms.saturating_sub(order.placed_ms) > self.cfg.cancel_timeout_ms {
                if let Some(cmd) = self.register.cancel(side, "timeout") {
                    self.counters.orders_cancelled += 1;
                    self.emit(cmd);
                }
                continue;
            }

            // Invalidation: a gate that was passing has stayed false.
            if let Some(since) = self.gates_false_since[side.index()] {
                if t_ms.saturating_sub(since) >= self.cfg.invalidation_ms {
                    if let Some(cmd) = self.register.cancel(side, "signal_invalidated") {
                        self.counters.orders_cancelled += 1;
                        self.emit(cmd);
                    }
                    continue;
                }
            }

            // Re-pricing with hysteresis; after too many unconfirmed
            // modifies, fall back to cancel-and-replace.
            let Some(signal) = signal else { continue };
            if signal.side != side || order.phase != OrderPhase::Live {
                continue;
            }
            let drift = (signal.price - order.price).abs();
            if drift + EPSILON >= self.cfg.reprice_hysteresis_ticks * self.cfg.tick_size {
                if order.modify_attempts >= self.cfg.max_modify_attempts {
                    if let Some(cmd) = self.register.cancel(side, "reprice_fallback") {
                        self.counters.orders_cancelled += 1;
                        self.emit(cmd);
                    }
                } else if let Some(cmd) = self.register.modify(side, signal.price) {
                    self.counters.orders_modified += 1;
                    self.emit(cmd);
                }
            }
        }
    }

    /// Emit a final CLOSE_ALL (shutdown path).
    pub fn flatten_all(&mut self) {
        self.counters.flattens += 1;
        self.emit(OrderCommand::CloseAll);
    }

    /// Fire-and-forget emission. Send failures are counted, never retried,
    /// and never roll back order state; reconciliation resynchronises.
    fn emit(&mut self, cmd: OrderCommand) {
        debug!(
            target: "index_maker::engine",
            wire = %encode_wire(&cmd),
            "emitting command"
        );
        if !self.sink.send(&cmd) {
            self.counters.send_failures += 1;
            warn!(
                target: "index_maker::engine",
                wire = %encode_wire(&cmd),
                "order sink rejected command"
            );
        }
    }

    // === Observability accessors ===

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Latest Kalman spread in ticks, if the model has output.
    pub fn last_spread_ticks(&self) -> Option<f64> {
        self.last_kf.map(|o| o.spread / self.cfg.tick_size)
    }

    /// Latest Kalman fair price.
    pub fn last_fair(&self) -> Option<f64> {
        self.last_kf.map(|o| o.fair)
    }

    pub fn last_obi(&self) -> f64 {
        self.last_obi
    }

    pub fn regime_state(&self) -> RegimeState {
        self.regime.state()
    }

    pub fn kalman(&self) -> &KalmanFairValue {
        &self.kalman
    }

    pub fn ridge(&self) -> &RidgeFairValue {
        &self.ridge
    }

    pub fn iceberg(&self) -> &IcebergDetector {
        &self.iceberg
    }

    pub fn config(&self) -> &MakerConfig {
        &self.cfg
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
