#![deny(unreachable_pub)]

//! Passive market-making decision core for CME equity index futures.
//!
//! The crate turns a raw multi-instrument feed (lead instrument plus
//! correlated indices and a risk-regime proxy) into passive order commands:
//!
//! - **estimator**: two independent online fair-value models (Kalman filter
//!   with time-varying betas, forgetting-factor ridge regression)
//! - **features**: weighted order-book imbalance, iceberg detection, and a
//!   relative-volatility regime circuit breaker
//! - **engine**: layered entry gates and a per-side passive order lifecycle
//! - **ingress**: wire-frame normalization into typed events
//! - **runtime**: bounded event queue and the serial engine loop

pub mod config;
pub mod engine;
mod errors;
pub mod estimator;
pub mod features;
pub mod infra;
pub mod ingress;
pub mod runtime;
pub mod sink;
pub mod types;

pub use config::{
    IcebergConfig, KalmanConfig, MakerConfig, ObiConfig, RegimeConfig, RidgeConfig,
};
pub use engine::{EngineCounters, EntrySignal, MakerEngine, RejectReason};
pub use errors::{ConfigError, Error, FrameError};
pub use estimator::{FairValueModel, KalmanFairValue, ModelOutput, RidgeFairValue};
pub use features::{
    IcebergDetector, IcebergFinding, ObiCalculator, RegimeMonitor, RegimeState,
};
pub use infra::logging::{init_logging, targets as log_targets, LogConfig, LogFormat};
pub use ingress::{
    dotnet_ticks_to_unix_ms, Frame, IngressHealth, IngressNormalizer, Instrument,
};
pub use runtime::EventQueue;
pub use sink::{encode_wire, OrderSink, RecordingSink};
pub use types::{
    AggressorSide, BookLevels, DomSnapshot, EngineEvent, OrderCommand, OrderPhase, OrderType,
    RestingOrder, Side, TickEvent, TradeEvent,
};

/// Floating-point comparison tolerance used across the crate.
pub const EPSILON: f64 = 1e-9;
