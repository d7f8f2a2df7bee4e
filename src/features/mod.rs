//! Microstructure feature pipeline.
//!
//! - `obi`: weighted order-book imbalance, a pure function of the snapshot
//! - `iceberg`: hidden-liquidity estimation from trade/depth divergence
//! - `regime`: BTC relative-volatility circuit breaker

mod iceberg;
mod obi;
mod regime;

pub use iceberg::{IcebergDetector, IcebergFinding};
pub use obi::ObiCalculator;
pub use regime::{RegimeMonitor, RegimeState};
