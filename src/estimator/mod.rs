//! Online fair-value estimation for the lead instrument.
//!
//! Two structurally different models run side by side on the same tick
//! stream and are compared by the decision engine:
//!
//! - `kalman`: random-walk state-space model with time-varying betas
//! - `ridge`: recursive least squares with forgetting factor and L2 penalty
//!
//! Both regress the lead instrument on the correlated indices in
//! baseline-offset coordinates: regressors live on ~2e4 points while the
//! betas live on ~0.1, and subtracting the first complete observation keeps
//! the gain scales sane. Every update is wrapped in a non-finite guard; a
//! bad update is discarded and the prior state stands.

mod kalman;
mod regressors;
mod ridge;

pub use kalman::KalmanFairValue;
pub use ridge::RidgeFairValue;

pub(crate) use regressors::{Observation, RegressorState};

use crate::types::TickEvent;

/// Hard clamp on every component of the parameter vector.
pub(crate) const THETA_MAX: f64 = 100.0;
/// Hard clamp on every covariance entry.
pub(crate) const P_ENTRY_MAX: f64 = 1e6;
/// Innovation clip, in price points.
pub(crate) const INNOVATION_MAX: f64 = 100.0;
/// Euclidean bound on the gain vector.
pub(crate) const GAIN_NORM_MAX: f64 = 100.0;
/// Floor on the innovation variance / RLS denominator.
pub(crate) const DENOM_FLOOR: f64 = 1e-10;

/// Fair price and spread produced by one model update.
///
/// Spread is `fair - last_traded`, in index points, signed: positive means
/// the lead instrument looks cheap relative to its correlators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub fair: f64,
    pub spread: f64,
}

/// Common interface over the two pricing models.
///
/// The engine only needs updates, warm-up progress, and the stability
/// counter; tests substitute fixed-output mocks through this trait.
pub trait FairValueModel {
    /// Feed one tick. Returns the fair price and spread, or `None` when the
    /// observation is incomplete or the update was discarded by the
    /// numerical guard.
    fn on_tick(&mut self, tick: &TickEvent) -> Option<ModelOutput>;

    /// Number of accepted updates since the baseline was set.
    fn valid_updates(&self) -> usize;

    /// Updates discarded by the non-finite guard.
    fn guard_skips(&self) -> u64;

    /// Most recent output, if any.
    fn last_output(&self) -> Option<ModelOutput>;

    /// Drop all learned state, keeping configuration.
    fn reset(&mut self);
}

/// Clamp helper shared by both models.
pub(crate) fn clamp_abs(value: f64, max: f64) -> f64 {
    value.clamp(-max, max)
}
