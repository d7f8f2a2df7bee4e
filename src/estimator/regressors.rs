//! Shared observation handling for the pricing models.
//!
//! Each model keeps its own last-valid correlator cache so a dropped NQ or
//! YM packet carries the previous price forward instead of injecting a zero,
//! and its own baseline so resetting one model never disturbs the other.

use nalgebra::Vector3;

use crate::types::TickEvent;

/// Result of folding one tick into the regressor state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Observation {
    /// Correlator prices are still unknown; nothing to do.
    Incomplete,
    /// First complete observation: baselines were recorded. Fair price is
    /// the observed price itself and the spread is zero by construction;
    /// this does not count as a model update.
    BaselineSet { es: f64 },
    /// A regression frame in baseline-offset coordinates. `es0` is the
    /// baseline lead price for mapping fair values back to absolute terms.
    Frame {
        x: Vector3<f64>,
        y: f64,
        es: f64,
        es0: f64,
    },
}

/// Carry-forward cache plus baseline offsets.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RegressorState {
    last_nq: Option<f64>,
    last_ym: Option<f64>,
    /// `(es0, nq0, ym0)` from the first complete observation.
    base: Option<(f64, f64, f64)>,
}

impl RegressorState {
    /// Fold a tick in, refreshing the carry-forward cache.
    pub(crate) fn observe(&mut self, tick: &TickEvent) -> Observation {
        if let Some(nq) = tick.nq {
            self.last_nq = Some(nq);
        }
        if let Some(ym) = tick.ym {
            self.last_ym = Some(ym);
        }

        let (Some(nq), Some(ym)) = (self.last_nq, self.last_ym) else {
            return Observation::Incomplete;
        };
        let es = tick.es;
        if !es.is_finite() || !nq.is_finite() || !ym.is_finite() {
            return Observation::Incomplete;
        }

        match self.base {
            None => {
                self.base = Some((es, nq, ym));
                Observation::BaselineSet { es }
            }
            Some((es0, nq0, ym0)) => Observation::Frame {
                x: Vector3::new(nq - nq0, ym - ym0, 1.0),
                y: es - es0,
                es,
                es0,
            },
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(es: f64, nq: Option<f64>, ym: Option<f64>) -> TickEvent {
        TickEvent {
            t_ms: 0,
            es,
            nq,
            ym,
            btc: None,
        }
    }

    #[test]
    fn test_incomplete_until_both_correlators_seen() {
        let mut state = RegressorState::default();
        assert_eq!(state.observe(&tick(6800.0, None, None)), Observation::Incomplete);
        assert_eq!(
            state.observe(&tick(6800.0, Some(21500.0), None)),
            Observation::Incomplete
        );
        assert_eq!(
            state.observe(&tick(6800.0, Some(21500.0), Some(44000.0))),
            Observation::BaselineSet { es: 6800.0 }
        );
    }

    #[test]
    fn test_carry_forward_after_baseline() {
        let mut state = RegressorState::default();
        state.observe(&tick(6800.0, Some(21500.0), Some(44000.0)));
        // YM goes missing; the last value is carried forward.
        let obs = state.observe(&tick(6801.0, Some(21510.0), None));
        match obs {
            Observation::Frame { x, y, es0, .. } => {
                assert_eq!(es0, 6800.0);
                assert_eq!(x[0], 10.0);
                assert_eq!(x[1], 0.0);
                assert_eq!(x[2], 1.0);
                assert_eq!(y, 1.0);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_price_is_incomplete() {
        let mut state = RegressorState::default();
        state.observe(&tick(6800.0, Some(21500.0), Some(44000.0)));
        assert_eq!(
            state.observe(&tick(f64::NAN, Some(21500.0), Some(44000.0))),
            Observation::Incomplete
        );
    }
}
