//! Rebalancing policies.
//!
//! A policy is a pure decision: given the weights currently held and the
//! target, it returns the weights to hold next together with an explicit flag
//! saying whether a rebalance happened. Callers never compare weight vectors
//! to infer the flag.

use crate::portfolio::WeightVector;
use serde::{Deserialize, Serialize};

/// Default drift tolerance for threshold rebalancing.
pub const DEFAULT_DRIFT_TOLERANCE: f64 = 0.02;

/// Which policy family to use; resolved into a [`RebalancePolicy`] with engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebalanceMode {
    #[default]
    ThresholdDrift,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RebalancePolicy {
    /// Snap the whole vector to target when any target ticker drifts more than `tolerance`.
    ThresholdDrift { tolerance: f64 },
    /// Snap to target every `every` steps, skipping step 0.
    Periodic { every: usize },
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        RebalancePolicy::ThresholdDrift {
            tolerance: DEFAULT_DRIFT_TOLERANCE,
        }
    }
}

/// Outcome of one policy consultation.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceDecision {
    pub weights: WeightVector,
    pub rebalanced: bool,
}

impl RebalancePolicy {
    pub fn from_mode(mode: RebalanceMode, tolerance: f64, every: usize) -> Self {
        match mode {
            RebalanceMode::ThresholdDrift => RebalancePolicy::ThresholdDrift { tolerance },
            RebalanceMode::Periodic => RebalancePolicy::Periodic { every },
        }
    }

    /// Decide the weights for `step`.
    pub fn decide(
        &self,
        step: usize,
        current: &WeightVector,
        target: &WeightVector,
    ) -> RebalanceDecision {
        let rebalance = match *self {
            RebalancePolicy::ThresholdDrift { tolerance } => target
                .iter()
                .any(|(ticker, w)| (current.get(ticker) - w).abs() > tolerance),
            RebalancePolicy::Periodic { every } => every > 0 && step > 0 && step % every == 0,
        };

        if rebalance {
            RebalanceDecision {
                weights: target.clone(),
                rebalanced: true,
            }
        } else {
            RebalanceDecision {
                weights: current.clone(),
                rebalanced: false,
            }
        }
    }
}
