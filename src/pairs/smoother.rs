//! State-space smoothing of a noisy scalar series.
//!
//! The primary estimator is a local-level Kalman filter:
//!
//! ```text
//! x[t] = x[t-1] + w,  w ~ N(0, q)
//! y[t] = x[t]   + v,  v ~ N(0, r)
//! ```
//!
//! [`Smoother::filter`] is causal: the estimate at `t` uses only `y[..=t]`
//! and is what drives trading. [`Smoother::smooth`] runs a backward
//! Rauch-Tung-Striebel pass on top and looks ahead; it is for diagnostics.
//!
//! When the Kalman parameters cannot form a valid model the builder falls
//! back to a trailing rolling mean. Output length is the same either way.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_PROCESS_VAR: f64 = 1e-3;
pub const DEFAULT_OBS_VAR: f64 = 1e-2;
pub const DEFAULT_INITIAL_STATE_VAR: f64 = 1.0;

pub const FALLBACK_WINDOW: usize = 10;
pub const FALLBACK_MIN_PERIODS: usize = 3;

/// A scalar series smoother. Values that cannot be estimated yet are `NaN`.
pub trait Smoother: Send + Sync {
    fn name(&self) -> &str;

    /// Causal estimate at every index.
    fn filter(&self, y: &[f64]) -> Vec<f64>;

    /// Estimate at every index using the whole series.
    fn smooth(&self, y: &[f64]) -> Vec<f64> {
        self.filter(y)
    }
}

/// Which smoother to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmootherKind {
    #[default]
    Kalman,
    RollingMean,
}

/// Local-level Kalman filter and RTS smoother.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanSmoother {
    process_var: f64,
    obs_var: f64,
    initial_state_var: f64,
}

/// Forward pass output.
struct FilterPass {
    predicted_mean: Vec<f64>,
    predicted_var: Vec<f64>,
    filtered_mean: Vec<f64>,
    filtered_var: Vec<f64>,
}

impl KalmanSmoother {
    /// Build a filter with process variance `q` and observation variance `r`.
    ///
    /// Fails with [`EngineError::MissingEstimator`] unless `q >= 0` and `r > 0`.
    pub fn new(process_var: f64, obs_var: f64) -> Result<Self> {
        if !(process_var.is_finite() && process_var >= 0.0) {
            return Err(EngineError::MissingEstimator(format!(
                "Kalman process variance must be finite and non-negative, got {}",
                process_var
            )));
        }
        if !(obs_var.is_finite() && obs_var > 0.0) {
            return Err(EngineError::MissingEstimator(format!(
                "Kalman observation variance must be finite and positive, got {}",
                obs_var
            )));
        }
        Ok(Self {
            process_var,
            obs_var,
            initial_state_var: DEFAULT_INITIAL_STATE_VAR,
        })
    }

    fn forward(&self, y: &[f64]) -> FilterPass {
        let n = y.len();
        let mut pass = FilterPass {
            predicted_mean: Vec::with_capacity(n),
            predicted_var: Vec::with_capacity(n),
            filtered_mean: Vec::with_capacity(n),
            filtered_var: Vec::with_capacity(n),
        };

        // Initial state is the first finite observation.
        let Some(first) = y.iter().copied().find(|v| v.is_finite()) else {
            pass.filtered_mean = vec![f64::NAN; n];
            return pass;
        };

        let mut mean = first;
        let mut var = self.initial_state_var;

        for (t, &obs) in y.iter().enumerate() {
            if t > 0 {
                var += self.process_var;
            }
            pass.predicted_mean.push(mean);
            pass.predicted_var.push(var);

            // Missing observations skip the update.
            if obs.is_finite() {
                let gain = var / (var + self.obs_var);
                mean += gain * (obs - mean);
                var *= 1.0 - gain;
            }
            pass.filtered_mean.push(mean);
            pass.filtered_var.push(var);
        }
        pass
    }
}

impl Smoother for KalmanSmoother {
    fn name(&self) -> &str {
        "kalman"
    }

    fn filter(&self, y: &[f64]) -> Vec<f64> {
        self.forward(y).filtered_mean
    }

    fn smooth(&self, y: &[f64]) -> Vec<f64> {
        let pass = self.forward(y);
        let n = pass.filtered_mean.len();
        if n == 0 || pass.predicted_var.len() != n {
            return pass.filtered_mean;
        }

        let mut smoothed = pass.filtered_mean.clone();
        for t in (0..n - 1).rev() {
            let pred_var = pass.predicted_var[t + 1];
            let gain = if pred_var > 0.0 {
                pass.filtered_var[t] / pred_var
            } else {
                0.0
            };
            smoothed[t] =
                pass.filtered_mean[t] + gain * (smoothed[t + 1] - pass.predicted_mean[t + 1]);
        }
        smoothed
    }
}

/// Trailing rolling mean over finite values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingMeanSmoother {
    window: usize,
    min_periods: usize,
}

impl Default for RollingMeanSmoother {
    fn default() -> Self {
        Self::new(FALLBACK_WINDOW, FALLBACK_MIN_PERIODS)
    }
}

impl RollingMeanSmoother {
    pub fn new(window: usize, min_periods: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            min_periods: min_periods.clamp(1, window),
        }
    }
}

impl Smoother for RollingMeanSmoother {
    fn name(&self) -> &str {
        "rolling-mean"
    }

    fn filter(&self, y: &[f64]) -> Vec<f64> {
        (0..y.len())
            .map(|t| {
                let start = (t + 1).saturating_sub(self.window);
                let finite: Vec<f64> = y[start..=t].iter().copied().filter(|v| v.is_finite()).collect();
                if finite.len() < self.min_periods {
                    f64::NAN
                } else {
                    finite.iter().sum::<f64>() / finite.len() as f64
                }
            })
            .collect()
    }
}

/// Build the requested smoother, falling back to the rolling mean when the
/// Kalman model cannot be constructed.
pub fn build_smoother(kind: SmootherKind, process_var: f64, obs_var: f64) -> Box<dyn Smoother> {
    match kind {
        SmootherKind::Kalman => match KalmanSmoother::new(process_var, obs_var) {
            Ok(k) => Box::new(k),
            Err(e) => {
                warn!("{}; falling back to rolling-mean smoothing", e);
                Box::new(RollingMeanSmoother::default())
            }
        },
        SmootherKind::RollingMean => Box::new(RollingMeanSmoother::default()),
    }
}
