//! Log-price spread between two assets with a static OLS hedge ratio.

use crate::data::align_pair;
use crate::error::{EngineError, Result};
use crate::types::TimeSeries;
use serde::{Deserialize, Serialize};

/// Fewest overlapping observations a hedge-ratio regression accepts.
pub const MIN_HEDGE_OBSERVATIONS: usize = 2;

/// Result of regressing `y` on `x` with an intercept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgeFit {
    pub hedge_ratio: f64,
    pub intercept: f64,
}

/// Ordinary least squares `y = hedge_ratio * x + intercept`.
///
/// When `x` has no variance the slope is undefined; the fit then uses a zero
/// slope and the mean of `y` as intercept.
pub fn hedge_ratio(x: &[f64], y: &[f64]) -> Result<HedgeFit> {
    let n = x.len().min(y.len());
    if n < MIN_HEDGE_OBSERVATIONS {
        return Err(EngineError::insufficient(
            "hedge ratio",
            MIN_HEDGE_OBSERVATIONS,
            n,
        ));
    }
    let (x, y) = (&x[..n], &y[..n]);
    let nf = n as f64;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();

    if sxx <= f64::EPSILON * nf {
        return Ok(HedgeFit {
            hedge_ratio: 0.0,
            intercept: mean_y,
        });
    }

    let slope = sxy / sxx;
    Ok(HedgeFit {
        hedge_ratio: slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Spread series together with the fit that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadSeries {
    pub fit: HedgeFit,
    /// `ln(A) - hedge_ratio * ln(B)` on the overlapping dates.
    pub spread: TimeSeries,
}

/// Two tickers and their prices on the dates both trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub a: String,
    pub b: String,
    px_a: TimeSeries,
    px_b: TimeSeries,
}

impl Pair {
    /// Build a pair, restricting both legs to their common dates.
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        px_a: &TimeSeries,
        px_b: &TimeSeries,
    ) -> Self {
        let (px_a, px_b) = align_pair(px_a, px_b);
        Self {
            a: a.into(),
            b: b.into(),
            px_a,
            px_b,
        }
    }

    pub fn name(&self) -> String {
        format!("{}/{}", self.a, self.b)
    }

    pub fn len(&self) -> usize {
        self.px_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.px_a.is_empty()
    }

    pub fn prices(&self) -> (&TimeSeries, &TimeSeries) {
        (&self.px_a, &self.px_b)
    }

    /// Price ratio `A / B`.
    pub fn ratio(&self) -> TimeSeries {
        TimeSeries {
            index: self.px_a.index.clone(),
            values: self
                .px_a
                .values
                .iter()
                .zip(&self.px_b.values)
                .map(|(a, b)| a / b)
                .collect(),
        }
    }

    /// Log spread `ln(A) - beta * ln(B)`, with beta from a static regression
    /// of `ln(A)` on `ln(B)` over the whole overlap.
    pub fn log_spread(&self) -> Result<SpreadSeries> {
        let ln_a: Vec<f64> = self.px_a.values.iter().map(|p| p.ln()).collect();
        let ln_b: Vec<f64> = self.px_b.values.iter().map(|p| p.ln()).collect();

        let fit = hedge_ratio(&ln_b, &ln_a).map_err(|e| match e {
            EngineError::InsufficientData {
                required,
                available,
                ..
            } => EngineError::insufficient(
                format!("hedge ratio of {}", self.name()),
                required,
                available,
            ),
            other => other,
        })?;

        let mut index = Vec::with_capacity(ln_a.len());
        let mut values = Vec::with_capacity(ln_a.len());
        for ((date, la), lb) in self.px_a.index.iter().zip(&ln_a).zip(&ln_b) {
            let s = la - fit.hedge_ratio * lb;
            if s.is_finite() {
                index.push(*date);
                values.push(s);
            }
        }

        Ok(SpreadSeries {
            fit,
            spread: TimeSeries { index, values },
        })
    }
}
