//! Portfolio weights and transaction-cost accounting.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping of ticker to weight.
///
/// Raw weights may be any non-negative numbers; only [`WeightVector::normalized`]
/// output should be applied to returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<String, f64>);

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equal weights over the given tickers.
    pub fn equal(tickers: &[String]) -> Self {
        let w = if tickers.is_empty() {
            0.0
        } else {
            1.0 / tickers.len() as f64
        };
        tickers.iter().map(|t| (t.clone(), w)).collect()
    }

    pub fn get(&self, ticker: &str) -> f64 {
        self.0.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, ticker: impl Into<String>, weight: f64) {
        self.0.insert(ticker.into(), weight);
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Scale every weight so the vector sums to one.
    ///
    /// Fails with [`EngineError::InvalidWeights`] when the sum is not positive.
    pub fn normalized(&self) -> Result<WeightVector> {
        let total = self.sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(EngineError::InvalidWeights(format!(
                "weights must sum to a positive number, got {} over [{}]",
                total,
                self.0.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(self.0.iter().map(|(k, v)| (k.clone(), v / total)).collect())
    }
}

impl FromIterator<(String, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, f64); N]> for WeightVector {
    fn from(pairs: [(&str, f64); N]) -> Self {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

fn union_tickers<'a>(a: &'a WeightVector, b: &'a WeightVector) -> BTreeSet<&'a str> {
    a.tickers().chain(b.tickers()).collect()
}

/// L1 turnover: sum of absolute weight changes over every tracked ticker.
pub fn turnover(current: &WeightVector, proposed: &WeightVector) -> f64 {
    union_tickers(current, proposed)
        .into_iter()
        .map(|t| (proposed.get(t) - current.get(t)).abs())
        .sum()
}

/// Proportional cost in basis points of traded notional.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    pub cost_bps: f64,
}

impl CostModel {
    pub fn new(cost_bps: f64) -> Self {
        Self { cost_bps }
    }

    /// Cost, as a return fraction, of trading `turnover` of the portfolio.
    pub fn rebalance_cost(&self, turnover: f64) -> f64 {
        self.cost_bps / 10_000.0 * turnover
    }

    /// Round-trip cost of a two-leg spread position: two assets, each opened and closed.
    pub fn spread_round_trip(&self) -> f64 {
        self.cost_bps / 10_000.0 * 4.0
    }
}
