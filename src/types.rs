//! Core data types shared by the portfolio and pairs engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EngineError, Result};

/// A dated scalar series with a strictly increasing index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub index: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series, checking that index and values line up and the index is increasing.
    pub fn new(index: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(EngineError::InvalidInput(format!(
                "series index has {} entries but {} values",
                index.len(),
                values.len()
            )));
        }
        if let Some(w) = index.windows(2).find(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidInput(format!(
                "series index not strictly increasing at {}",
                w[1]
            )));
        }
        Ok(Self { index, values })
    }

    /// Build a series from `(date, value)` points that are already sorted.
    pub fn from_points(points: impl IntoIterator<Item = (DateTime<Utc>, f64)>) -> Result<Self> {
        let (index, values): (Vec<_>, Vec<_>) = points.into_iter().unzip();
        Self::new(index, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(date, value)` pairs in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.index.iter().copied().zip(self.values.iter().copied())
    }

    /// Value at an exact date, if present.
    pub fn get(&self, date: &DateTime<Utc>) -> Option<f64> {
        self.index
            .binary_search(date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Same index, new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        Self::new(self.index.clone(), values)
    }

    /// First and last dates of the series.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((*self.index.first()?, *self.index.last()?))
    }
}

/// How per-asset returns are computed from prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    /// `p_t / p_{t-1} - 1`
    #[default]
    Simple,
    /// `ln(p_t) - ln(p_{t-1})`
    Log,
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Simple => write!(f, "simple"),
            ReturnKind::Log => write!(f, "log"),
        }
    }
}

/// Direction of an open spread position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadSide {
    /// Long A, short B: expects the spread to rise.
    Long,
    /// Short A, long B: expects the spread to fall.
    Short,
}

impl SpreadSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            SpreadSide::Long => 1.0,
            SpreadSide::Short => -1.0,
        }
    }
}

impl fmt::Display for SpreadSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpreadSide::Long => write!(f, "LONG"),
            SpreadSide::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a spread position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// `|z|` fell inside the close band.
    Reverted,
    /// Holding period reached the configured maximum.
    Timeout,
}

/// A closed round trip in spread space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub side: SpreadSide,
    pub entry_value: f64,
    pub exit_value: f64,
    /// Realized PnL net of the round-trip cost.
    pub pnl: f64,
    pub holding_days: i64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Well-known KPI names.
pub mod kpi {
    pub const TOTAL_RETURN: &str = "total_return";
    pub const ANN_VOL: &str = "ann_vol";
    pub const HIST_VAR: &str = "hist_VaR";
    pub const HIST_CVAR: &str = "hist_CVaR";
    pub const NORM_VAR: &str = "norm_VaR";
    pub const SHARPE: &str = "sharpe";
    pub const SORTINO: &str = "sortino";
    pub const MAX_DRAWDOWN: &str = "max_drawdown";
    pub const CALMAR: &str = "calmar";
    pub const N_DAYS: &str = "n_days";
    pub const TURNOVER: &str = "turnover";
    pub const COST: &str = "cost";

    pub const N_TRADES: &str = "n_trades";
    pub const TOTAL_PNL: &str = "total_pnl";
    pub const WIN_RATE: &str = "win_rate";
    pub const AVG_DAYS: &str = "avg_days";

    /// Keys every return-series report carries.
    pub const CORE: [&str; 9] = [
        TOTAL_RETURN,
        ANN_VOL,
        HIST_VAR,
        HIST_CVAR,
        SHARPE,
        SORTINO,
        MAX_DRAWDOWN,
        CALMAR,
        N_DAYS,
    ];

    /// Keys every pairs report carries.
    pub const PAIRS: [&str; 4] = [N_TRADES, TOTAL_PNL, WIN_RATE, AVG_DAYS];
}

/// Mapping of metric name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpiReport(BTreeMap<String, f64>);

impl KpiReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A report with every given key set to zero.
    pub fn zeroed(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| (k.to_string(), 0.0)).collect())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_series_rejects_length_mismatch() {
        let err = TimeSeries::new(vec![day(1), day(2)], vec![1.0]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_series_rejects_unsorted_index() {
        assert!(TimeSeries::new(vec![day(2), day(1)], vec![1.0, 2.0]).is_err());
        assert!(TimeSeries::new(vec![day(1), day(1)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_series_lookup() {
        let s = TimeSeries::new(vec![day(1), day(3), day(5)], vec![1.0, 3.0, 5.0]).unwrap();
        assert_eq!(s.get(&day(3)), Some(3.0));
        assert_eq!(s.get(&day(4)), None);
        assert_eq!(s.date_range(), Some((day(1), day(5))));
    }

    #[test]
    fn test_zeroed_report() {
        let report = KpiReport::zeroed(&kpi::CORE);
        assert_eq!(report.len(), kpi::CORE.len());
        assert!(report.iter().all(|(_, v)| v == 0.0));
    }

    #[test]
    fn test_report_serializes_as_flat_map() {
        let mut report = KpiReport::new();
        report.insert(kpi::SHARPE, 1.5);
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"sharpe":1.5}"#);
    }

    #[test]
    fn test_spread_side_sign() {
        assert_eq!(SpreadSide::Long.sign(), 1.0);
        assert_eq!(SpreadSide::Short.sign(), -1.0);
    }
}
