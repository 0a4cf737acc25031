//! Price table loading, validation, and reshaping.
//!
//! The engines consume a long-format table of `(date, ticker, adj_close)`
//! rows. This module reads that table from CSV, rejects malformed input, and
//! pivots it into the dense wide matrix the portfolio engine steps through.

use crate::error::{EngineError, Result};
use crate::types::TimeSeries;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Columns a price CSV must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["date", "ticker", "adj_close"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    ticker: String,
    adj_close: f64,
}

/// One observation of an adjusted close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: DateTime<Utc>,
    pub ticker: String,
    pub adj_close: f64,
}

impl PriceRecord {
    pub fn new(date: DateTime<Utc>, ticker: impl Into<String>, adj_close: f64) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            adj_close,
        }
    }
}

/// Validated long-format price table, sorted by ticker then date.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    rows: Vec<PriceRecord>,
}

impl PriceTable {
    /// Validate and sort a set of rows.
    ///
    /// Tickers are upper-cased. Prices must be finite and positive, and each
    /// `(date, ticker)` key may appear only once.
    pub fn new(rows: Vec<PriceRecord>) -> Result<Self> {
        let mut rows: Vec<PriceRecord> = rows
            .into_iter()
            .map(|mut r| {
                r.ticker = r.ticker.trim().to_uppercase();
                r
            })
            .collect();

        for r in &rows {
            if r.ticker.is_empty() {
                return Err(EngineError::SchemaViolation(format!(
                    "empty ticker on {}",
                    r.date
                )));
            }
            if !r.adj_close.is_finite() || r.adj_close <= 0.0 {
                return Err(EngineError::SchemaViolation(format!(
                    "adj_close for {} on {} must be a positive finite number, got {}",
                    r.ticker, r.date, r.adj_close
                )));
            }
        }

        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

        if let Some(w) = rows
            .windows(2)
            .find(|w| w[0].ticker == w[1].ticker && w[0].date == w[1].date)
        {
            return Err(EngineError::SchemaViolation(format!(
                "duplicate row for {} on {}",
                w[0].ticker, w[0].date
            )));
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[PriceRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct tickers in sorted order.
    pub fn tickers(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.ticker.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.rows.iter().any(|r| r.ticker == ticker)
    }

    /// Price history for a single ticker.
    pub fn series(&self, ticker: &str) -> Option<TimeSeries> {
        let points: Vec<_> = self
            .rows
            .iter()
            .filter(|r| r.ticker == ticker)
            .map(|r| (r.date, r.adj_close))
            .collect();
        if points.is_empty() {
            return None;
        }
        // Rows are unique and sorted per ticker, so this cannot fail.
        TimeSeries::from_points(points).ok()
    }

    /// Pivot to dates x tickers, keeping only dates with a price for every ticker.
    pub fn pivot(&self) -> WidePriceMatrix {
        self.pivot_tickers(&self.tickers())
    }

    /// Pivot a subset of tickers. Tickers absent from the table are ignored.
    pub fn pivot_tickers(&self, tickers: &[String]) -> WidePriceMatrix {
        let wanted: BTreeSet<&str> = tickers.iter().map(String::as_str).collect();
        let mut by_date: BTreeMap<DateTime<Utc>, BTreeMap<&str, f64>> = BTreeMap::new();
        let mut present: BTreeSet<&str> = BTreeSet::new();

        for r in self.rows.iter().filter(|r| wanted.contains(r.ticker.as_str())) {
            by_date
                .entry(r.date)
                .or_default()
                .insert(r.ticker.as_str(), r.adj_close);
            present.insert(r.ticker.as_str());
        }

        let columns: Vec<String> = present.iter().map(|t| t.to_string()).collect();
        let mut dates = Vec::new();
        let mut values = Vec::new();
        let mut dropped = 0usize;

        for (date, prices) in by_date {
            if prices.len() == columns.len() {
                dates.push(date);
                values.push(columns.iter().map(|t| prices[t.as_str()]).collect());
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!("Dropped {} dates with an incomplete cross-section", dropped);
        }

        WidePriceMatrix {
            dates,
            tickers: columns,
            values,
        }
    }
}

/// Dates x tickers matrix of adjusted closes.
///
/// Cells may be `NaN` when a caller builds the matrix by hand; [`PriceTable::pivot`]
/// always produces a dense matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidePriceMatrix {
    pub dates: Vec<DateTime<Utc>>,
    pub tickers: Vec<String>,
    /// Row-major: `values[date][ticker]`.
    pub values: Vec<Vec<f64>>,
}

impl WidePriceMatrix {
    pub fn new(
        dates: Vec<DateTime<Utc>>,
        tickers: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(EngineError::InvalidInput(format!(
                "{} dates but {} price rows",
                dates.len(),
                values.len()
            )));
        }
        if let Some((i, row)) = values
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != tickers.len())
        {
            return Err(EngineError::InvalidInput(format!(
                "price row {} has {} columns, expected {}",
                i,
                row.len(),
                tickers.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidInput(
                "price matrix dates must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            dates,
            tickers,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// One ticker's prices as a dated series.
    pub fn column(&self, ticker: &str) -> Option<TimeSeries> {
        let j = self.column_index(ticker)?;
        Some(TimeSeries {
            index: self.dates.clone(),
            values: self.values.iter().map(|row| row[j]).collect(),
        })
    }
}

/// Intersect two dated series, returning aligned copies.
pub fn align_pair(a: &TimeSeries, b: &TimeSeries) -> (TimeSeries, TimeSeries) {
    let mut index = Vec::new();
    let mut va = Vec::new();
    let mut vb = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a.index[i].cmp(&b.index[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                index.push(a.index[i]);
                va.push(a.values[i]);
                vb.push(b.values[j]);
                i += 1;
                j += 1;
            }
        }
    }

    (
        TimeSeries {
            index: index.clone(),
            values: va,
        },
        TimeSeries { index, values: vb },
    )
}

/// Parse the date formats price files commonly use.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

/// Load a long-format price CSV with columns `date,ticker,adj_close`.
pub fn load_prices_csv(path: impl AsRef<Path>) -> Result<PriceTable> {
    let path = path.as_ref();
    info!("Loading prices from: {}", path.display());

    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::SchemaViolation(format!(
            "{} is missing columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = result.map_err(|e| {
            EngineError::SchemaViolation(format!("{} line {}: {}", path.display(), line, e))
        })?;
        let date = parse_date(&row.date).map_err(|e| {
            EngineError::SchemaViolation(format!(
                "{} line {}: bad date '{}': {}",
                path.display(),
                line,
                row.date,
                e
            ))
        })?;
        rows.push(PriceRecord::new(date, row.ticker, row.adj_close));
    }

    let table = PriceTable::new(rows)?;
    info!(
        "Loaded {} rows for {} tickers",
        table.len(),
        table.tickers().len()
    );
    Ok(table)
}
