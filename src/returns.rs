//! Price-to-return transform.

use crate::data::WidePriceMatrix;
use crate::types::{ReturnKind, TimeSeries};
use chrono::{DateTime, Utc};

/// Dates x tickers matrix of per-asset returns. Always dense.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnMatrix {
    pub dates: Vec<DateTime<Utc>>,
    pub tickers: Vec<String>,
    /// Row-major: `values[date][ticker]`.
    pub values: Vec<Vec<f64>>,
    pub kind: ReturnKind,
}

impl ReturnMatrix {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn column(&self, ticker: &str) -> Option<TimeSeries> {
        let j = self.column_index(ticker)?;
        Some(TimeSeries {
            index: self.dates.clone(),
            values: self.values.iter().map(|row| row[j]).collect(),
        })
    }
}

fn period_return(prev: f64, curr: f64, kind: ReturnKind) -> f64 {
    match kind {
        ReturnKind::Simple => curr / prev - 1.0,
        ReturnKind::Log => curr.ln() - prev.ln(),
    }
}

/// Convert prices to returns.
///
/// Interior gaps (`NaN` cells) are forward-filled from the last known price;
/// rows that are still incomplete after filling (leading gaps) are dropped.
/// The first remaining row has no prior price and is dropped. Any return that
/// is still not finite is replaced with `0.0`.
pub fn compute_returns(prices: &WidePriceMatrix, kind: ReturnKind) -> ReturnMatrix {
    let n_cols = prices.tickers.len();
    let mut last: Vec<Option<f64>> = vec![None; n_cols];
    let mut filled_dates = Vec::with_capacity(prices.len());
    let mut filled_rows: Vec<Vec<f64>> = Vec::with_capacity(prices.len());

    for (date, row) in prices.dates.iter().zip(&prices.values) {
        for (slot, &p) in last.iter_mut().zip(row) {
            if p.is_finite() {
                *slot = Some(p);
            }
        }
        if let Some(complete) = last.iter().copied().collect::<Option<Vec<f64>>>() {
            filled_dates.push(*date);
            filled_rows.push(complete);
        }
    }

    let mut dates = Vec::with_capacity(filled_rows.len().saturating_sub(1));
    let mut values = Vec::with_capacity(filled_rows.len().saturating_sub(1));

    for (i, pair) in filled_rows.windows(2).enumerate() {
        let row: Vec<f64> = pair[0]
            .iter()
            .zip(&pair[1])
            .map(|(&prev, &curr)| {
                let r = period_return(prev, curr, kind);
                if r.is_finite() {
                    r
                } else {
                    0.0
                }
            })
            .collect();
        dates.push(filled_dates[i + 1]);
        values.push(row);
    }

    ReturnMatrix {
        dates,
        tickers: prices.tickers.clone(),
        values,
        kind,
    }
}
