//! Pair scanning across ticker universes.
//!
//! Every ordered pair `(A, B)` with `A != B` in a universe is backtested with
//! the same [`PairsConfig`], in parallel, and ranked by win rate then total
//! PnL.

use crate::data::PriceTable;
use crate::pairs::{Pair, PairsConfig, PairsEngine};
use crate::error::{EngineError, Result};
use crate::types::kpi;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A named set of tickers to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    pub name: String,
    pub tickers: Vec<String>,
}

impl Universe {
    pub fn new(name: impl Into<String>, tickers: &[&str]) -> Self {
        Self {
            name: name.into(),
            tickers: tickers.iter().map(|t| t.to_uppercase()).collect(),
        }
    }

    /// Ordered pairs of distinct tickers, in list order.
    pub fn permutations(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for a in &self.tickers {
            for b in &self.tickers {
                if a != b {
                    out.push((a.clone(), b.clone()));
                }
            }
        }
        out
    }
}

/// Sector ETF universes: large holdings of each fund, without the fund itself.
pub fn default_universes() -> Vec<Universe> {
    vec![
        Universe::new("XLY", &["AMZN", "TSLA", "MCD", "HD", "LOW", "NKE", "SBUX", "TJX", "TGT", "BKNG"]),
        Universe::new("XLP", &["PG", "PEP", "KO", "COST", "WMT", "PM", "MO", "CL", "ADM"]),
        Universe::new("XLF", &["JPM", "BAC", "WFC", "SCHW", "GS", "MS", "SPGI", "BLK", "CB"]),
        Universe::new("XLV", &["UNH", "JNJ", "LLY", "PFE", "ABBV", "MRK", "TMO", "ABT", "BMY", "DHR"]),
        Universe::new("XLI", &["RTX", "HON", "UNP", "UPS", "LMT", "CAT", "DE", "GE", "NOC", "BA"]),
        Universe::new("XLB", &["LIN", "APD", "SHW", "CTVA", "FCX", "ECL", "NUE", "NEM", "DOW", "ALB"]),
        Universe::new(
            "XLK",
            &[
                "AAPL", "MSFT", "V", "NVDA", "MA", "AVGO", "CSCO", "ACN", "CRM", "ADBE", "QCOM", "IBM", "AMD",
                "AMAT", "INTC",
            ],
        ),
        Universe::new("QQQ", &["AAPL", "AMZN", "MSFT", "GOOG", "META", "NVDA", "TSLA", "PYPL", "ADBE", "NFLX"]),
        Universe::new("XLC", &["META", "GOOGL", "NFLX", "CHTR", "CMCSA", "TMUS", "DIS", "T", "VZ"]),
        Universe::new(
            "SMH",
            &["TSM", "NVDA", "ASML", "AVGO", "TXN", "ADI", "KLAC", "LRCX", "QCOM", "INTC", "AMAT", "MU", "AMD"],
        ),
    ]
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub pairs: PairsConfig,
    /// Universes by name. Empty means [`default_universes`].
    pub universes: BTreeMap<String, Vec<String>>,
    /// Keep at most this many rows per universe; 0 keeps all.
    pub top: usize,
    /// Drop pairs that never traded. Off by default: every evaluated pair is kept.
    pub require_trades: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pairs: PairsConfig::default(),
            universes: BTreeMap::new(),
            top: 0,
            require_trades: false,
        }
    }
}

impl ScanConfig {
    pub fn universes(&self) -> Vec<Universe> {
        if self.universes.is_empty() {
            return default_universes();
        }
        self.universes
            .iter()
            .map(|(name, tickers)| Universe {
                name: name.clone(),
                tickers: tickers.iter().map(|t| t.to_uppercase()).collect(),
            })
            .collect()
    }

    /// Keep only the named universes (case-insensitive) so nothing else is
    /// backtested. An empty list keeps everything; names matching nothing
    /// are an error.
    pub fn restrict_to(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        let kept: BTreeMap<String, Vec<String>> = self
            .universes()
            .into_iter()
            .filter(|u| names.iter().any(|n| n.eq_ignore_ascii_case(&u.name)))
            .map(|u| (u.name, u.tickers))
            .collect();
        if kept.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "no universe named {}",
                names.join(", ")
            )));
        }
        self.universes = kept;
        Ok(self)
    }
}

/// One ranked pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub a: String,
    pub b: String,
    pub n_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_days: f64,
    pub hedge_ratio: Option<f64>,
}

/// Results for one universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseScan {
    pub universe: String,
    pub rows: Vec<ScanRow>,
    /// Universe tickers absent from the price table.
    pub missing_tickers: Vec<String>,
}

/// Descending by win rate, then total PnL; ties by ticker names.
fn rank(a: &ScanRow, b: &ScanRow) -> Ordering {
    b.win_rate
        .total_cmp(&a.win_rate)
        .then_with(|| b.total_pnl.total_cmp(&a.total_pnl))
        .then_with(|| a.a.cmp(&b.a))
        .then_with(|| a.b.cmp(&b.b))
}

/// Backtest every ordered pair of the universe present in `prices`.
///
/// Pairs with fewer than two overlapping dates are skipped. Rows with no
/// trades are kept; callers filter as needed.
pub fn scan_universe(prices: &PriceTable, universe: &Universe, config: &PairsConfig) -> Result<Vec<ScanRow>> {
    let engine = PairsEngine::new(config.clone())?;

    let present: Vec<&String> = universe.tickers.iter().filter(|t| prices.contains(t)).collect();
    let series: BTreeMap<&str, _> = present
        .iter()
        .filter_map(|t| prices.series(t).map(|s| (t.as_str(), s)))
        .collect();

    let candidates: Vec<(&str, &str)> = universe
        .permutations()
        .iter()
        .filter_map(|(a, b)| {
            let (ka, _) = series.get_key_value(a.as_str())?;
            let (kb, _) = series.get_key_value(b.as_str())?;
            Some((*ka, *kb))
        })
        .collect();

    info!(
        "Scanning {}: {} tickers present, {} candidate pairs",
        universe.name,
        series.len(),
        candidates.len()
    );

    let mut rows: Vec<ScanRow> = candidates
        .par_iter()
        .filter_map(|&(a, b)| {
            let pair = Pair::new(a, b, &series[a], &series[b]);
            if pair.len() < 2 {
                return None;
            }
            let result = engine.run(&pair);
            Some(ScanRow {
                a: a.to_string(),
                b: b.to_string(),
                n_trades: result.trades.len(),
                win_rate: result.kpis.get(kpi::WIN_RATE).unwrap_or(0.0),
                total_pnl: result.kpis.get(kpi::TOTAL_PNL).unwrap_or(0.0),
                avg_days: result.kpis.get(kpi::AVG_DAYS).unwrap_or(0.0),
                hedge_ratio: result.hedge_ratio,
            })
        })
        .collect();

    rows.sort_by(rank);
    Ok(rows)
}

/// Scan several universes with the scanner's filtering and truncation rules.
pub fn scan_all(prices: &PriceTable, config: &ScanConfig) -> Result<Vec<UniverseScan>> {
    let mut out = Vec::new();
    for universe in config.universes() {
        let missing_tickers: Vec<String> = universe
            .tickers
            .iter()
            .filter(|t| !prices.contains(t))
            .cloned()
            .collect();
        if !missing_tickers.is_empty() {
            warn!(
                "{}: no prices for {}",
                universe.name,
                missing_tickers.join(", ")
            );
        }

        let mut rows = scan_universe(prices, &universe, &config.pairs)?;
        if config.require_trades {
            rows.retain(|r| r.n_trades > 0);
        }
        if config.top > 0 {
            rows.truncate(config.top);
        }
        info!("{}: {} ranked pairs", universe.name, rows.len());

        out.push(UniverseScan {
            universe: universe.name,
            rows,
            missing_tickers,
        });
    }
    Ok(out)
}
