//! Configuration file support.
//!
//! A single TOML file drives portfolio backtests, pair backtests and scans so
//! runs can be reproduced.

use crate::data::PriceTable;
use crate::engine::{PortfolioConfig, SimulationMode};
use crate::error::{EngineError, Result};
use crate::pairs::{PairsConfig, SmootherKind};
use crate::portfolio::WeightVector;
use crate::rebalance::RebalanceMode;
use crate::scan::ScanConfig;
use crate::types::ReturnKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete engine configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineFileConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub portfolio: PortfolioSettings,
    #[serde(default)]
    pub costs: CostSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub pairs: PairsSettings,
    #[serde(default)]
    pub scan: ScanSettings,
}

/// Data settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Long-format price CSV with `date,ticker,adj_close`.
    pub path: Option<String>,
    /// Directory for exported results.
    pub output_dir: Option<String>,
}

/// Portfolio backtest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSettings {
    /// Starting weights. Empty means equal weights over every ticker in the data.
    #[serde(default)]
    pub init_weights: BTreeMap<String, f64>,
    /// Target weights. Empty means the starting weights.
    #[serde(default)]
    pub target_weights: BTreeMap<String, f64>,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_step")]
    pub step: usize,
    #[serde(default)]
    pub return_kind: ReturnKind,
    #[serde(default)]
    pub rebalance_mode: RebalanceMode,
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: f64,
    #[serde(default)]
    pub mode: SimulationMode,
    #[serde(default)]
    pub drift_with_returns: bool,
}

fn default_window() -> usize { 60 }
fn default_step() -> usize { 20 }
fn default_drift_tolerance() -> f64 { 0.02 }

impl Default for PortfolioSettings {
    fn default() -> Self {
        Self {
            init_weights: BTreeMap::new(),
            target_weights: BTreeMap::new(),
            window: 60,
            step: 20,
            return_kind: ReturnKind::Simple,
            rebalance_mode: RebalanceMode::ThresholdDrift,
            drift_tolerance: 0.02,
            mode: SimulationMode::DailyStepped,
            drift_with_returns: false,
        }
    }
}

/// Transaction cost settings for the portfolio engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSettings {
    /// Cost per unit of turnover, in basis points.
    #[serde(default)]
    pub cost_bps: f64,
}

/// Risk metric settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Tail probability for VaR/CVaR.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Daily risk-free rate for Sharpe and Sortino.
    #[serde(default)]
    pub risk_free_daily: f64,
}

fn default_alpha() -> f64 { 0.05 }

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            risk_free_daily: 0.0,
        }
    }
}

/// Pairs strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsSettings {
    #[serde(default = "default_open_z")]
    pub open_z: f64,
    #[serde(default = "default_close_z")]
    pub close_z: f64,
    #[serde(default = "default_max_holding_days")]
    pub max_holding_days: i64,
    #[serde(default = "default_pairs_cost_bps")]
    pub cost_bps: f64,
    #[serde(default = "default_zscore_window")]
    pub zscore_window: usize,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_process_var")]
    pub process_var: f64,
    #[serde(default = "default_obs_var")]
    pub obs_var: f64,
    #[serde(default)]
    pub smoother: SmootherKind,
}

fn default_open_z() -> f64 { 2.0 }
fn default_close_z() -> f64 { 0.5 }
fn default_max_holding_days() -> i64 { 15 }
fn default_pairs_cost_bps() -> f64 { 1.0 }
fn default_zscore_window() -> usize { 60 }
fn default_min_observations() -> usize { 30 }
fn default_process_var() -> f64 { 1e-3 }
fn default_obs_var() -> f64 { 1e-2 }

impl Default for PairsSettings {
    fn default() -> Self {
        let p = PairsConfig::default();
        Self {
            open_z: p.open_z,
            close_z: p.close_z,
            max_holding_days: p.max_holding_days,
            cost_bps: p.cost_bps,
            zscore_window: p.zscore_window,
            min_observations: p.min_observations,
            process_var: p.process_var,
            obs_var: p.obs_var,
            smoother: p.smoother,
        }
    }
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Universes by name. Empty means the built-in sector universes.
    #[serde(default)]
    pub universes: BTreeMap<String, Vec<String>>,
    /// Keep at most this many rows per universe; 0 keeps all.
    #[serde(default)]
    pub top: usize,
    /// Drop pairs that never traded.
    #[serde(default)]
    pub require_trades: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            universes: BTreeMap::new(),
            top: 0,
            require_trades: false,
        }
    }
}

impl EngineFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: EngineFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn portfolio_config(&self) -> PortfolioConfig {
        PortfolioConfig {
            window: self.portfolio.window,
            step: self.portfolio.step,
            return_kind: self.portfolio.return_kind,
            rebalance_mode: self.portfolio.rebalance_mode,
            drift_tolerance: self.portfolio.drift_tolerance,
            cost_bps: self.costs.cost_bps,
            mode: self.portfolio.mode,
            drift_with_returns: self.portfolio.drift_with_returns,
            alpha: self.risk.alpha,
            risk_free_daily: self.risk.risk_free_daily,
        }
    }

    pub fn pairs_config(&self) -> PairsConfig {
        PairsConfig {
            open_z: self.pairs.open_z,
            close_z: self.pairs.close_z,
            max_holding_days: self.pairs.max_holding_days,
            cost_bps: self.pairs.cost_bps,
            zscore_window: self.pairs.zscore_window,
            min_observations: self.pairs.min_observations,
            process_var: self.pairs.process_var,
            obs_var: self.pairs.obs_var,
            smoother: self.pairs.smoother,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            pairs: self.pairs_config(),
            universes: self.scan.universes.clone(),
            top: self.scan.top,
            require_trades: self.scan.require_trades,
        }
    }

    /// Starting and target weights, filling gaps from the price data.
    pub fn weights(&self, prices: &PriceTable) -> Result<(WeightVector, WeightVector)> {
        let init: WeightVector = if self.portfolio.init_weights.is_empty() {
            WeightVector::equal(&prices.tickers())
        } else {
            self.portfolio
                .init_weights
                .iter()
                .map(|(t, w)| (t.to_uppercase(), *w))
                .collect()
        };
        if init.is_empty() {
            return Err(EngineError::ConfigError(
                "no weights configured and no tickers in the data".to_string(),
            ));
        }
        let target = if self.portfolio.target_weights.is_empty() {
            init.clone()
        } else {
            self.portfolio
                .target_weights
                .iter()
                .map(|(t, w)| (t.to_uppercase(), *w))
                .collect()
        };
        Ok((init, target))
    }

    /// Example configuration file content.
    pub fn example() -> String {
        r#"# Portfolio and pairs backtest configuration

[data]
path = "data/prices.csv"    # columns: date,ticker,adj_close
# output_dir = "results"

[portfolio]
window = 60
step = 20
return_kind = "simple"      # or "log"
rebalance_mode = "threshold-drift"  # or "periodic"
drift_tolerance = 0.02
mode = "daily-stepped"      # or "window-stitched"
drift_with_returns = false

[portfolio.init_weights]
SPY = 0.6
TLT = 0.4

# [portfolio.target_weights]
# SPY = 0.5
# TLT = 0.5

[costs]
cost_bps = 5.0

[risk]
alpha = 0.05
risk_free_daily = 0.0

[pairs]
open_z = 2.0
close_z = 0.5
max_holding_days = 15
cost_bps = 1.0
zscore_window = 60
min_observations = 30
process_var = 0.001
obs_var = 0.01
smoother = "kalman"         # or "rolling-mean"

[scan]
top = 10
require_trades = false      # true drops pairs that never traded

# [scan.universes]
# XLK = ["AAPL", "MSFT", "NVDA", "AVGO"]
"#
        .to_string()
    }
}
