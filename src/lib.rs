//! Riskengine - walk-forward portfolio backtests and pairs trading simulation.
//!
//! # Overview
//!
//! Two engines share one analytics core:
//!
//! - **Portfolio engine**: steps a weight vector through daily returns,
//!   rebalancing by drift threshold or on a fixed cadence, charging costs on
//!   turnover, and reducing the net return series to risk KPIs.
//! - **Pairs engine**: builds a log spread from a static hedge ratio, filters
//!   it with a local-level Kalman filter, standardizes it with a rolling
//!   z-score, and trades a mean-reversion state machine on it.
//!
//! Both return a flat [`KpiReport`]. Too little history never fails a run;
//! the report comes back with every metric at zero.
//!
//! # Quick Start
//!
//! ```no_run
//! use riskengine::{
//!     data::load_prices_csv,
//!     engine::{PortfolioConfig, PortfolioEngine},
//!     portfolio::WeightVector,
//! };
//!
//! let prices = load_prices_csv("data/prices.csv").unwrap();
//! let weights = WeightVector::from([("SPY", 0.6), ("TLT", 0.4)]);
//!
//! let engine = PortfolioEngine::new(PortfolioConfig {
//!     cost_bps: 5.0,
//!     ..Default::default()
//! });
//! let result = engine.run(&prices, &weights, &weights).unwrap();
//!
//! println!("Sharpe: {:.2}", result.kpis.get("sharpe").unwrap_or(0.0));
//! ```
//!
//! # Pairs
//!
//! ```no_run
//! use riskengine::data::load_prices_csv;
//! use riskengine::pairs::{Pair, PairsConfig, PairsEngine};
//!
//! let prices = load_prices_csv("data/prices.csv").unwrap();
//! let a = prices.series("KO").unwrap();
//! let b = prices.series("PEP").unwrap();
//!
//! let engine = PairsEngine::new(PairsConfig::default()).unwrap();
//! let result = engine.run(&Pair::new("KO", "PEP", &a, &b));
//! for trade in &result.trades {
//!     println!("{} {} -> {}: {:.4}", trade.side, trade.entry_date, trade.exit_date, trade.pnl);
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`]: Time series, trade records, KPI reports
//! - [`data`]: Price CSV loading, validation and pivoting
//! - [`returns`]: Simple and log return matrices
//! - [`analytics`]: Risk metrics and terminal reporting
//! - [`portfolio`]: Weight vectors, turnover and transaction costs
//! - [`rebalance`]: Threshold-drift and periodic rebalancing policies
//! - [`walkforward`]: Rolling windows and last-write-wins stitching
//! - [`engine`]: Portfolio backtest engine
//! - [`pairs`]: Spread construction, smoothing, z-scores and the trading state machine
//! - [`scan`]: Parallel pair scanning over ticker universes
//! - [`config`]: TOML configuration file support
//! - [`export`]: JSON and CSV output

pub mod analytics;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod pairs;
pub mod portfolio;
pub mod rebalance;
pub mod returns;
pub mod scan;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use analytics::{KpiFormatter, NormalQuantile, RiskMetrics};
pub use data::{load_prices_csv, PriceRecord, PriceTable, WidePriceMatrix};
pub use engine::{
    run_portfolio_backtest, BacktestResult, PortfolioConfig, PortfolioEngine, SimulationMode,
};
pub use error::{EngineError, Result};
pub use pairs::{backtest_pair, Pair, PairsConfig, PairsEngine, PairsResult};
pub use portfolio::{turnover, CostModel, WeightVector};
pub use rebalance::{RebalanceMode, RebalancePolicy};
pub use scan::{default_universes, scan_all, scan_universe, ScanConfig, ScanRow, Universe};
pub use types::{kpi, ExitReason, KpiReport, ReturnKind, SpreadSide, TimeSeries, TradeRecord};
