//! Portfolio backtest engine.
//!
//! Steps through every trading day of the return matrix, consults the
//! rebalancing policy, charges transaction costs on rebalance days, and
//! reduces the resulting daily return series to KPIs.

use crate::analytics::{RiskMetrics, DEFAULT_ALPHA};
use crate::data::PriceTable;
use crate::error::{EngineError, Result};
use crate::portfolio::{turnover, CostModel, WeightVector};
use crate::rebalance::{RebalanceMode, RebalancePolicy, DEFAULT_DRIFT_TOLERANCE};
use crate::returns::{compute_returns, ReturnMatrix};
use crate::types::{kpi, KpiReport, ReturnKind, TimeSeries};
use crate::walkforward::{rolling_windows, stitch_last_wins};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How the return series is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    /// One tick per trading day, costs charged on rebalance days.
    #[default]
    DailyStepped,
    /// Legacy overlapping-window evaluation stitched by last write wins. No costs charged.
    WindowStitched,
}

/// Configuration for the portfolio engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Window width in trading days (window-stitched mode only).
    pub window: usize,
    /// Periodic rebalance cadence, and window advance in window-stitched mode.
    pub step: usize,
    pub return_kind: ReturnKind,
    pub rebalance_mode: RebalanceMode,
    pub drift_tolerance: f64,
    pub cost_bps: f64,
    pub mode: SimulationMode,
    /// Let held weights drift with asset returns between rebalances.
    #[serde(default)]
    pub drift_with_returns: bool,
    /// Tail probability for VaR/CVaR.
    pub alpha: f64,
    /// Daily risk-free rate for Sharpe/Sortino.
    pub risk_free_daily: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            window: 60,
            step: 20,
            return_kind: ReturnKind::Simple,
            rebalance_mode: RebalanceMode::ThresholdDrift,
            drift_tolerance: DEFAULT_DRIFT_TOLERANCE,
            cost_bps: 0.0,
            mode: SimulationMode::DailyStepped,
            drift_with_returns: false,
            alpha: DEFAULT_ALPHA,
            risk_free_daily: 0.0,
        }
    }
}

impl PortfolioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 || self.step == 0 {
            return Err(EngineError::InvalidInput(format!(
                "window and step must be positive (window={}, step={})",
                self.window, self.step
            )));
        }
        if !(self.drift_tolerance >= 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "drift tolerance must be non-negative, got {}",
                self.drift_tolerance
            )));
        }
        if !(self.cost_bps >= 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "cost_bps must be non-negative, got {}",
                self.cost_bps
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(EngineError::InvalidInput(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> RebalancePolicy {
        RebalancePolicy::from_mode(self.rebalance_mode, self.drift_tolerance, self.step)
    }
}

/// Output of a portfolio backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub kpis: KpiReport,
    /// Net daily portfolio returns.
    pub returns: TimeSeries,
    /// Cumulative L1 turnover over all rebalance events.
    pub turnover: f64,
    /// Cumulative transaction cost as a return fraction.
    pub cost: f64,
    pub rebalance_count: usize,
    /// Weighted tickers with no price history; they contribute zero return.
    pub missing_tickers: Vec<String>,
}

impl BacktestResult {
    fn zeroed(missing_tickers: Vec<String>) -> Self {
        let mut kpis = RiskMetrics::zeroed_report();
        kpis.insert(kpi::TURNOVER, 0.0);
        kpis.insert(kpi::COST, 0.0);
        Self {
            kpis,
            returns: TimeSeries::default(),
            turnover: 0.0,
            cost: 0.0,
            rebalance_count: 0,
            missing_tickers,
        }
    }
}

/// Walk-forward portfolio simulator.
pub struct PortfolioEngine {
    config: PortfolioConfig,
    metrics: RiskMetrics,
}

impl PortfolioEngine {
    pub fn new(config: PortfolioConfig) -> Self {
        let metrics = RiskMetrics::new(config.alpha).with_risk_free(config.risk_free_daily);
        Self { config, metrics }
    }

    /// Replace the metrics reducer, e.g. to change the quantile routine.
    pub fn with_metrics(mut self, metrics: RiskMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    /// Run the backtest.
    ///
    /// Weights are validated before any data is touched; too little history
    /// yields a zeroed result rather than an error.
    pub fn run(
        &self,
        prices: &PriceTable,
        init_weights: &WeightVector,
        target_weights: &WeightVector,
    ) -> Result<BacktestResult> {
        self.config.validate()?;
        let init = init_weights.normalized()?;
        let target = target_weights.normalized()?;

        let wide = prices.pivot();
        let returns = compute_returns(&wide, self.config.return_kind);

        let missing_tickers: Vec<String> = init
            .tickers()
            .chain(target.tickers())
            .filter(|t| returns.column_index(t).is_none())
            .map(str::to_string)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing_tickers.is_empty() {
            warn!(
                "No prices for weighted tickers {:?}; treating their returns as zero",
                missing_tickers
            );
        }

        if returns.is_empty() {
            warn!(
                "Not enough price rows to compute returns ({} dates); returning zeroed KPIs",
                wide.len()
            );
            return Ok(BacktestResult::zeroed(missing_tickers));
        }

        info!(
            "Running {:?} portfolio backtest over {} tickers, {} return days",
            self.config.mode,
            returns.tickers.len(),
            returns.len()
        );

        let run = match self.config.mode {
            SimulationMode::DailyStepped => self.run_daily(&returns, init, &target)?,
            SimulationMode::WindowStitched => match self.run_stitched(&returns, init, &target)? {
                Some(run) => run,
                None => {
                    warn!(
                        "No full window of {} days in {} return days; returning zeroed KPIs",
                        self.config.window,
                        returns.len()
                    );
                    return Ok(BacktestResult::zeroed(missing_tickers));
                }
            },
        };
        let SimulationRun {
            turnover: turnover_total,
            cost: cost_total,
            rebalance_count,
            series,
        } = run;

        let mut kpis = self.metrics.report(&series.values);
        kpis.insert(kpi::TURNOVER, turnover_total);
        kpis.insert(kpi::COST, cost_total);

        info!(
            "Backtest finished: {} days, {} rebalances, turnover {:.4}, cost {:.6}",
            series.len(),
            rebalance_count,
            turnover_total,
            cost_total
        );

        Ok(BacktestResult {
            kpis,
            returns: series,
            turnover: turnover_total,
            cost: cost_total,
            rebalance_count,
            missing_tickers,
        })
    }

    fn run_daily(
        &self,
        returns: &ReturnMatrix,
        init: WeightVector,
        target: &WeightVector,
    ) -> Result<SimulationRun> {
        let policy = self.config.policy();
        let costs = CostModel::new(self.config.cost_bps);

        let mut current = init;
        let mut turnover_total = 0.0;
        let mut cost_total = 0.0;
        let mut rebalance_count = 0;
        let mut net = Vec::with_capacity(returns.len());

        for (step, (date, row)) in returns.dates.iter().zip(&returns.values).enumerate() {
            let decision = policy.decide(step, &current, target);
            let mut cost_today = 0.0;
            if decision.rebalanced {
                let traded = turnover(&current, &decision.weights);
                cost_today = costs.rebalance_cost(traded);
                turnover_total += traded;
                cost_total += cost_today;
                rebalance_count += 1;
                debug!(
                    "Rebalanced on {}: turnover {:.4}, cost {:.6}",
                    date.format("%Y-%m-%d"),
                    traded,
                    cost_today
                );
            }
            current = decision.weights;

            let gross = weighted_return(&current, returns, row);
            net.push(gross - cost_today);

            if self.config.drift_with_returns {
                current = drift_weights(&current, returns, row, gross);
            }
        }

        let series = TimeSeries::new(returns.dates.clone(), net)?;
        Ok(SimulationRun {
            turnover: turnover_total,
            cost: cost_total,
            rebalance_count,
            series,
        })
    }

    fn run_stitched(
        &self,
        returns: &ReturnMatrix,
        init: WeightVector,
        target: &WeightVector,
    ) -> Result<Option<SimulationRun>> {
        let policy = self.config.policy();

        let mut current = init;
        let mut turnover_total = 0.0;
        let mut rebalance_count = 0;
        let mut segments = Vec::new();

        for (start, end) in rolling_windows(returns.len(), self.config.window, self.config.step) {
            let decision = policy.decide(start, &current, target);
            if decision.rebalanced {
                turnover_total += turnover(&current, &decision.weights);
                rebalance_count += 1;
            }
            current = decision.weights;

            let segment: Vec<_> = (start..end)
                .map(|i| {
                    (
                        returns.dates[i],
                        weighted_return(&current, returns, &returns.values[i]),
                    )
                })
                .collect();
            segments.push(segment);
        }

        if segments.is_empty() {
            return Ok(None);
        }
        debug!("Stitching {} window segments", segments.len());

        let series = stitch_last_wins(&segments)?;
        Ok(Some(SimulationRun {
            turnover: turnover_total,
            cost: 0.0,
            rebalance_count,
            series,
        }))
    }
}

/// Totals and net return series from one simulation mode.
struct SimulationRun {
    turnover: f64,
    cost: f64,
    rebalance_count: usize,
    series: TimeSeries,
}

/// Weighted sum of one day's returns. Tickers without a return column contribute zero.
fn weighted_return(weights: &WeightVector, returns: &ReturnMatrix, row: &[f64]) -> f64 {
    weights
        .iter()
        .filter_map(|(t, w)| returns.column_index(t).map(|j| w * row[j]))
        .sum()
}

fn drift_weights(
    weights: &WeightVector,
    returns: &ReturnMatrix,
    row: &[f64],
    portfolio_return: f64,
) -> WeightVector {
    let growth = 1.0 + portfolio_return;
    if growth <= 0.0 {
        return weights.clone();
    }
    weights
        .iter()
        .map(|(t, w)| {
            let r = returns.column_index(t).map_or(0.0, |j| row[j]);
            (t.to_string(), w * (1.0 + r) / growth)
        })
        .collect()
}

/// Run a portfolio backtest and return its KPIs.
#[allow(clippy::too_many_arguments)]
pub fn run_portfolio_backtest(
    prices: &PriceTable,
    init_weights: &WeightVector,
    target_weights: &WeightVector,
    window: usize,
    step: usize,
    return_kind: ReturnKind,
    rebalance_mode: RebalanceMode,
    drift_tolerance: f64,
    cost_bps: f64,
) -> Result<KpiReport> {
    let config = PortfolioConfig {
        window,
        step,
        return_kind,
        rebalance_mode,
        drift_tolerance,
        cost_bps,
        ..Default::default()
    };
    let result = PortfolioEngine::new(config).run(prices, init_weights, target_weights)?;
    Ok(result.kpis)
}
