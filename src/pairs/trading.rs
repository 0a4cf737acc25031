//! Threshold-driven open/close state machine over a standardized spread.

use super::signal::{rolling_zscore, DEFAULT_ZSCORE_WINDOW};
use super::smoother::{build_smoother, Smoother, SmootherKind, DEFAULT_OBS_VAR, DEFAULT_PROCESS_VAR};
use super::spread::Pair;
use crate::error::{EngineError, Result};
use crate::portfolio::CostModel;
use crate::types::{kpi, ExitReason, KpiReport, SpreadSide, TimeSeries, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Fewest spread observations the engine will trade on.
pub const MIN_SPREAD_OBSERVATIONS: usize = 30;

/// Pairs strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsConfig {
    /// Open when `|z|` exceeds this.
    pub open_z: f64,
    /// Close when `|z|` falls below this.
    pub close_z: f64,
    pub max_holding_days: i64,
    pub cost_bps: f64,
    pub zscore_window: usize,
    pub min_observations: usize,
    pub process_var: f64,
    pub obs_var: f64,
    pub smoother: SmootherKind,
}

impl Default for PairsConfig {
    fn default() -> Self {
        Self {
            open_z: 2.0,
            close_z: 0.5,
            max_holding_days: 15,
            cost_bps: 1.0,
            zscore_window: DEFAULT_ZSCORE_WINDOW,
            min_observations: MIN_SPREAD_OBSERVATIONS,
            process_var: DEFAULT_PROCESS_VAR,
            obs_var: DEFAULT_OBS_VAR,
            smoother: SmootherKind::Kalman,
        }
    }
}

impl PairsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.open_z > 0.0 && self.close_z >= 0.0 && self.close_z < self.open_z) {
            return Err(EngineError::InvalidInput(format!(
                "need 0 <= close_z < open_z, got close_z={} open_z={}",
                self.close_z, self.open_z
            )));
        }
        if self.max_holding_days <= 0 {
            return Err(EngineError::InvalidInput(format!(
                "max_holding_days must be positive, got {}",
                self.max_holding_days
            )));
        }
        if !(self.cost_bps >= 0.0) {
            return Err(EngineError::InvalidInput(format!(
                "cost_bps must be non-negative, got {}",
                self.cost_bps
            )));
        }
        if self.zscore_window < 2 {
            return Err(EngineError::InvalidInput(format!(
                "zscore_window must be at least 2, got {}",
                self.zscore_window
            )));
        }
        Ok(())
    }
}

/// Position held on the spread. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Open {
        side: SpreadSide,
        entry_date: DateTime<Utc>,
        entry_value: f64,
    },
}

/// Ledger and summary of one pair backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsResult {
    pub pair: String,
    pub trades: Vec<TradeRecord>,
    pub kpis: KpiReport,
    /// `None` when the pair had too little overlap to fit.
    pub hedge_ratio: Option<f64>,
    /// Position still open at the end of the data, if any. Not in the ledger.
    pub open_position: Option<(SpreadSide, DateTime<Utc>)>,
}

/// Intermediate series for plotting and inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadDiagnostics {
    pub hedge_ratio: f64,
    pub spread: TimeSeries,
    /// Causal estimate; drives trading.
    pub filtered: TimeSeries,
    /// Full-sample estimate; never used for signals.
    pub smoothed: TimeSeries,
    pub zscore: TimeSeries,
}

/// Summarize a trade ledger.
pub fn ledger_kpis(trades: &[TradeRecord]) -> KpiReport {
    let mut report = KpiReport::zeroed(&kpi::PAIRS);
    if trades.is_empty() {
        return report;
    }
    let n = trades.len() as f64;
    report.insert(kpi::N_TRADES, n);
    report.insert(kpi::TOTAL_PNL, trades.iter().map(|t| t.pnl).sum());
    report.insert(
        kpi::WIN_RATE,
        trades.iter().filter(|t| t.is_winner()).count() as f64 / n,
    );
    report.insert(
        kpi::AVG_DAYS,
        trades.iter().map(|t| t.holding_days as f64).sum::<f64>() / n,
    );
    report
}

/// Pairs trading simulator. The smoother is chosen once, at construction.
pub struct PairsEngine {
    config: PairsConfig,
    smoother: Box<dyn Smoother>,
    costs: CostModel,
}

impl PairsEngine {
    pub fn new(config: PairsConfig) -> Result<Self> {
        config.validate()?;
        let smoother = build_smoother(config.smoother, config.process_var, config.obs_var);
        let costs = CostModel::new(config.cost_bps);
        Ok(Self {
            config,
            smoother,
            costs,
        })
    }

    /// Use a specific smoother instead of the configured one.
    pub fn with_smoother(mut self, smoother: Box<dyn Smoother>) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn config(&self) -> &PairsConfig {
        &self.config
    }

    pub fn smoother_name(&self) -> &str {
        self.smoother.name()
    }

    fn empty_result(pair: &Pair, hedge_ratio: Option<f64>) -> PairsResult {
        PairsResult {
            pair: pair.name(),
            trades: Vec::new(),
            kpis: ledger_kpis(&[]),
            hedge_ratio,
            open_position: None,
        }
    }

    /// Backtest one pair. Short or non-overlapping histories give an empty ledger.
    pub fn run(&self, pair: &Pair) -> PairsResult {
        let spread = match pair.log_spread() {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping {}: {}", pair.name(), e);
                return Self::empty_result(pair, None);
            }
        };
        let hedge = Some(spread.fit.hedge_ratio);

        if spread.spread.len() < self.config.min_observations {
            debug!(
                "Skipping {}: {} spread observations, need {}",
                pair.name(),
                spread.spread.len(),
                self.config.min_observations
            );
            return Self::empty_result(pair, hedge);
        }

        let filtered = self.smoother.filter(&spread.spread.values);
        let z = rolling_zscore(&filtered, self.config.zscore_window);

        let (trades, open) = self.simulate(&spread.spread.index, &filtered, &z);
        info!(
            "{}: {} trades (hedge ratio {:.4}, smoother {})",
            pair.name(),
            trades.len(),
            spread.fit.hedge_ratio,
            self.smoother.name()
        );

        PairsResult {
            pair: pair.name(),
            kpis: ledger_kpis(&trades),
            trades,
            hedge_ratio: hedge,
            open_position: open,
        }
    }

    /// Walk the signal in chronological order and record closed trades.
    ///
    /// `values` are the spread levels traded at; `z` is the standardized signal.
    pub fn simulate(
        &self,
        dates: &[DateTime<Utc>],
        values: &[f64],
        z: &[f64],
    ) -> (Vec<TradeRecord>, Option<(SpreadSide, DateTime<Utc>)>) {
        let open_z = self.config.open_z;
        let close_z = self.config.close_z;
        let round_trip = self.costs.spread_round_trip();

        let mut state = PositionState::Flat;
        let mut trades = Vec::new();

        for ((&date, &value), &zt) in dates.iter().zip(values).zip(z) {
            match state {
                PositionState::Flat => {
                    let side = if zt > open_z {
                        Some(SpreadSide::Short)
                    } else if zt < -open_z {
                        Some(SpreadSide::Long)
                    } else {
                        None
                    };
                    if let Some(side) = side {
                        debug!("Open {} at {} (z={:.2})", side, date.format("%Y-%m-%d"), zt);
                        state = PositionState::Open {
                            side,
                            entry_date: date,
                            entry_value: value,
                        };
                    }
                }
                PositionState::Open {
                    side,
                    entry_date,
                    entry_value,
                } => {
                    let holding_days = (date - entry_date).num_days();
                    let reason = if zt.abs() < close_z {
                        Some(ExitReason::Reverted)
                    } else if holding_days >= self.config.max_holding_days {
                        Some(ExitReason::Timeout)
                    } else {
                        None
                    };
                    if let Some(exit_reason) = reason {
                        let pnl = (value - entry_value) * side.sign() - round_trip;
                        debug!(
                            "Close {} at {} after {}d: pnl {:.5}",
                            side,
                            date.format("%Y-%m-%d"),
                            holding_days,
                            pnl
                        );
                        trades.push(TradeRecord {
                            entry_date,
                            exit_date: date,
                            side,
                            entry_value,
                            exit_value: value,
                            pnl,
                            holding_days,
                            exit_reason,
                        });
                        state = PositionState::Flat;
                    }
                }
            }
        }

        let open = match state {
            PositionState::Open {
                side, entry_date, ..
            } => Some((side, entry_date)),
            PositionState::Flat => None,
        };
        (trades, open)
    }

    /// Spread, filtered and smoothed estimates, and z-scores for a pair.
    pub fn diagnostics(&self, pair: &Pair) -> Result<SpreadDiagnostics> {
        let spread = pair.log_spread()?;
        let filtered = self.smoother.filter(&spread.spread.values);
        let smoothed = self.smoother.smooth(&spread.spread.values);
        let z = rolling_zscore(&filtered, self.config.zscore_window);

        Ok(SpreadDiagnostics {
            hedge_ratio: spread.fit.hedge_ratio,
            filtered: spread.spread.with_values(filtered)?,
            smoothed: spread.spread.with_values(smoothed)?,
            zscore: spread.spread.with_values(z)?,
            spread: spread.spread,
        })
    }
}

/// Backtest one pair with the given parameters.
pub fn backtest_pair(pair: &Pair, config: PairsConfig) -> Result<PairsResult> {
    Ok(PairsEngine::new(config)?.run(pair))
}
