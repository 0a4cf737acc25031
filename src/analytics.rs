//! Risk and performance analytics over daily return series.
//!
//! All ratios annualize with 252 trading days per year. Loss measures (VaR,
//! CVaR) are reported as positive magnitudes; drawdown is reported as a
//! non-positive fraction.

use crate::error::{EngineError, Result};
use crate::scan::ScanRow;
use crate::types::{kpi, KpiReport, TradeRecord};
use colored::Colorize;
use statrs::distribution::{ContinuousCDF, Normal};
use tabled::{builder::Builder, settings::Style};
use tracing::warn;

/// Trading days per year used for every annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Default tail probability for VaR/CVaR.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Inverse CDF of the standard normal distribution.
///
/// Parametric VaR is only reported when an implementation is available.
pub trait NormalQuantile: Send + Sync {
    fn name(&self) -> &str;

    /// `z` such that `P(Z <= z) = p`, or `None` when `p` is outside `(0, 1)`.
    fn inverse_cdf(&self, p: f64) -> Option<f64>;
}

/// Standard normal quantile backed by `statrs`.
pub struct StatrsNormal {
    dist: Normal,
}

impl StatrsNormal {
    pub fn new() -> Result<Self> {
        let dist =
            Normal::new(0.0, 1.0).map_err(|e| EngineError::MissingEstimator(e.to_string()))?;
        Ok(Self { dist })
    }
}

impl NormalQuantile for StatrsNormal {
    fn name(&self) -> &str {
        "statrs"
    }

    fn inverse_cdf(&self, p: f64) -> Option<f64> {
        if p > 0.0 && p < 1.0 {
            Some(self.dist.inverse_cdf(p))
        } else {
            None
        }
    }
}

/// Placeholder used when no quantile routine is available.
pub struct NoNormalQuantile;

impl NormalQuantile for NoNormalQuantile {
    fn name(&self) -> &str {
        "none"
    }

    fn inverse_cdf(&self, _p: f64) -> Option<f64> {
        None
    }
}

/// The best available quantile routine.
pub fn default_quantile() -> Box<dyn NormalQuantile> {
    match StatrsNormal::new() {
        Ok(q) => Box::new(q),
        Err(e) => {
            warn!("Parametric VaR disabled: {}", e);
            Box::new(NoNormalQuantile)
        }
    }
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n - 1 denominator). `None` for fewer than two values.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

/// Empirical quantile with linear interpolation between order statistics.
pub fn quantile(xs: &[f64], q: f64) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Compounded return over the whole series.
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Geometric annualized return.
pub fn annualized_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth = 1.0 + total_return(returns);
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS / returns.len() as f64) - 1.0
}

pub fn annualized_volatility(returns: &[f64]) -> f64 {
    sample_std(returns).map_or(0.0, |s| s * TRADING_DAYS.sqrt())
}

/// Historical VaR: the negated `alpha` quantile.
pub fn var_historical(returns: &[f64], alpha: f64) -> f64 {
    quantile(returns, alpha).map_or(0.0, |q| -q)
}

/// Historical CVaR: negated mean of the returns at or below the `alpha` quantile.
pub fn cvar_historical(returns: &[f64], alpha: f64) -> f64 {
    let Some(q) = quantile(returns, alpha) else {
        return 0.0;
    };
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= q).collect();
    if tail.is_empty() {
        return 0.0;
    }
    -mean(&tail)
}

/// Normal VaR `-(mu + z_alpha * sigma)`, floored at zero.
///
/// `None` when the sample has no dispersion or no quantile routine is available.
pub fn var_parametric(returns: &[f64], alpha: f64, normal: &dyn NormalQuantile) -> Option<f64> {
    let sigma = sample_std(returns)?;
    if sigma <= 0.0 {
        return None;
    }
    let z = normal.inverse_cdf(alpha)?;
    Some((-(mean(returns) + z * sigma)).max(0.0))
}

/// Annualized Sharpe ratio over a daily risk-free rate. Zero when volatility is zero.
pub fn sharpe_ratio(returns: &[f64], risk_free_daily: f64) -> f64 {
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_daily).collect();
    match sample_std(&excess) {
        Some(sd) if sd > 0.0 => mean(&excess) / sd * TRADING_DAYS.sqrt(),
        _ => 0.0,
    }
}

/// Annualized Sortino ratio using the dispersion of negative excess returns only.
///
/// Zero when fewer than two negative excess returns exist.
pub fn sortino_ratio(returns: &[f64], risk_free_daily: f64) -> f64 {
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_daily).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|e| *e < 0.0).collect();
    match sample_std(&downside) {
        Some(sd) if sd > 0.0 => mean(&excess) / sd * TRADING_DAYS.sqrt(),
        _ => 0.0,
    }
}

/// Drawdown from the running peak of cumulative growth at every step.
pub fn drawdown_series(returns: &[f64]) -> Vec<f64> {
    let mut equity = 1.0;
    let mut peak = f64::MIN;
    returns
        .iter()
        .map(|r| {
            equity *= 1.0 + r;
            peak = peak.max(equity);
            equity / peak - 1.0
        })
        .collect()
}

/// Worst drawdown, always `<= 0`.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    drawdown_series(returns)
        .into_iter()
        .fold(0.0_f64, f64::min)
}

/// Annualized return over the magnitude of the worst drawdown. Zero without a drawdown.
pub fn calmar_ratio(returns: &[f64]) -> f64 {
    let mdd = max_drawdown(returns);
    if mdd < 0.0 {
        annualized_return(returns) / mdd.abs()
    } else {
        0.0
    }
}

/// Reduces a return series to a [`KpiReport`].
pub struct RiskMetrics {
    alpha: f64,
    risk_free_daily: f64,
    normal: Box<dyn NormalQuantile>,
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl RiskMetrics {
    /// Metrics at tail probability `alpha`, with the best available quantile routine.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            risk_free_daily: 0.0,
            normal: default_quantile(),
        }
    }

    pub fn with_risk_free(mut self, risk_free_daily: f64) -> Self {
        self.risk_free_daily = risk_free_daily;
        self
    }

    pub fn with_quantile(mut self, normal: Box<dyn NormalQuantile>) -> Self {
        self.normal = normal;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Report with every core key set to zero.
    pub fn zeroed_report() -> KpiReport {
        KpiReport::zeroed(&kpi::CORE)
    }

    pub fn report(&self, returns: &[f64]) -> KpiReport {
        if returns.is_empty() {
            return Self::zeroed_report();
        }

        let mut report = KpiReport::new();
        report.insert(kpi::TOTAL_RETURN, total_return(returns));
        report.insert(kpi::ANN_VOL, annualized_volatility(returns));
        report.insert(kpi::HIST_VAR, var_historical(returns, self.alpha));
        report.insert(kpi::HIST_CVAR, cvar_historical(returns, self.alpha));
        report.insert(kpi::SHARPE, sharpe_ratio(returns, self.risk_free_daily));
        report.insert(kpi::SORTINO, sortino_ratio(returns, self.risk_free_daily));
        report.insert(kpi::MAX_DRAWDOWN, max_drawdown(returns));
        report.insert(kpi::CALMAR, calmar_ratio(returns));
        report.insert(kpi::N_DAYS, returns.len() as f64);

        if let Some(v) = var_parametric(returns, self.alpha, self.normal.as_ref()) {
            report.insert(kpi::NORM_VAR, v);
        }
        report
    }
}

/// Terminal output for reports.
pub struct KpiFormatter;

impl KpiFormatter {
    /// Print a KPI report with a heading.
    pub fn print_report(title: &str, report: &KpiReport) {
        println!();
        println!("{}", "═".repeat(48).blue());
        println!("{}", format!(" {} ", title).bold().blue());
        println!("{}", "═".repeat(48).blue());

        for (name, value) in report.iter() {
            let formatted = if name == kpi::N_DAYS || name == kpi::N_TRADES {
                format!("{:>14}", value as i64)
            } else {
                format!("{:>14.6}", value)
            };
            let formatted = if value < 0.0 {
                formatted.red().to_string()
            } else {
                formatted
            };
            println!("  {:<16} {}", name, formatted);
        }
        println!("{}", "═".repeat(48).blue());
    }

    /// Print the most recent `limit` trades of a ledger.
    pub fn print_trades(trades: &[TradeRecord], limit: usize) {
        if trades.is_empty() {
            println!("No trades.");
            return;
        }

        let mut builder = Builder::new();
        builder.push_record(["Entry", "Exit", "Side", "Entry Val", "Exit Val", "PnL", "Days"]);

        let skip = trades.len().saturating_sub(limit);
        for t in trades.iter().skip(skip) {
            builder.push_record([
                t.entry_date.format("%Y-%m-%d").to_string(),
                t.exit_date.format("%Y-%m-%d").to_string(),
                t.side.to_string(),
                format!("{:.5}", t.entry_value),
                format!("{:.5}", t.exit_value),
                format!("{:.5}", t.pnl),
                t.holding_days.to_string(),
            ]);
        }

        println!("{}", builder.build().with(Style::rounded()));
    }

    /// Print ranked scan results.
    pub fn print_scan_table(universe: &str, rows: &[ScanRow]) {
        println!("{}", format!("Universe {}", universe).bold().underline());
        if rows.is_empty() {
            println!("  no candidates");
            return;
        }

        let mut builder = Builder::new();
        builder.push_record(["A", "B", "Trades", "Win Rate", "Total PnL", "Avg Days"]);
        for row in rows {
            builder.push_record([
                row.a.clone(),
                row.b.clone(),
                row.n_trades.to_string(),
                format!("{:.1}%", row.win_rate * 100.0),
                format!("{:.5}", row.total_pnl),
                format!("{:.1}", row.avg_days),
            ]);
        }
        println!("{}", builder.build().with(Style::rounded()));
    }
}
