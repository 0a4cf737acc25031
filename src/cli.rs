//! Command-line interface for the portfolio and pairs engines.

use riskengine::analytics::KpiFormatter;
use riskengine::config::EngineFileConfig;
use riskengine::data::load_prices_csv;
use riskengine::engine::{PortfolioConfig, PortfolioEngine, SimulationMode};
use riskengine::error::{EngineError, Result};
use riskengine::export::{save_kpis_json, save_returns_csv, save_scan_csv, save_trades_csv};
use riskengine::pairs::{Pair, PairsConfig, PairsEngine, PairsResult, SmootherKind};
use riskengine::portfolio::WeightVector;
use riskengine::rebalance::RebalanceMode;
use riskengine::scan::{scan_all, ScanConfig, UniverseScan};
use riskengine::types::ReturnKind;
use riskengine::BacktestResult;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Walk-forward portfolio backtests and pairs trading simulation.
#[derive(Parser)]
#[command(name = "riskengine")]
#[command(version)]
#[command(about = "Portfolio risk backtests and pairs trading simulation")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a portfolio backtest with equal weights over the given tickers
    Run {
        /// Long-format price CSV (date,ticker,adj_close)
        #[arg(short, long)]
        data: PathBuf,

        /// Tickers to hold; all tickers in the data if omitted
        #[arg(short, long, value_delimiter = ',')]
        tickers: Vec<String>,

        /// Window width in trading days
        #[arg(short, long, default_value = "60")]
        window: usize,

        /// Window advance and periodic rebalance cadence
        #[arg(short, long, default_value = "20")]
        step: usize,

        /// Return calculation
        #[arg(long, value_enum, default_value = "simple")]
        returns: ReturnArg,

        /// Rebalancing rule
        #[arg(long, value_enum, default_value = "threshold-drift")]
        rebalance: RebalanceArg,

        /// Drift tolerance for threshold rebalancing
        #[arg(long, default_value = "0.02")]
        tolerance: f64,

        /// Transaction cost in basis points per unit of turnover
        #[arg(long, default_value = "0.0")]
        cost_bps: f64,

        /// Use the legacy window-stitched evaluation
        #[arg(long)]
        stitched: bool,

        /// Directory to write kpis.json and returns.csv
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Backtest a single pair
    Pairs {
        /// Long-format price CSV (date,ticker,adj_close)
        #[arg(short, long)]
        data: PathBuf,

        /// First leg
        #[arg(short)]
        a: String,

        /// Second leg (hedge)
        #[arg(short)]
        b: String,

        /// Open threshold on |z|
        #[arg(long, default_value = "2.0")]
        open_z: f64,

        /// Close threshold on |z|
        #[arg(long, default_value = "0.5")]
        close_z: f64,

        /// Maximum holding period in days
        #[arg(long, default_value = "15")]
        max_days: i64,

        /// Cost per leg per side in basis points
        #[arg(long, default_value = "1.0")]
        cost_bps: f64,

        /// Use the rolling-mean smoother instead of the Kalman filter
        #[arg(long)]
        rolling_mean: bool,

        /// Directory to write kpis.json and trades.csv
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Scan ticker universes for tradeable pairs
    Scan {
        /// Long-format price CSV (date,ticker,adj_close)
        #[arg(short, long)]
        data: PathBuf,

        /// Only scan these universes (by name)
        #[arg(short, long, value_delimiter = ',')]
        universes: Vec<String>,

        /// Keep at most this many pairs per universe (0 keeps all)
        #[arg(long, default_value = "10")]
        top: usize,

        /// Directory to write one CSV per universe
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "riskengine.toml")]
        output: PathBuf,
    },

    /// Run a portfolio backtest from a configuration file
    RunConfig {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Also scan the configured universes
        #[arg(long)]
        scan: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ReturnArg {
    Simple,
    Log,
}

impl From<ReturnArg> for ReturnKind {
    fn from(arg: ReturnArg) -> Self {
        match arg {
            ReturnArg::Simple => ReturnKind::Simple,
            ReturnArg::Log => ReturnKind::Log,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RebalanceArg {
    ThresholdDrift,
    Periodic,
}

impl From<RebalanceArg> for RebalanceMode {
    fn from(arg: RebalanceArg) -> Self {
        match arg {
            RebalanceArg::ThresholdDrift => RebalanceMode::ThresholdDrift,
            RebalanceArg::Periodic => RebalanceMode::Periodic,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("tracing subscriber already installed");
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Run {
            data,
            tickers,
            window,
            step,
            returns,
            rebalance,
            tolerance,
            cost_bps,
            stitched,
            save,
        } => {
            let config = PortfolioConfig {
                window: *window,
                step: *step,
                return_kind: (*returns).into(),
                rebalance_mode: (*rebalance).into(),
                drift_tolerance: *tolerance,
                cost_bps: *cost_bps,
                mode: if *stitched {
                    SimulationMode::WindowStitched
                } else {
                    SimulationMode::DailyStepped
                },
                ..Default::default()
            };
            run_portfolio(data, tickers, config, save.as_deref(), cli.output)
        }
        Commands::Pairs {
            data,
            a,
            b,
            open_z,
            close_z,
            max_days,
            cost_bps,
            rolling_mean,
            save,
        } => {
            let config = PairsConfig {
                open_z: *open_z,
                close_z: *close_z,
                max_holding_days: *max_days,
                cost_bps: *cost_bps,
                smoother: if *rolling_mean {
                    SmootherKind::RollingMean
                } else {
                    SmootherKind::Kalman
                },
                ..Default::default()
            };
            run_pair(data, a, b, config, save.as_deref(), cli.output)
        }
        Commands::Scan {
            data,
            universes,
            top,
            save,
        } => {
            let config = ScanConfig {
                top: *top,
                ..Default::default()
            }
            .restrict_to(universes)?;
            run_scan(data, &config, save.as_deref(), cli.output)
        }
        Commands::Init { output } => init_config(output),
        Commands::RunConfig { config, scan } => run_from_config(config, *scan, cli.output),
    }
}

fn run_portfolio(
    data: &Path,
    tickers: &[String],
    config: PortfolioConfig,
    save: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let prices = load_prices_csv(data)?;
    let tickers: Vec<String> = if tickers.is_empty() {
        prices.tickers()
    } else {
        tickers.iter().map(|t| t.to_uppercase()).collect()
    };
    let weights = WeightVector::equal(&tickers);

    let result = PortfolioEngine::new(config).run(&prices, &weights, &weights)?;
    report_portfolio(&result, save, output)
}

fn report_portfolio(result: &BacktestResult, save: Option<&Path>, output: OutputFormat) -> Result<()> {
    if let Some(dir) = save {
        save_kpis_json(dir.join("kpis.json"), &result.kpis)?;
        save_returns_csv(dir.join("returns.csv"), &result.returns)?;
        info!("Results saved to {}", dir.display());
    }

    match output {
        OutputFormat::Text => {
            KpiFormatter::print_report("PORTFOLIO BACKTEST", &result.kpis);
            println!(
                "  rebalances: {}   missing: {}",
                result.rebalance_count,
                if result.missing_tickers.is_empty() {
                    "-".to_string()
                } else {
                    result.missing_tickers.join(", ")
                }
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.kpis)?),
    }
    Ok(())
}

fn run_pair(
    data: &Path,
    a: &str,
    b: &str,
    config: PairsConfig,
    save: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let prices = load_prices_csv(data)?;
    let (a, b) = (a.to_uppercase(), b.to_uppercase());
    let px_a = prices
        .series(&a)
        .ok_or_else(|| EngineError::InvalidInput(format!("no prices for {}", a)))?;
    let px_b = prices
        .series(&b)
        .ok_or_else(|| EngineError::InvalidInput(format!("no prices for {}", b)))?;

    let result = PairsEngine::new(config)?.run(&Pair::new(a, b, &px_a, &px_b));
    report_pair(&result, save, output)
}

fn report_pair(result: &PairsResult, save: Option<&Path>, output: OutputFormat) -> Result<()> {
    if let Some(dir) = save {
        save_kpis_json(dir.join("kpis.json"), &result.kpis)?;
        save_trades_csv(dir.join("trades.csv"), &result.trades)?;
        info!("Results saved to {}", dir.display());
    }

    match output {
        OutputFormat::Text => {
            KpiFormatter::print_report(&format!("PAIR {}", result.pair), &result.kpis);
            if let Some(beta) = result.hedge_ratio {
                println!("  hedge ratio: {:.4}", beta);
            }
            KpiFormatter::print_trades(&result.trades, 20);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

fn run_scan(data: &Path, config: &ScanConfig, save: Option<&Path>, output: OutputFormat) -> Result<()> {
    let prices = load_prices_csv(data)?;
    let scans = scan_all(&prices, config)?;
    report_scans(&scans, save, output)
}

fn report_scans(scans: &[UniverseScan], save: Option<&Path>, output: OutputFormat) -> Result<()> {
    if let Some(dir) = save {
        for scan in scans {
            save_scan_csv(dir, &scan.universe, &scan.rows)?;
        }
    }

    match output {
        OutputFormat::Text => {
            for scan in scans {
                KpiFormatter::print_scan_table(&scan.universe, &scan.rows);
                println!();
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(scans)?),
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    if output.exists() {
        return Err(EngineError::ConfigError(format!(
            "{} already exists",
            output.display()
        )));
    }
    fs::write(output, EngineFileConfig::example())?;
    println!("Created example configuration: {}", output.display());
    Ok(())
}

fn run_from_config(config_path: &Path, scan: bool, output: OutputFormat) -> Result<()> {
    let file_config = EngineFileConfig::load(config_path)?;

    let data_path = file_config.data.path.as_ref().ok_or_else(|| {
        EngineError::ConfigError("No data path specified in config".to_string())
    })?;

    let prices = load_prices_csv(data_path)?;
    let (init, target) = file_config.weights(&prices)?;
    let result = PortfolioEngine::new(file_config.portfolio_config()).run(&prices, &init, &target)?;
    let save = file_config.data.output_dir.as_ref().map(PathBuf::from);

    if output == OutputFormat::Json && scan {
        let scans = scan_all(&prices, &file_config.scan_config())?;
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "portfolio": result.kpis, "scan": scans }))?
        );
        return Ok(());
    }

    report_portfolio(&result, save.as_deref(), output)?;
    if scan {
        let scans = scan_all(&prices, &file_config.scan_config())?;
        report_scans(&scans, save.as_deref(), output)?;
    }
    Ok(())
}
