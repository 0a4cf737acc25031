//! Integration tests for the portfolio and pairs engines.

use chrono::{DateTime, Duration, TimeZone, Utc};
use riskengine::config::EngineFileConfig;
use riskengine::data::{load_prices_csv, PriceRecord, PriceTable};
use riskengine::engine::{run_portfolio_backtest, PortfolioConfig, PortfolioEngine, SimulationMode};
use riskengine::export::{save_kpis_json, save_scan_csv, save_trades_csv, EMPTY_SCAN_MARKER};
use riskengine::pairs::{backtest_pair, Pair, PairsConfig, PairsEngine, SmootherKind};
use riskengine::portfolio::WeightVector;
use riskengine::rebalance::RebalanceMode;
use riskengine::scan::{scan_universe, Universe};
use riskengine::types::{kpi, KpiReport, ReturnKind, TimeSeries};
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn day(i: usize) -> DateTime<Utc> {
    start() + Duration::days(i as i64)
}

fn table(series: &[(&str, Vec<f64>)]) -> PriceTable {
    let rows = series
        .iter()
        .flat_map(|(t, px)| {
            px.iter()
                .enumerate()
                .map(move |(i, p)| PriceRecord::new(day(i), *t, *p))
        })
        .collect();
    PriceTable::new(rows).unwrap()
}

/// Deterministic trending prices with some wiggle.
fn synthetic_prices(days: usize, initial: f64, drift: f64, phase: f64) -> Vec<f64> {
    let mut price = initial;
    (0..days)
        .map(|i| {
            let noise = ((i as f64 * 0.7 + phase).sin() * 0.01 + (i as f64 * 1.3).cos() * 0.005) * price;
            price = (price * (1.0 + drift) + noise).max(1.0);
            price
        })
        .collect()
}

/// Two legs whose log spread is small noise with one large excursion.
fn excursion_pair(days: usize, spike_at: usize, spike_len: usize) -> Pair {
    let b: Vec<f64> = (0..days).map(|i| 50.0 * (0.001 * i as f64).exp()).collect();
    let a: Vec<f64> = b
        .iter()
        .enumerate()
        .map(|(i, pb)| {
            let noise = 0.01 * (i as f64 * 1.7).sin();
            let spike = if (spike_at..spike_at + spike_len).contains(&i) { 0.3 } else { 0.0 };
            pb * 2.0 * (noise + spike).exp()
        })
        .collect();
    let dates: Vec<_> = (0..days).map(day).collect();
    Pair::new(
        "AAA",
        "BBB",
        &TimeSeries::new(dates.clone(), a).unwrap(),
        &TimeSeries::new(dates, b).unwrap(),
    )
}

fn assert_all_zero(report: &KpiReport) {
    for (name, value) in report.iter() {
        assert_eq!(value, 0.0, "{} should be zero", name);
    }
}

#[test]
fn test_round_trip_scenario() {
    let prices = table(&[
        ("AAA", vec![100.0, 101.0, 102.0]),
        ("BBB", vec![50.0, 49.0, 51.0]),
    ]);
    let weights = WeightVector::from([("AAA", 0.6), ("BBB", 0.4)]);

    let kpis = run_portfolio_backtest(
        &prices,
        &weights,
        &weights,
        2,
        1,
        ReturnKind::Simple,
        RebalanceMode::ThresholdDrift,
        0.02,
        0.0,
    )
    .unwrap();

    for key in [
        kpi::TOTAL_RETURN,
        kpi::ANN_VOL,
        kpi::HIST_VAR,
        kpi::HIST_CVAR,
        kpi::SHARPE,
        kpi::SORTINO,
        kpi::MAX_DRAWDOWN,
        kpi::CALMAR,
    ] {
        assert!(kpis.contains(key), "missing {}", key);
    }
    assert_eq!(kpis.get(kpi::N_DAYS), Some(2.0));

    // Day 1: 0.6 * 0.01 + 0.4 * -0.02; day 2: 0.6 * (102/101 - 1) + 0.4 * (51/49 - 1)
    let r1 = 0.6 * 0.01 + 0.4 * -0.02;
    let r2 = 0.6 * (102.0 / 101.0 - 1.0) + 0.4 * (51.0 / 49.0 - 1.0);
    let expected = (1.0 + r1) * (1.0 + r2) - 1.0;
    assert!((kpis.get(kpi::TOTAL_RETURN).unwrap() - expected).abs() < 1e-12);
    assert_eq!(kpis.get(kpi::TURNOVER), Some(0.0));
    assert_eq!(kpis.get(kpi::COST), Some(0.0));
}

#[test]
fn test_degenerate_single_row() {
    let prices = table(&[("AAA", vec![100.0]), ("BBB", vec![50.0])]);
    let weights = WeightVector::from([("AAA", 0.5), ("BBB", 0.5)]);

    let result = PortfolioEngine::new(PortfolioConfig::default())
        .run(&prices, &weights, &weights)
        .unwrap();

    assert_all_zero(&result.kpis);
    assert!(result.kpis.contains(kpi::N_DAYS));
    assert!(result.returns.is_empty());
}

#[test]
fn test_pairs_excursion_produces_trades() {
    let pair = excursion_pair(160, 90, 8);
    let config = PairsConfig::default();
    let cost = 4.0 * config.cost_bps / 1e4;

    let result = backtest_pair(&pair, config).unwrap();

    assert!(!result.trades.is_empty());
    for t in &result.trades {
        let expected = (t.exit_value - t.entry_value) * t.side.sign() - cost;
        assert!((t.pnl - expected).abs() < 1e-12);
        assert!(t.exit_date > t.entry_date);
        assert_eq!(t.holding_days, (t.exit_date - t.entry_date).num_days());
    }
    assert_eq!(result.kpis.get(kpi::N_TRADES), Some(result.trades.len() as f64));
}

#[test]
fn test_pairs_trades_do_not_overlap() {
    let pair = excursion_pair(250, 100, 10);
    let result = PairsEngine::new(PairsConfig {
        open_z: 1.5,
        ..Default::default()
    })
    .unwrap()
    .run(&pair);

    for w in result.trades.windows(2) {
        assert!(w[1].entry_date >= w[0].exit_date);
    }
}

#[test]
fn test_pairs_fallback_smoother_same_shape() {
    let pair = excursion_pair(160, 90, 8);
    let kalman = PairsEngine::new(PairsConfig::default()).unwrap();
    let fallback = PairsEngine::new(PairsConfig {
        obs_var: 0.0,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(fallback.smoother_name(), "rolling-mean");

    let a = kalman.diagnostics(&pair).unwrap();
    let b = fallback.diagnostics(&pair).unwrap();
    assert_eq!(a.filtered.len(), b.filtered.len());
    assert_eq!(a.zscore.len(), b.zscore.len());

    let explicit = PairsEngine::new(PairsConfig {
        smoother: SmootherKind::RollingMean,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(explicit.run(&pair), fallback.run(&pair));
}

#[test]
fn test_pairs_short_history_zeroed() {
    let pair = excursion_pair(25, 10, 3);
    let result = backtest_pair(&pair, PairsConfig::default()).unwrap();
    assert!(result.trades.is_empty());
    assert_all_zero(&result.kpis);
    assert_eq!(result.kpis.len(), kpi::PAIRS.len());
}

#[test]
fn test_csv_to_portfolio_backtest() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,ticker,adj_close").unwrap();
    let aaa = synthetic_prices(120, 100.0, 0.001, 0.0);
    let bbb = synthetic_prices(120, 40.0, 0.0005, 1.0);
    for i in 0..120 {
        writeln!(file, "{},aaa,{}", day(i).format("%Y-%m-%d"), aaa[i]).unwrap();
        writeln!(file, "{},BBB,{}", day(i).format("%Y-%m-%d"), bbb[i]).unwrap();
    }
    file.flush().unwrap();

    let prices = load_prices_csv(file.path()).unwrap();
    assert_eq!(prices.tickers(), vec!["AAA".to_string(), "BBB".to_string()]);

    let init = WeightVector::from([("AAA", 0.5), ("BBB", 0.5)]);
    let target = WeightVector::from([("AAA", 0.7), ("BBB", 0.3)]);
    let result = PortfolioEngine::new(PortfolioConfig {
        cost_bps: 10.0,
        ..Default::default()
    })
    .run(&prices, &init, &target)
    .unwrap();

    assert_eq!(result.kpis.get(kpi::N_DAYS), Some(119.0));
    assert_eq!(result.rebalance_count, 1);
    assert!((result.turnover - 0.4).abs() < 1e-12);
    assert!((result.cost - 10.0 / 1e4 * 0.4).abs() < 1e-12);
    assert!(result.kpis.get(kpi::MAX_DRAWDOWN).unwrap() <= 0.0);
}

#[test]
fn test_periodic_rebalance_with_drift() {
    let prices = table(&[
        ("AAA", synthetic_prices(100, 100.0, 0.004, 0.0)),
        ("BBB", synthetic_prices(100, 100.0, -0.002, 2.0)),
    ]);
    let weights = WeightVector::from([("AAA", 0.5), ("BBB", 0.5)]);
    let result = PortfolioEngine::new(PortfolioConfig {
        step: 10,
        rebalance_mode: RebalanceMode::Periodic,
        drift_with_returns: true,
        cost_bps: 5.0,
        ..Default::default()
    })
    .run(&prices, &weights, &weights)
    .unwrap();

    // 99 return days: rebalances on steps 10, 20, ..., 90.
    assert_eq!(result.rebalance_count, 9);
    assert!(result.turnover > 0.0);
    assert!(result.cost > 0.0);
}

#[test]
fn test_window_stitched_mode() {
    let prices = table(&[
        ("AAA", synthetic_prices(50, 100.0, 0.001, 0.0)),
        ("BBB", synthetic_prices(50, 60.0, 0.002, 1.5)),
    ]);
    let weights = WeightVector::from([("AAA", 0.5), ("BBB", 0.5)]);

    let daily = PortfolioEngine::new(PortfolioConfig::default())
        .run(&prices, &weights, &weights)
        .unwrap();
    let stitched = PortfolioEngine::new(PortfolioConfig {
        window: 20,
        step: 5,
        mode: SimulationMode::WindowStitched,
        ..Default::default()
    })
    .run(&prices, &weights, &weights)
    .unwrap();

    // Weights never change, so every window reports the same daily returns;
    // windows cover days 0..44 of the 49 return days.
    assert_eq!(stitched.returns.len(), 45);
    for (date, value) in stitched.returns.iter() {
        assert!((daily.returns.get(&date).unwrap() - value).abs() < 1e-15);
    }
    assert_eq!(stitched.cost, 0.0);
}

#[test]
fn test_window_stitched_later_window_overrides_overlap() {
    let prices = table(&[
        ("AAA", synthetic_prices(50, 100.0, 0.001, 0.0)),
        ("BBB", synthetic_prices(50, 60.0, -0.002, 1.5)),
    ]);
    let only_a = WeightVector::from([("AAA", 1.0)]);
    let only_b = WeightVector::from([("BBB", 1.0)]);
    let daily = |w: &WeightVector| {
        PortfolioEngine::new(PortfolioConfig::default())
            .run(&prices, w, w)
            .unwrap()
            .returns
    };
    let (a_returns, b_returns) = (daily(&only_a), daily(&only_b));

    let stitched = PortfolioEngine::new(PortfolioConfig {
        window: 20,
        step: 5,
        rebalance_mode: RebalanceMode::Periodic,
        mode: SimulationMode::WindowStitched,
        ..Default::default()
    })
    .run(&prices, &only_a, &only_b)
    .unwrap();

    // The first window holds AAA; every later window has rebalanced into BBB,
    // so days 5..20 take the later windows' values.
    assert_eq!(stitched.returns.len(), 45);
    for (i, (date, value)) in stitched.returns.iter().enumerate() {
        let expected = if i < 5 { a_returns.get(&date) } else { b_returns.get(&date) };
        assert!((expected.unwrap() - value).abs() < 1e-15, "day {}", i);
    }
    assert_eq!(stitched.rebalance_count, 5);
    assert!((stitched.turnover - 2.0).abs() < 1e-12);
    assert_eq!(stitched.cost, 0.0);
}

#[test]
fn test_window_stitched_too_short() {
    let prices = table(&[("AAA", vec![1.0, 2.0, 3.0]), ("BBB", vec![3.0, 2.0, 1.0])]);
    let weights = WeightVector::from([("AAA", 1.0)]);
    let result = PortfolioEngine::new(PortfolioConfig {
        mode: SimulationMode::WindowStitched,
        ..Default::default()
    })
    .run(&prices, &weights, &weights)
    .unwrap();
    assert_all_zero(&result.kpis);
}

#[test]
fn test_missing_ticker_is_flagged() {
    let prices = table(&[
        ("AAA", synthetic_prices(30, 100.0, 0.001, 0.0)),
        ("BBB", synthetic_prices(30, 50.0, 0.001, 1.0)),
    ]);
    let init = WeightVector::from([("AAA", 0.5), ("BBB", 0.5)]);
    let target = WeightVector::from([("AAA", 0.4), ("BBB", 0.3), ("ZZZ", 0.3)]);
    let result = PortfolioEngine::new(PortfolioConfig::default())
        .run(&prices, &init, &target)
        .unwrap();
    assert_eq!(result.missing_tickers, vec!["ZZZ".to_string()]);
    assert_eq!(result.kpis.get(kpi::N_DAYS), Some(29.0));
}

#[test]
fn test_invalid_weights_fail_fast() {
    let prices = table(&[("AAA", vec![1.0, 2.0])]);
    let zero = WeightVector::from([("AAA", 0.0)]);
    let err = PortfolioEngine::new(PortfolioConfig::default())
        .run(&prices, &zero, &zero)
        .unwrap_err();
    assert!(matches!(err, riskengine::EngineError::InvalidWeights(_)));
}

#[test]
fn test_scan_and_export() {
    let dir = TempDir::new().unwrap();
    let mut rows = Vec::new();
    let pair = excursion_pair(160, 90, 8);
    let (a, b) = pair.prices();
    for (ticker, series) in [("AAA", a), ("BBB", b)] {
        for (date, px) in series.iter() {
            rows.push(PriceRecord::new(date, ticker, px));
        }
    }
    let prices = PriceTable::new(rows).unwrap();

    let ranked = scan_universe(&prices, &Universe::new("T", &["AAA", "BBB"]), &PairsConfig::default()).unwrap();
    assert_eq!(ranked.len(), 2);
    let path = save_scan_csv(dir.path(), "T", &ranked).unwrap();
    assert!(fs::read_to_string(path).unwrap().starts_with("a,b,"));

    let empty = scan_universe(&prices, &Universe::new("NONE", &["XXX", "YYY"]), &PairsConfig::default()).unwrap();
    assert!(empty.is_empty());
    let marker = save_scan_csv(dir.path(), "NONE", &empty).unwrap();
    assert_eq!(fs::read_to_string(marker).unwrap().trim(), EMPTY_SCAN_MARKER);

    let result = backtest_pair(&pair, PairsConfig::default()).unwrap();
    save_trades_csv(dir.path().join("trades.csv"), &result.trades).unwrap();
    save_kpis_json(dir.path().join("kpis.json"), &result.kpis).unwrap();
    let csv_lines = fs::read_to_string(dir.path().join("trades.csv")).unwrap().lines().count();
    assert_eq!(csv_lines, result.trades.len() + 1);
}

#[test]
fn test_config_driven_run() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("prices.csv");
    let mut csv = String::from("date,ticker,adj_close\n");
    let aaa = synthetic_prices(60, 100.0, 0.001, 0.0);
    let bbb = synthetic_prices(60, 80.0, 0.0, 0.5);
    for i in 0..60 {
        csv.push_str(&format!("{},AAA,{}\n", day(i).format("%Y-%m-%d"), aaa[i]));
        csv.push_str(&format!("{},BBB,{}\n", day(i).format("%Y-%m-%d"), bbb[i]));
    }
    fs::write(&csv_path, csv).unwrap();

    let mut config = EngineFileConfig::default();
    config.data.path = Some(csv_path.display().to_string());
    config.portfolio.init_weights.insert("AAA".into(), 3.0);
    config.portfolio.init_weights.insert("BBB".into(), 1.0);
    config.costs.cost_bps = 2.0;
    let config_path = dir.path().join("riskengine.toml");
    config.save(&config_path).unwrap();

    let loaded = EngineFileConfig::load(&config_path).unwrap();
    let prices = load_prices_csv(loaded.data.path.as_ref().unwrap()).unwrap();
    let (init, target) = loaded.weights(&prices).unwrap();
    let result = PortfolioEngine::new(loaded.portfolio_config())
        .run(&prices, &init, &target)
        .unwrap();

    assert_eq!(result.kpis.get(kpi::N_DAYS), Some(59.0));
    assert_eq!(result.rebalance_count, 0);
    assert_eq!(result.cost, 0.0);
}
