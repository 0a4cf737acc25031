//! Property-based tests using proptest for invariant testing.
//!
//! These tests verify that:
//! 1. Drawdowns are never positive
//! 2. Weight normalization sums to one or fails with InvalidWeights
//! 3. Threshold rebalancing is all-or-nothing
//! 4. Portfolio turnover and cost are non-negative, and zero without rebalances
//! 5. Pair trade ledgers never overlap and respect the exit rules

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use riskengine::analytics::{drawdown_series, max_drawdown, quantile};
use riskengine::data::{PriceRecord, PriceTable};
use riskengine::engine::{PortfolioConfig, PortfolioEngine};
use riskengine::pairs::{rolling_zscore, Pair, PairsConfig, PairsEngine};
use riskengine::portfolio::{turnover, WeightVector};
use riskengine::rebalance::{RebalanceMode, RebalancePolicy};
use riskengine::types::{ExitReason, TimeSeries};
use riskengine::EngineError;

fn day(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap() + Duration::days(i as i64)
}

// ============================================================================
// Strategies
// ============================================================================

/// Daily returns between -50% and +50%.
fn returns_strategy(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.5..0.5f64, 0..max_len)
}

/// Non-empty weight vector over a small ticker alphabet.
fn weights_strategy() -> impl Strategy<Value = WeightVector> {
    prop::collection::btree_map("[A-E]", 0.0..10.0f64, 1..5)
        .prop_map(|m| m.into_iter().collect::<WeightVector>())
}

/// A price path built from bounded daily log moves.
fn price_path(len: usize) -> impl Strategy<Value = Vec<f64>> {
    (
        10.0..500.0f64,
        prop::collection::vec(-0.05..0.05f64, len),
    )
        .prop_map(|(start, moves)| {
            let mut p = start;
            moves
                .into_iter()
                .map(|m| {
                    p *= m.exp();
                    p
                })
                .collect()
        })
}

fn two_asset_table(a: &[f64], b: &[f64]) -> PriceTable {
    let rows = a
        .iter()
        .enumerate()
        .map(|(i, p)| PriceRecord::new(day(i), "AAA", *p))
        .chain(
            b.iter()
                .enumerate()
                .map(|(i, p)| PriceRecord::new(day(i), "BBB", *p)),
        )
        .collect();
    PriceTable::new(rows).unwrap()
}

// ============================================================================
// Analytics
// ============================================================================

proptest! {
    #[test]
    fn prop_max_drawdown_non_positive(returns in returns_strategy(200)) {
        prop_assert!(max_drawdown(&returns) <= 0.0);
        prop_assert!(drawdown_series(&returns).iter().all(|d| *d <= 1e-12));
    }

    #[test]
    fn prop_zero_returns_have_no_drawdown(n in 0usize..300) {
        prop_assert_eq!(max_drawdown(&vec![0.0; n]), 0.0);
    }

    #[test]
    fn prop_quantile_within_range(returns in returns_strategy(100), q in 0.0..1.0f64) {
        prop_assume!(!returns.is_empty());
        let v = quantile(&returns, q).unwrap();
        let lo = returns.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = returns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(v >= lo - 1e-12 && v <= hi + 1e-12);
    }

    #[test]
    fn prop_zscore_is_finite(xs in prop::collection::vec(-10.0..10.0f64, 0..150), window in 2usize..80) {
        let z = rolling_zscore(&xs, window);
        prop_assert_eq!(z.len(), xs.len());
        prop_assert!(z.iter().all(|v| v.is_finite()));
    }
}

// ============================================================================
// Weights and rebalancing
// ============================================================================

proptest! {
    #[test]
    fn prop_normalize_sums_to_one(w in weights_strategy()) {
        match w.normalized() {
            Ok(n) => prop_assert!((n.sum() - 1.0).abs() < 1e-9),
            Err(e) => {
                prop_assert!(w.sum() <= 0.0);
                prop_assert!(matches!(e, EngineError::InvalidWeights(_)));
            }
        }
    }

    #[test]
    fn prop_negative_sum_rejected(w in prop::collection::btree_map("[A-E]", -10.0..0.0f64, 1..5)) {
        let w: WeightVector = w.into_iter().collect();
        prop_assert!(matches!(w.normalized(), Err(EngineError::InvalidWeights(_))));
    }

    #[test]
    fn prop_threshold_never_fires_at_target(w in weights_strategy(), tol in 0.0..0.2f64) {
        let policy = RebalancePolicy::ThresholdDrift { tolerance: tol };
        let d = policy.decide(3, &w, &w);
        prop_assert!(!d.rebalanced);
        prop_assert_eq!(d.weights, w);
    }

    #[test]
    fn prop_threshold_full_reset(
        w in weights_strategy(),
        bump in 0.03..1.0f64,
    ) {
        let target = w.clone();
        let mut current = w.clone();
        let first = target.tickers().next().unwrap().to_string();
        current.insert(first.clone(), target.get(&first) + bump);

        let d = RebalancePolicy::ThresholdDrift { tolerance: 0.02 }.decide(0, &current, &target);
        prop_assert!(d.rebalanced);
        prop_assert_eq!(d.weights, target);
    }

    #[test]
    fn prop_turnover_symmetric_non_negative(a in weights_strategy(), b in weights_strategy()) {
        let t = turnover(&a, &b);
        prop_assert!(t >= 0.0);
        prop_assert!((t - turnover(&b, &a)).abs() < 1e-12);
    }
}

// ============================================================================
// Portfolio engine
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_portfolio_cost_invariants(
        a in price_path(60),
        b in price_path(60),
        wa in 0.1..0.9f64,
        ta in 0.1..0.9f64,
        cost_bps in 0.0..50.0f64,
        periodic in any::<bool>(),
    ) {
        let prices = two_asset_table(&a, &b);
        let init = WeightVector::from([("AAA", wa), ("BBB", 1.0 - wa)]);
        let target = WeightVector::from([("AAA", ta), ("BBB", 1.0 - ta)]);
        let config = PortfolioConfig {
            step: 7,
            cost_bps,
            rebalance_mode: if periodic { RebalanceMode::Periodic } else { RebalanceMode::ThresholdDrift },
            ..Default::default()
        };

        let result = PortfolioEngine::new(config).run(&prices, &init, &target).unwrap();
        prop_assert!(result.turnover >= 0.0);
        prop_assert!(result.cost >= 0.0);
        if result.rebalance_count == 0 {
            prop_assert_eq!(result.turnover, 0.0);
            prop_assert_eq!(result.cost, 0.0);
        }
        prop_assert!((result.cost - cost_bps / 1e4 * result.turnover).abs() < 1e-12);
        prop_assert_eq!(result.returns.len(), 59);
    }
}

// ============================================================================
// Pairs engine
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pairs_ledger_invariants(
        b in price_path(120),
        noise in prop::collection::vec(-0.08..0.08f64, 120),
        open_z in 1.0..2.5f64,
        close_z in 0.0..0.9f64,
        max_days in 3i64..20,
    ) {
        let a: Vec<f64> = b.iter().zip(&noise).map(|(p, n)| p * 1.3 * n.exp()).collect();
        let dates: Vec<_> = (0..b.len()).map(day).collect();
        let pair = Pair::new(
            "AAA",
            "BBB",
            &TimeSeries::new(dates.clone(), a).unwrap(),
            &TimeSeries::new(dates, b).unwrap(),
        );
        let config = PairsConfig {
            open_z,
            close_z,
            max_holding_days: max_days,
            ..Default::default()
        };
        let result = PairsEngine::new(config).unwrap().run(&pair);

        for t in &result.trades {
            prop_assert!(t.exit_date > t.entry_date);
            match t.exit_reason {
                ExitReason::Timeout => prop_assert_eq!(t.holding_days, max_days),
                ExitReason::Reverted => prop_assert!(t.holding_days <= max_days),
            }
        }
        for w in result.trades.windows(2) {
            prop_assert!(w[1].entry_date > w[0].exit_date);
        }
        if let Some((_, entry)) = result.open_position {
            if let Some(last) = result.trades.last() {
                prop_assert!(entry > last.exit_date);
            }
        }
    }
}
