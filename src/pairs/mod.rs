//! Pairs statistical arbitrage.
//!
//! Two aligned price series become a log spread ([`spread`]), the spread is
//! filtered ([`smoother`]) and standardized ([`signal`]), and a threshold
//! state machine trades it ([`trading`]).

pub mod signal;
pub mod smoother;
pub mod spread;
pub mod trading;

pub use signal::rolling_zscore;
pub use smoother::{
    build_smoother, KalmanSmoother, RollingMeanSmoother, Smoother, SmootherKind,
};
pub use spread::{hedge_ratio, HedgeFit, Pair, SpreadSeries};
pub use trading::{
    backtest_pair, ledger_kpis, PairsConfig, PairsEngine, PairsResult, PositionState,
    SpreadDiagnostics,
};
