//! Rolling z-score standardization.

/// Default rolling window for the z-score.
pub const DEFAULT_ZSCORE_WINDOW: usize = 60;

/// Minimum observations before a z-score is reported: `max(10, window / 5)`,
/// capped at the window itself.
pub fn min_periods(window: usize) -> usize {
    (window / 5).max(10).min(window.max(1))
}

/// `z[t] = (x[t] - mean) / std` over the trailing `window` finite values.
///
/// Indices with too few observations, a zero standard deviation, or a
/// non-finite input get `0.0`.
pub fn rolling_zscore(x: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let min_obs = min_periods(window).max(2);

    (0..x.len())
        .map(|t| {
            if !x[t].is_finite() {
                return 0.0;
            }
            let start = (t + 1).saturating_sub(window);
            let finite: Vec<f64> = x[start..=t].iter().copied().filter(|v| v.is_finite()).collect();
            if finite.len() < min_obs {
                return 0.0;
            }
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let sd = var.sqrt();
            if sd > 0.0 {
                (x[t] - mean) / sd
            } else {
                0.0
            }
        })
        .collect()
}
