//! Rolling-window helpers for the window-stitched simulation mode.
//!
//! The window-stitched mode evaluates portfolio returns inside overlapping
//! windows and merges them back onto one date axis. Dates produced by more
//! than one window keep the value from the most recently computed window.

use crate::error::Result;
use crate::types::TimeSeries;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// `(start, end)` row ranges of width `window`, advancing by `step`.
///
/// Only full windows are produced. A zero `window` or `step` yields nothing.
pub fn rolling_windows(len: usize, window: usize, step: usize) -> impl Iterator<Item = (usize, usize)> {
    let valid = window > 0 && step > 0;
    (0..)
        .map(move |i| i * step.max(1))
        .take_while(move |&start| valid && start + window <= len)
        .map(move |start| (start, start + window))
}

/// Merge window segments on date, keeping the last segment's value for duplicate dates.
pub fn stitch_last_wins(segments: &[Vec<(DateTime<Utc>, f64)>]) -> Result<TimeSeries> {
    let mut merged: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for segment in segments {
        for &(date, value) in segment {
            merged.insert(date, value);
        }
    }
    TimeSeries::from_points(merged)
}
