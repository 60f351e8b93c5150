//! Standardised scores of a series against its own recent or full history.
//!
//! Every statistic at position `t` is computed from values at or before
//! `t`; nothing here looks ahead.

use common::{Error, Result};

use crate::rolling::{ensure_window, rolling_apply, Expanding, FeatureSeries, RollingWindow, Sample};

/// Default minimum observations for [`zscore`]: `max(window / 2, 2)`,
/// capped at the window itself.
pub fn default_min_periods(window: usize) -> usize {
    (window / 2).max(2).min(window)
}

fn standardise(value: Option<f64>, mean: Option<f64>, std: Option<f64>) -> Option<f64> {
    let std = std.filter(|s| *s > 0.0)?;
    let z = (value? - mean?) / std;
    z.is_finite().then_some(z)
}

/// Rolling z-score `(v - mean) / std` over `window`, defined once
/// `min_periods` present values are in the window (default
/// [`default_min_periods`]). A zero std leaves the point undefined.
pub fn zscore<S: Sample>(values: &[S], window: usize, min_periods: Option<usize>) -> Result<FeatureSeries> {
    ensure_window("z-score window", window)?;
    let min_periods = min_periods.unwrap_or_else(|| default_min_periods(window));
    let means = rolling_apply(values, window, min_periods, RollingWindow::mean)?;
    let stds = rolling_apply(values, window, min_periods, RollingWindow::std)?;
    Ok(values
        .iter()
        .zip(means.into_iter().zip(stds))
        .map(|(v, (m, s))| standardise(v.value(), m, s))
        .collect())
}

/// Z-score against statistics of all history up to and including `t`, or
/// of the trailing `lookback` values when given. Used for retrospective
/// evaluation where a full-sample mean would leak future information.
pub fn expanding_zscore<S: Sample>(values: &[S], lookback: Option<usize>) -> Result<FeatureSeries> {
    match lookback {
        Some(lookback) => {
            ensure_window("z-score lookback", lookback)?;
            let means = rolling_apply(values, lookback, 1, RollingWindow::mean)?;
            let stds = rolling_apply(values, lookback, 1, RollingWindow::std)?;
            Ok(values
                .iter()
                .zip(means.into_iter().zip(stds))
                .map(|(v, (m, s))| standardise(v.value(), m, s))
                .collect())
        }
        None => {
            let mut acc = Expanding::new();
            Ok(values
                .iter()
                .map(|v| {
                    acc.push(*v);
                    standardise(v.value(), acc.mean(), acc.std())
                })
                .collect())
        }
    }
}

/// Discrete signal from a rolling z-score: `1` above `threshold`, `-1`
/// below `-threshold`, otherwise `0`.
pub fn zscore_signal<S: Sample>(values: &[S], window: usize, threshold: f64) -> Result<Vec<i8>> {
    Ok(zscore(values, window, None)?
        .into_iter()
        .map(|z| match z {
            Some(z) if z > threshold => 1,
            Some(z) if z < -threshold => -1,
            _ => 0,
        })
        .collect())
}

/// Return divided by its rolling std (no mean adjustment).
pub fn normalized_return<S: Sample>(returns: &[S], window: usize) -> Result<FeatureSeries> {
    let stds = rolling_apply(returns, window, window, RollingWindow::std)?;
    Ok(returns
        .iter()
        .zip(stds)
        .map(|(r, s)| standardise(r.value(), Some(0.0), s))
        .collect())
}

/// `|z| > threshold`; undefined scores never count as extreme.
pub fn is_extreme_move<S: Sample>(values: &[S], window: usize, threshold: f64) -> Result<Vec<bool>> {
    Ok(zscore(values, window, None)?
        .into_iter()
        .map(|z| z.map_or(false, |z| z.abs() > threshold))
        .collect())
}

/// Percentile (0–100) of the latest value within the trailing `window`,
/// ties sharing their average rank. Needs a full window of present values.
pub fn percentile_rank<S: Sample>(values: &[S], window: usize) -> Result<FeatureSeries> {
    ensure_window("percentile window", window)?;
    if window < 2 {
        return Err(Error::config("percentile window must be at least 2"));
    }
    Ok((0..values.len())
        .map(|t| {
            if t + 1 < window {
                return None;
            }
            let slice: Option<Vec<f64>> = values[t + 1 - window..=t].iter().map(|v| v.value()).collect();
            let slice = slice?;
            let last = *slice.last()?;
            let below = slice.iter().filter(|&&v| v < last).count() as f64;
            let equal = slice.iter().filter(|&&v| v == last).count() as f64;
            let rank = below + (equal + 1.0) / 2.0;
            Some((rank - 1.0) / (window as f64 - 1.0) * 100.0)
        })
        .collect())
}
