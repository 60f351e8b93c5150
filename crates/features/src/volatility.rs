use std::collections::BTreeMap;

use common::Result;

use crate::rolling::{ensure_same_len, rolling_apply, rolling_mean, FeatureSeries, RollingWindow, Sample};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// True Range: `max(high - low, |high - prev_close|, |low - prev_close|)`.
/// Undefined on the first bar and wherever an input is missing.
pub fn true_range<S: Sample>(high: &[S], low: &[S], close: &[S]) -> Result<FeatureSeries> {
    ensure_same_len(high.len(), low.len())?;
    ensure_same_len(high.len(), close.len())?;
    Ok((0..high.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            let h = high[t].value()?;
            let l = low[t].value()?;
            let pc = close[t - 1].value()?;
            Some((h - l).max((h - pc).abs()).max((l - pc).abs()))
        })
        .collect())
}

/// Average True Range: simple rolling mean of the True Range over `period`.
/// The first `period` values are undefined.
pub fn atr<S: Sample>(high: &[S], low: &[S], close: &[S], period: usize) -> Result<FeatureSeries> {
    let tr = true_range(high, low, close)?;
    rolling_mean(&tr, period)
}

/// ATR as a percentage of the close.
pub fn atr_percent<S: Sample>(high: &[S], low: &[S], close: &[S], period: usize) -> Result<FeatureSeries> {
    let atr = atr(high, low, close, period)?;
    Ok(atr
        .into_iter()
        .zip(close)
        .map(|(a, c)| {
            let c = c.value().filter(|c| *c != 0.0)?;
            Some(a? / c * 100.0)
        })
        .collect())
}

/// Sample std of `returns` for each window, keyed by window. A value is
/// defined only once the window holds `window` present observations.
pub fn rolling_std<S: Sample>(returns: &[S], windows: &[usize]) -> Result<BTreeMap<usize, FeatureSeries>> {
    windows
        .iter()
        .map(|&w| -> Result<(usize, FeatureSeries)> { Ok((w, std_over(returns, w)?)) })
        .collect()
}

fn std_over<S: Sample>(values: &[S], window: usize) -> Result<FeatureSeries> {
    rolling_apply(values, window, window, RollingWindow::std)
}

/// Rolling std scaled by `sqrt(trading_days)`.
pub fn annualized_volatility<S: Sample>(
    returns: &[S],
    window: usize,
    trading_days: f64,
) -> Result<FeatureSeries> {
    let factor = trading_days.sqrt();
    Ok(std_over(returns, window)?
        .into_iter()
        .map(|v| v.map(|s| s * factor))
        .collect())
}

/// Short-window std over long-window std. Above 1 the regime is getting
/// more volatile. Undefined when the long std is zero.
pub fn volatility_ratio<S: Sample>(returns: &[S], short: usize, long: usize) -> Result<FeatureSeries> {
    let s = std_over(returns, short)?;
    let l = std_over(returns, long)?;
    Ok(s.into_iter()
        .zip(l)
        .map(|(s, l)| {
            let l = l.filter(|l| *l > 0.0)?;
            Some(s? / l)
        })
        .collect())
}

/// Parkinson high/low range estimator, annualized, in %.
pub fn parkinson<S: Sample>(high: &[S], low: &[S], window: usize) -> Result<FeatureSeries> {
    ensure_same_len(high.len(), low.len())?;
    let factor = 1.0 / (4.0 * std::f64::consts::LN_2);
    let per_bar: FeatureSeries = high
        .iter()
        .zip(low)
        .map(|(h, l)| {
            let (h, l) = (h.value()?, l.value()?);
            if h <= 0.0 || l <= 0.0 {
                return None;
            }
            Some(factor * (h / l).ln().powi(2))
        })
        .collect();
    Ok(rolling_mean(&per_bar, window)?
        .into_iter()
        .map(|v| v.map(|var| var.sqrt() * 100.0 * TRADING_DAYS_PER_YEAR.sqrt()))
        .collect())
}
