use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::Result;

use crate::rolling::{ensure_same_len, ensure_window, FeatureSeries, Sample};

/// How a price change is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    #[default]
    Simple,
    Log,
}

/// Change over `horizon` observations as a fraction (`p[t] / p[t-h] - 1`).
/// The first `horizon` values are undefined, as is any point where either
/// price is missing or the base price is zero.
pub fn pct_change<S: Sample>(prices: &[S], horizon: usize) -> Result<FeatureSeries> {
    change(prices, horizon, ReturnMethod::Simple)
}

fn change<S: Sample>(prices: &[S], horizon: usize, method: ReturnMethod) -> Result<FeatureSeries> {
    ensure_window("return horizon", horizon)?;
    Ok((0..prices.len())
        .map(|t| {
            if t < horizon {
                return None;
            }
            let now = prices[t].value()?;
            let base = prices[t - horizon].value()?;
            if base == 0.0 {
                return None;
            }
            let ratio = now / base;
            let r = match method {
                ReturnMethod::Simple => ratio - 1.0,
                ReturnMethod::Log if ratio > 0.0 => ratio.ln(),
                ReturnMethod::Log => return None,
            };
            r.is_finite().then_some(r)
        })
        .collect())
}

/// Percentage returns (×100) for each horizon, keyed by horizon.
pub fn returns<S: Sample>(
    prices: &[S],
    horizons: &[usize],
    method: ReturnMethod,
) -> Result<BTreeMap<usize, FeatureSeries>> {
    horizons
        .iter()
        .map(|&h| -> Result<(usize, FeatureSeries)> {
            Ok((h, percent(change(prices, h, method)?)))
        })
        .collect()
}

fn percent(series: FeatureSeries) -> FeatureSeries {
    series.into_iter().map(|v| v.map(|r| r * 100.0)).collect()
}

/// Simple return (%) accumulated over a trailing `window`.
pub fn cumulative_return<S: Sample>(prices: &[S], window: usize) -> Result<FeatureSeries> {
    Ok(percent(pct_change(prices, window)?))
}

/// Short-horizon return minus long-horizon return, both in %.
pub fn momentum<S: Sample>(prices: &[S], short: usize, long: usize) -> Result<FeatureSeries> {
    let s = cumulative_return(prices, short)?;
    let l = cumulative_return(prices, long)?;
    Ok(s.into_iter()
        .zip(l)
        .map(|(a, b)| Some(a? - b?))
        .collect())
}

/// Return of `a` minus return of `b` over `horizon`, in %.
pub fn relative_return<S: Sample>(a: &[S], b: &[S], horizon: usize) -> Result<FeatureSeries> {
    ensure_same_len(a.len(), b.len())?;
    let ra = cumulative_return(a, horizon)?;
    let rb = cumulative_return(b, horizon)?;
    Ok(ra.into_iter()
        .zip(rb)
        .map(|(x, y)| Some(x? - y?))
        .collect())
}

/// Daily return (%) delayed by each lag, so that row `t` only holds
/// information from `t - lag`.
pub fn lagged_returns<S: Sample>(prices: &[S], lags: &[usize]) -> Result<BTreeMap<usize, FeatureSeries>> {
    let daily = cumulative_return(prices, 1)?;
    Ok(lags.iter().map(|&lag| (lag, shift(&daily, lag))).collect())
}

/// Delay a series by `lag` positions; the first `lag` values become undefined.
pub fn shift<S: Sample>(values: &[S], lag: usize) -> FeatureSeries {
    (0..values.len())
        .map(|t| if t < lag { None } else { values[t - lag].value() })
        .collect()
}
