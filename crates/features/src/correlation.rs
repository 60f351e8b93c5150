use serde::Serialize;

use common::Result;

use crate::returns::{pct_change, shift};
use crate::rolling::{ensure_same_len, FeatureSeries, RollingPair, Sample};
use crate::volatility::TRADING_DAYS_PER_YEAR;

/// Fewest aligned observations a [`correlation_report`] accepts.
pub const MIN_REPORT_POINTS: usize = 10;

fn present_pairs<S: Sample>(a: &[S], b: &[S]) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| x.value().zip(y.value()))
        .collect()
}

fn moments(pairs: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let d = n - 1.0;
    Some((sxx / d, syy / d, sxy / d))
}

/// Pearson correlation over positions where both inputs are present.
/// `None` with fewer than two pairs or when either side is constant.
pub fn pearson<S: Sample>(a: &[S], b: &[S]) -> Result<Option<f64>> {
    ensure_same_len(a.len(), b.len())?;
    Ok(pearson_pairs(&present_pairs(a, b)))
}

fn pearson_pairs(pairs: &[(f64, f64)]) -> Option<f64> {
    let (vx, vy, cov) = moments(pairs)?;
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0))
}

/// Rolling Pearson correlation; defined only where the trailing `window`
/// positions are all present on both sides.
pub fn rolling_correlation<S: Sample>(a: &[S], b: &[S], window: usize) -> Result<FeatureSeries> {
    ensure_same_len(a.len(), b.len())?;
    let mut acc = RollingPair::new(window)?;
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            acc.push(x, y);
            if acc.valid() == window {
                acc.correlation()
            } else {
                None
            }
        })
        .collect())
}

/// Average ranks (1-based), ties sharing the mean of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Spearman rank correlation over positions where both inputs are present.
pub fn spearman<S: Sample>(a: &[S], b: &[S]) -> Result<Option<f64>> {
    ensure_same_len(a.len(), b.len())?;
    let pairs = present_pairs(a, b);
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
    let ranked: Vec<(f64, f64)> = ranks(&xs).into_iter().zip(ranks(&ys)).collect();
    Ok(pearson_pairs(&ranked))
}

/// Sensitivity of `dependent` to `driver`: `cov(driver, dependent) / var(driver)`.
pub fn beta<S: Sample>(driver: &[S], dependent: &[S]) -> Result<Option<f64>> {
    ensure_same_len(driver.len(), dependent.len())?;
    Ok(moments(&present_pairs(driver, dependent))
        .and_then(|(vx, _, cov)| (vx > 0.0).then(|| cov / vx)))
}

/// Which side moves first at a given lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leader {
    A,
    B,
    Simultaneous,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadLag {
    /// Positive: `a` leads `b` by `lag` observations; negative: `b` leads.
    pub lag: i64,
    pub correlation: Option<f64>,
    pub leader: Leader,
}

/// Pearson correlation for every lag in `-max_lag..=max_lag`.
pub fn lead_lag_correlation<S: Sample>(a: &[S], b: &[S], max_lag: usize) -> Result<Vec<LeadLag>> {
    ensure_same_len(a.len(), b.len())?;
    let max = max_lag as i64;
    (-max..=max)
        .map(|lag| -> Result<LeadLag> {
            let (correlation, leader) = match lag.signum() {
                1 => (pearson(&shift(a, lag as usize), &shift(b, 0))?, Leader::A),
                -1 => (pearson(&shift(a, 0), &shift(b, lag.unsigned_abs() as usize))?, Leader::B),
                _ => (pearson(a, b)?, Leader::Simultaneous),
            };
            Ok(LeadLag { lag, correlation, leader })
        })
        .collect()
}

/// Periodic relationship summary between two aligned daily price series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    pub pearson: Option<f64>,
    pub spearman: Option<f64>,
    /// Sensitivity of the secondary's returns to the primary's.
    pub beta: Option<f64>,
    pub data_points: usize,
    pub primary_volatility: Option<f64>,
    pub secondary_volatility: Option<f64>,
}

/// Correlation summary over daily returns of two aligned price series.
/// Returns `None` with fewer than [`MIN_REPORT_POINTS`] aligned prices.
pub fn correlation_report<S: Sample>(primary: &[S], secondary: &[S]) -> Result<Option<CorrelationReport>> {
    ensure_same_len(primary.len(), secondary.len())?;
    let aligned = present_pairs(primary, secondary);
    if aligned.len() < MIN_REPORT_POINTS {
        return Ok(None);
    }
    let p: Vec<f64> = aligned.iter().map(|x| x.0).collect();
    let s: Vec<f64> = aligned.iter().map(|x| x.1).collect();
    let rp = pct_change(&p, 1)?;
    let rs = pct_change(&s, 1)?;

    let annualize = |r: &FeatureSeries| {
        let present: Vec<f64> = r.iter().flatten().copied().collect();
        crate::rolling::sample_std(&present).map(|v| v * TRADING_DAYS_PER_YEAR.sqrt())
    };

    Ok(Some(CorrelationReport {
        pearson: pearson(&rp, &rs)?,
        spearman: spearman(&rp, &rs)?,
        beta: beta(&rp, &rs)?,
        data_points: aligned.len(),
        primary_volatility: annualize(&rp),
        secondary_volatility: annualize(&rs),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pearson_of_linear_relation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b).unwrap().unwrap() - 1.0).abs() < 1e-12);
        let c = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson(&a, &c).unwrap().unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_undefined_for_constant_or_short_input() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]).unwrap(), None);
        assert_eq!(pearson(&[1.0], &[2.0]).unwrap(), None);
        assert!(pearson(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn rolling_correlation_waits_for_full_window() {
        let a: Vec<f64> = (0..10).map(|i| (i as f64).sin()).collect();
        let b: Vec<f64> = a.iter().map(|x| 3.0 * x + 1.0).collect();
        let c = rolling_correlation(&a, &b, 4).unwrap();
        assert!(c[..3].iter().all(Option::is_none));
        assert!(c[3..].iter().all(|v| (v.unwrap() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn spearman_handles_ties() {
        let a = [1.0, 2.0, 2.0, 3.0];
        let b = [10.0, 20.0, 20.0, 30.0];
        assert!((spearman(&a, &b).unwrap().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(ranks(&[3.0, 1.0, 3.0]), vec![2.5, 1.0, 2.5]);
    }

    #[test]
    fn beta_is_slope_on_driver() {
        let driver = [1.0, 2.0, 3.0, 4.0];
        let dependent = [0.5, 1.0, 1.5, 2.0];
        assert!((beta(&driver, &dependent).unwrap().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn lead_lag_detects_leading_series() {
        let a: Vec<f64> = (0..40).map(|i| ((i * 7 % 11) as f64).sqrt()).collect();
        // b repeats a two steps later
        let b: Vec<f64> = (0..40).map(|i| if i >= 2 { a[i - 2] } else { 0.0 }).collect();
        let ll = lead_lag_correlation(&a, &b, 3).unwrap();
        assert_eq!(ll.len(), 7);
        let best = ll
            .iter()
            .max_by(|x, y| x.correlation.unwrap_or(0.0).total_cmp(&y.correlation.unwrap_or(0.0)))
            .unwrap();
        assert_eq!(best.lag, 2);
        assert_eq!(best.leader, Leader::A);
        assert_eq!(ll[3].leader, Leader::Simultaneous);
    }

    #[test]
    fn report_needs_minimum_points() {
        let short = [1.0; 5];
        assert_eq!(correlation_report(&short, &short).unwrap(), None);

        let p: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64 * 0.9).sin()).collect();
        let s: Vec<f64> = p.iter().map(|x| x * 2.0).collect();
        let report = correlation_report(&p, &s).unwrap().unwrap();
        assert_eq!(report.data_points, 20);
        assert!((report.pearson.unwrap() - 1.0).abs() < 1e-9);
        assert!((report.beta.unwrap() - 1.0).abs() < 1e-9);
    }
}
