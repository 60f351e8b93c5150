//! Consolidated daily dataset used for statistical analysis of the pair.

use std::collections::BTreeMap;

use common::{Error, PriceSeries, Result};

use crate::alignment::{align, AlignMethod, AlignedTable};
use crate::returns::{pct_change, returns, shift, ReturnMethod};
use crate::rolling::FeatureSeries;
use crate::volatility::{atr, atr_percent, rolling_std, volatility_ratio};
use crate::zscore::{zscore, zscore_signal};

/// ATR periods added by [`with_volatility`] when highs and lows are given.
pub const ATR_PERIODS: [usize; 2] = [14, 20];

/// Windows of the short/long volatility ratio column.
pub const VOL_RATIO_WINDOWS: (usize, usize) = (5, 20);

/// Primary instrument, equity, and any auxiliary series forward-filled onto
/// the equity's trading days. Rows missing either essential price are
/// dropped.
pub fn build_analysis_dataset(
    primary: (&str, &PriceSeries),
    equity: (&str, &PriceSeries),
    auxiliary: &BTreeMap<String, PriceSeries>,
    max_gap: u32,
) -> Result<AlignedTable> {
    let (primary_key, primary) = primary;
    let (equity_key, equity) = equity;

    let mut series = auxiliary.clone();
    for (key, s) in [(primary_key, primary), (equity_key, equity)] {
        if series.insert(key.to_string(), s.clone()).is_some() {
            return Err(Error::config(format!("series key '{key}' is used twice")));
        }
    }

    align(&series, AlignMethod::ForwardFill, equity_key, max_gap)?
        .drop_incomplete(&[primary_key, equity_key])
}

/// Append `<column>_lag_<k>` for each lag: the column's value `k` rows
/// earlier.
pub fn lagged(table: AlignedTable, column: &str, lags: &[usize]) -> Result<AlignedTable> {
    let values = required(&table, column)?;
    lags.iter().try_fold(table, |table, &lag| {
        table.with_column(format!("{column}_lag_{lag}"), shift(&values, lag))
    })
}

/// Append `<column>_return_<h>d` (percent) for each horizon.
pub fn with_returns(
    table: AlignedTable,
    column: &str,
    horizons: &[usize],
    method: ReturnMethod,
) -> Result<AlignedTable> {
    let values = required(&table, column)?;
    returns(&values, horizons, method)?
        .into_iter()
        .try_fold(table, |table, (h, r)| table.with_column(format!("{column}_return_{h}d"), r))
}

fn required(table: &AlignedTable, column: &str) -> Result<FeatureSeries> {
    table
        .column(column)
        .ok_or_else(|| Error::config(format!("column '{column}' not found")))
}

/// Append volatility columns for a close column:
///
/// - `<close>_volatility_<w>d`: rolling std of daily percent returns, one per window
/// - `<close>_atr_<p>` and `<close>_atr_pct_<p>` for [`ATR_PERIODS`], only when
///   `high_low` names the high and low columns
/// - `<close>_vol_ratio_5_20` when the windows include both 5 and 20
pub fn with_volatility(
    table: AlignedTable,
    close: &str,
    high_low: Option<(&str, &str)>,
    windows: &[usize],
) -> Result<AlignedTable> {
    let closes = required(&table, close)?;
    let daily: Vec<Option<f64>> = pct_change(&closes, 1)?
        .into_iter()
        .map(|r| r.map(|r| r * 100.0))
        .collect();

    let mut table = rolling_std(&daily, windows)?
        .into_iter()
        .try_fold(table, |table, (w, std)| table.with_column(format!("{close}_volatility_{w}d"), std))?;

    if let Some((high, low)) = high_low {
        let highs = required(&table, high)?;
        let lows = required(&table, low)?;
        for period in ATR_PERIODS {
            let range = atr(&highs, &lows, &closes, period)?;
            let pct = atr_percent(&highs, &lows, &closes, period)?;
            table = table
                .with_column(format!("{close}_atr_{period}"), range)?
                .with_column(format!("{close}_atr_pct_{period}"), pct)?;
        }
    }

    let (short, long) = VOL_RATIO_WINDOWS;
    if windows.contains(&short) && windows.contains(&long) {
        let ratio = volatility_ratio(&daily, short, long)?;
        table = table.with_column(format!("{close}_vol_ratio_{short}_{long}"), ratio)?;
    }
    Ok(table)
}

/// Append `<column>_zscore_<w>` and the discrete `<column>_zscore_signal_<w>`
/// (`1.0`, `-1.0` or `0.0` at `threshold`) for each window.
pub fn with_zscores(table: AlignedTable, column: &str, windows: &[usize], threshold: f64) -> Result<AlignedTable> {
    let values = required(&table, column)?;
    windows.iter().try_fold(table, |table, &w| {
        let z = zscore(&values, w, None)?;
        let signal = zscore_signal(&values, w, threshold)?
            .into_iter()
            .map(|s| Some(f64::from(s)))
            .collect();
        table
            .with_column(format!("{column}_zscore_{w}"), z)?
            .with_column(format!("{column}_zscore_signal_{w}"), signal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::PriceObservation;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap() + chrono::Duration::days(n)
    }

    fn series(points: &[(i64, f64)]) -> PriceSeries {
        PriceSeries::from_points(points.iter().map(|&(d, p)| (day(d), p))).unwrap()
    }

    #[test]
    fn dataset_follows_equity_calendar() {
        // futures trade through a local holiday (day 2) the equity skips
        let ore = series(&[(1, 100.0), (2, 102.0), (3, 101.0)]);
        let vale = series(&[(0, 60.0), (1, 61.0), (3, 62.0), (4, 63.0)]);
        let mut aux = BTreeMap::new();
        aux.insert("vix".to_string(), series(&[(0, 14.0)]));

        let table = build_analysis_dataset(("iron_ore", &ore), ("vale3", &vale), &aux, 5).unwrap();
        // day 0 has no futures price yet and is dropped
        assert_eq!(table.dates(), &[day(1), day(3), day(4)]);
        assert_eq!(
            table.column("iron_ore").unwrap(),
            vec![Some(100.0), Some(101.0), Some(101.0)]
        );
        assert_eq!(table.column("vix").unwrap(), vec![Some(14.0); 3]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let s = series(&[(0, 1.0)]);
        let mut aux = BTreeMap::new();
        aux.insert("vale3".to_string(), s.clone());
        assert!(build_analysis_dataset(("iron_ore", &s), ("vale3", &s), &aux, 5).is_err());
    }

    #[test]
    fn lagged_and_return_columns() {
        let mut input = BTreeMap::new();
        input.insert("x".to_string(), series(&[(0, 100.0), (1, 110.0), (2, 99.0)]));
        let table = align(&input, AlignMethod::Outer, "x", 0).unwrap();

        let table = with_returns(table, "x", &[1], ReturnMethod::Simple).unwrap();
        let r = table.column("x_return_1d").unwrap();
        assert_eq!(r[0], None);
        assert!((r[1].unwrap() - 10.0).abs() < 1e-9);

        let table = lagged(table, "x_return_1d", &[1, 2]).unwrap();
        assert_eq!(table.column("x_return_1d_lag_1").unwrap()[2], r[1]);
        assert_eq!(table.column("x_return_1d_lag_2").unwrap(), vec![None, None, None]);
        assert!(lagged(table, "missing", &[1]).is_err());
    }

    fn ohlc_table(days: i64) -> AlignedTable {
        let obs = (0..days)
            .map(|d| {
                let close = 100.0 + if d % 2 == 0 { 0.0 } else { 2.0 } + d as f64 * 0.1;
                PriceObservation::new(day(d), close).with_ohlcv(close, close + 1.0, close - 1.0, close, 1e5)
            })
            .collect();
        let mut input = BTreeMap::new();
        input.insert("ore".to_string(), PriceSeries::new(obs).unwrap());
        align(&input, AlignMethod::Outer, "ore", 0).unwrap()
    }

    #[test]
    fn volatility_columns() {
        let table = with_volatility(ohlc_table(30), "ore", Some(("ore_high", "ore_low")), &[5, 10, 20]).unwrap();
        for name in [
            "ore_volatility_5d",
            "ore_volatility_10d",
            "ore_volatility_20d",
            "ore_atr_14",
            "ore_atr_pct_14",
            "ore_atr_20",
            "ore_atr_pct_20",
            "ore_vol_ratio_5_20",
        ] {
            assert!(table.column(name).is_some(), "{name}");
        }

        let vol = table.column("ore_volatility_5d").unwrap();
        // the first return is undefined, so five returns need six closes
        assert_eq!(vol[4], None);
        assert!(vol[5].unwrap() > 0.0);

        let atr = table.column("ore_atr_14").unwrap();
        assert_eq!(atr[13], None);
        // every bar's range reaches the previous close, so TR is at least 2
        assert!(atr[14].unwrap() >= 2.0);
        let pct = table.column("ore_atr_pct_14").unwrap();
        let close = table.value("ore", day(14)).unwrap();
        assert!((pct[14].unwrap() - atr[14].unwrap() / close * 100.0).abs() < 1e-9);

        let ratio = table.column("ore_vol_ratio_5_20").unwrap();
        assert_eq!(ratio[19], None);
        assert!(ratio[20].unwrap() > 0.0);
    }

    #[test]
    fn volatility_without_ranges_or_ratio_windows() {
        let table = with_volatility(ohlc_table(10), "ore", None, &[3]).unwrap();
        assert!(table.column("ore_volatility_3d").is_some());
        assert!(table.column("ore_atr_14").is_none());
        assert!(table.column("ore_vol_ratio_5_20").is_none());
        assert!(with_volatility(ohlc_table(10), "ore", Some(("ore_high", "nope")), &[3]).is_err());
    }

    #[test]
    fn zscore_columns_with_signal() {
        let mut input = BTreeMap::new();
        let mut points: Vec<(i64, f64)> = (0..12).map(|d| (d, if d % 2 == 0 { 1.0 } else { 2.0 })).collect();
        points.push((12, 10.0));
        input.insert("x".to_string(), series(&points));
        let table = align(&input, AlignMethod::Outer, "x", 0).unwrap();

        let table = with_zscores(table, "x", &[10], 1.5).unwrap();
        let z = table.column("x_zscore_10").unwrap();
        let signal = table.column("x_zscore_signal_10").unwrap();
        assert!(z[12].unwrap() > 1.5);
        assert_eq!(signal[12], Some(1.0));
        assert_eq!(signal[0], Some(0.0));
        assert!(with_zscores(table, "x", &[10], 1.5).is_err());
    }
}
