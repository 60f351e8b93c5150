//! Sliding-window and expanding accumulators.
//!
//! Every windowed feature in this crate is built on these types so that a
//! series of length `n` costs O(n) regardless of the window size.

use common::{Error, Result};

/// A value that may be missing. Non-finite floats count as missing.
pub trait Sample: Copy {
    fn value(self) -> Option<f64>;
}

impl Sample for f64 {
    fn value(self) -> Option<f64> {
        self.is_finite().then_some(self)
    }
}

impl Sample for Option<f64> {
    fn value(self) -> Option<f64> {
        self.filter(|v| v.is_finite())
    }
}

/// Derived per-date feature values; `None` means undefined.
pub type FeatureSeries = Vec<Option<f64>>;

pub(crate) fn ensure_window(name: &str, window: usize) -> Result<()> {
    if window == 0 {
        return Err(Error::config(format!("{name} must be positive")));
    }
    Ok(())
}

pub(crate) fn ensure_same_len(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(Error::config(format!(
            "input series must have equal length ({a} vs {b})"
        )));
    }
    Ok(())
}

/// Length of the latest streak of equal present values. Missing values
/// neither extend nor break a streak, so a window whose `valid` present
/// values are all equal has `streak >= valid`.
#[derive(Debug, Clone, Copy, Default)]
struct Streak {
    len: usize,
    last: Option<f64>,
}

impl Streak {
    fn observe(&mut self, value: Option<f64>) {
        let Some(v) = value else { return };
        self.len = if self.last == Some(v) { self.len + 1 } else { 1 };
        self.last = Some(v);
    }

    fn covers(&self, valid: usize) -> bool {
        valid > 0 && self.len >= valid
    }
}

/// Fixed-capacity ring buffer keeping running sums of the values it holds.
///
/// Sums are kept relative to a shift (the first value seen after each
/// resync), which keeps the variance exact for constant windows and stable
/// for large price levels. Sums are recomputed from the buffer every time
/// the write position wraps, so rounding drift stays bounded.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: Vec<Option<f64>>,
    pos: usize,
    len: usize,
    cap: usize,
    valid: usize,
    shift: f64,
    sum: f64,
    sum_sq: f64,
    streak: Streak,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        ensure_window("window", capacity)?;
        Ok(Self {
            buf: vec![None; capacity],
            pos: 0,
            len: 0,
            cap: capacity,
            valid: 0,
            shift: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
            streak: Streak::default(),
        })
    }

    pub fn push(&mut self, sample: impl Sample) {
        let value = sample.value();

        if self.len == self.cap {
            if let Some(old) = self.buf[self.pos] {
                let d = old - self.shift;
                self.sum -= d;
                self.sum_sq -= d * d;
                self.valid -= 1;
            }
        } else {
            self.len += 1;
        }

        if let Some(v) = value {
            if self.valid == 0 {
                self.shift = v;
                self.sum = 0.0;
                self.sum_sq = 0.0;
            }
            let d = v - self.shift;
            self.sum += d;
            self.sum_sq += d * d;
            self.valid += 1;
        }

        self.streak.observe(value);

        self.buf[self.pos] = value;
        self.pos = (self.pos + 1) % self.cap;
        if self.pos == 0 {
            self.resync();
        }
    }

    fn resync(&mut self) {
        let shift = self.iter().flatten().next().unwrap_or(0.0);
        self.shift = shift;
        self.sum = 0.0;
        self.sum_sq = 0.0;
        for v in self.buf.iter().flatten() {
            let d = v - self.shift;
            self.sum += d;
            self.sum_sq += d * d;
        }
    }

    pub fn full(&self) -> bool {
        self.len == self.cap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of non-missing values currently in the window.
    pub fn valid(&self) -> usize {
        self.valid
    }

    /// Iterate over slots in insertion order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        let start = if self.len < self.cap { 0 } else { self.pos };
        (0..self.len).map(move |i| self.buf[(start + i) % self.cap])
    }

    pub fn sum(&self) -> Option<f64> {
        (self.valid > 0).then(|| self.sum + self.shift * self.valid as f64)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.valid > 0).then(|| self.shift + self.sum / self.valid as f64)
    }

    /// Variance with `ddof` delta degrees of freedom; `None` when fewer than
    /// `ddof + 1` values are present.
    pub fn variance(&self, ddof: usize) -> Option<f64> {
        if self.valid <= ddof {
            return None;
        }
        if self.streak.covers(self.valid) {
            return Some(0.0);
        }
        let n = self.valid as f64;
        let var = (self.sum_sq - self.sum * self.sum / n) / (n - ddof as f64);
        Some(var.max(0.0))
    }

    /// Sample standard deviation (ddof = 1).
    pub fn std(&self) -> Option<f64> {
        self.variance(1).map(f64::sqrt)
    }
}

/// Unbounded accumulator over all history seen so far (Welford update).
#[derive(Debug, Clone, Default)]
pub struct Expanding {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Expanding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: impl Sample) {
        let Some(v) = sample.value() else { return };
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn std(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2.max(0.0) / (self.count - 1) as f64).sqrt())
    }
}

/// Paired rolling window for covariance and Pearson correlation. A slot
/// counts only when both sides are present.
#[derive(Debug, Clone)]
pub struct RollingPair {
    buf: Vec<Option<(f64, f64)>>,
    pos: usize,
    len: usize,
    cap: usize,
    valid: usize,
    shift: (f64, f64),
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    streaks: (Streak, Streak),
}

impl RollingPair {
    pub fn new(capacity: usize) -> Result<Self> {
        ensure_window("window", capacity)?;
        Ok(Self {
            buf: vec![None; capacity],
            pos: 0,
            len: 0,
            cap: capacity,
            valid: 0,
            shift: (0.0, 0.0),
            sx: 0.0,
            sy: 0.0,
            sxx: 0.0,
            syy: 0.0,
            sxy: 0.0,
            streaks: (Streak::default(), Streak::default()),
        })
    }

    pub fn push(&mut self, x: impl Sample, y: impl Sample) {
        let pair = x.value().zip(y.value());

        if self.len == self.cap {
            if let Some(old) = self.buf[self.pos] {
                self.accumulate(old, -1.0);
                self.valid -= 1;
            }
        } else {
            self.len += 1;
        }

        self.streaks.0.observe(pair.map(|p| p.0));
        self.streaks.1.observe(pair.map(|p| p.1));

        if let Some(p) = pair {
            if self.valid == 0 {
                self.shift = p;
                self.sx = 0.0;
                self.sy = 0.0;
                self.sxx = 0.0;
                self.syy = 0.0;
                self.sxy = 0.0;
            }
            self.accumulate(p, 1.0);
            self.valid += 1;
        }

        self.buf[self.pos] = pair;
        self.pos = (self.pos + 1) % self.cap;
        if self.pos == 0 {
            self.resync();
        }
    }

    fn accumulate(&mut self, (x, y): (f64, f64), sign: f64) {
        let dx = x - self.shift.0;
        let dy = y - self.shift.1;
        self.sx += sign * dx;
        self.sy += sign * dy;
        self.sxx += sign * dx * dx;
        self.syy += sign * dy * dy;
        self.sxy += sign * dx * dy;
    }

    fn resync(&mut self) {
        let start = if self.len < self.cap { 0 } else { self.pos };
        let first = (0..self.len)
            .filter_map(|i| self.buf[(start + i) % self.cap])
            .next();
        self.shift = first.unwrap_or((0.0, 0.0));
        self.sx = 0.0;
        self.sy = 0.0;
        self.sxx = 0.0;
        self.syy = 0.0;
        self.sxy = 0.0;
        let pairs: Vec<(f64, f64)> = self.buf.iter().flatten().copied().collect();
        for p in pairs {
            self.accumulate(p, 1.0);
        }
    }

    pub fn full(&self) -> bool {
        self.len == self.cap
    }

    pub fn valid(&self) -> usize {
        self.valid
    }

    /// Sample covariance (ddof = 1).
    pub fn covariance(&self) -> Option<f64> {
        if self.valid < 2 {
            return None;
        }
        let n = self.valid as f64;
        Some((self.sxy - self.sx * self.sy / n) / (n - 1.0))
    }

    /// Pearson correlation; `None` when either side has zero variance.
    pub fn correlation(&self) -> Option<f64> {
        if self.valid < 2 || self.streaks.0.covers(self.valid) || self.streaks.1.covers(self.valid) {
            return None;
        }
        let n = self.valid as f64;
        let vx = self.sxx - self.sx * self.sx / n;
        let vy = self.syy - self.sy * self.sy / n;
        if vx <= 0.0 || vy <= 0.0 {
            return None;
        }
        let cov = self.sxy - self.sx * self.sy / n;
        Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0))
    }
}

/// Slide a window over `values` and evaluate `stat` wherever at least
/// `min_periods` present values are inside the window.
pub fn rolling_apply<S: Sample>(
    values: &[S],
    window: usize,
    min_periods: usize,
    stat: impl Fn(&RollingWindow) -> Option<f64>,
) -> Result<FeatureSeries> {
    ensure_window("min_periods", min_periods)?;
    if min_periods > window {
        return Err(Error::config(format!(
            "min_periods ({min_periods}) cannot exceed window ({window})"
        )));
    }
    let mut w = RollingWindow::new(window)?;
    Ok(values
        .iter()
        .map(|&v| {
            w.push(v);
            if w.valid() >= min_periods {
                stat(&w)
            } else {
                None
            }
        })
        .collect())
}

/// Rolling mean requiring a fully populated window.
pub fn rolling_mean<S: Sample>(values: &[S], window: usize) -> Result<FeatureSeries> {
    rolling_apply(values, window, window, RollingWindow::mean)
}

/// Mean of a slice, ignoring missing values.
pub fn mean(values: &[f64]) -> Option<f64> {
    let mut acc = Expanding::new();
    values.iter().for_each(|&v| acc.push(v));
    acc.mean()
}

/// Sample standard deviation (ddof = 1) of a slice, ignoring missing values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let mut acc = Expanding::new();
    values.iter().for_each(|&v| acc.push(v));
    acc.std()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_std(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        assert!(RollingWindow::new(0).is_err());
        assert!(RollingPair::new(0).is_err());
    }

    #[test]
    fn window_evicts_oldest() {
        let mut w = RollingWindow::new(3).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert!(w.full());
        assert_eq!(w.iter().flatten().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert!((w.mean().unwrap() - 3.0).abs() < 1e-12);
        assert!((w.sum().unwrap() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn std_matches_direct_formula_over_long_series() {
        let values: Vec<f64> = (0..500)
            .map(|i| 1000.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.01)
            .collect();
        let mut w = RollingWindow::new(20).unwrap();
        for (i, &v) in values.iter().enumerate() {
            w.push(v);
            if i >= 19 {
                let expected = direct_std(&values[i - 19..=i]);
                assert!((w.std().unwrap() - expected).abs() < 1e-9, "at {i}");
            }
        }
    }

    #[test]
    fn constant_window_has_exactly_zero_variance() {
        let mut w = RollingWindow::new(4).unwrap();
        for v in [3.0, 7.0, 0.1, 0.1, 0.1, 0.1] {
            w.push(v);
        }
        assert_eq!(w.variance(1), Some(0.0));
    }

    #[test]
    fn constant_window_with_gaps_has_exactly_zero_variance() {
        for (a, c) in [(10.0, 2.9), (99.1, 3.3), (10.0, 101.7)] {
            let mut w = RollingWindow::new(4).unwrap();
            for v in [a, c, f64::NAN, c, c, c] {
                w.push(v);
            }
            assert_eq!(w.variance(1), Some(0.0), "a={a} c={c}");
        }

        let mut w = RollingWindow::new(4).unwrap();
        for v in [5.0, f64::NAN, 5.0, 6.0] {
            w.push(v);
        }
        assert!(w.variance(1).unwrap() > 0.0);
    }

    #[test]
    fn pair_with_constant_side_has_no_correlation() {
        let mut p = RollingPair::new(4).unwrap();
        for (x, y) in [(1.0, 8.3), (2.0, 2.9), (3.0, f64::NAN), (4.0, 2.9), (5.0, 2.9), (6.0, 2.9)] {
            p.push(x, y);
        }
        assert_eq!(p.correlation(), None);
    }

    #[test]
    fn missing_values_are_not_counted() {
        let mut w = RollingWindow::new(3).unwrap();
        w.push(1.0);
        w.push(f64::NAN);
        w.push(None::<f64>);
        assert_eq!(w.valid(), 1);
        assert_eq!(w.len(), 3);
        assert_eq!(w.std(), None);
        w.push(3.0);
        assert_eq!(w.valid(), 1);
        assert_eq!(w.mean(), Some(3.0));
    }

    #[test]
    fn expanding_welford_matches_direct() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut acc = Expanding::new();
        values.iter().for_each(|&v| acc.push(v));
        assert_eq!(acc.mean(), Some(5.0));
        assert!((acc.std().unwrap() - direct_std(&values)).abs() < 1e-12);
    }

    #[test]
    fn pair_correlation_of_scaled_series_is_one() {
        let mut p = RollingPair::new(5).unwrap();
        for i in 0..12 {
            let x = (i as f64 * 1.3).cos();
            p.push(x, 2.0 * x);
        }
        assert!((p.correlation().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pair_correlation_undefined_for_flat_side() {
        let mut p = RollingPair::new(4).unwrap();
        for i in 0..4 {
            p.push(i as f64, 5.0);
        }
        assert_eq!(p.correlation(), None);
    }

    #[test]
    fn slice_helpers_skip_missing() {
        assert_eq!(mean(&[1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(sample_std(&[]), None);
    }
}
