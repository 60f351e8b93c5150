//! The individual vetoes of the decision chain.
//!
//! Each check either yields the value the next step needs or the
//! [`NoTradeReason`] that ends the cycle. They are independent of one
//! another and of [`crate::engine`], so each can be tested in isolation.

use common::{AuxiliarySnapshot, NoTradeReason, SignalClass};
use features::{pct_change, pearson, sample_std, FeatureSeries};

pub type Veto<T> = Result<T, NoTradeReason>;

/// Latest return of the primary instrument and the volatility it is
/// measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveStats {
    /// Fractional change of the last close over the one before.
    pub current_return: f64,
    /// Sample std of the `window` daily returns preceding the current one.
    pub historical_std: f64,
}

impl MoveStats {
    pub fn zscore(&self) -> f64 {
        self.current_return / self.historical_std
    }
}

/// At least `window + 2` closes: `window` historical returns plus the
/// current one.
pub fn require_history(primary: &[f64], window: usize) -> Veto<()> {
    if primary.len() > window + 1 {
        Ok(())
    } else {
        Err(NoTradeReason::InsufficientData)
    }
}

/// Blocks trading while the risk gauge is above `ceiling`. An absent
/// reading does not block. Returns the reading when present.
pub fn risk_filter(auxiliary: &AuxiliarySnapshot, indicator: &str, ceiling: f64) -> Veto<Option<f64>> {
    match auxiliary.get(indicator).copied().filter(|v| v.is_finite()) {
        Some(level) if level > ceiling => Err(NoTradeReason::RiskFilter),
        reading => Ok(reading),
    }
}

fn daily_returns(prices: &[f64]) -> FeatureSeries {
    // a one-day horizon is always a valid window
    pct_change(prices, 1).unwrap_or_else(|_| vec![None; prices.len()])
}

/// Current return and historical std. The std window ends just before the
/// current return so that today's move is not part of its own yardstick,
/// and every return in it must be defined.
pub fn move_stats(primary: &[f64], window: usize) -> Veto<MoveStats> {
    require_history(primary, window)?;
    let returns = daily_returns(primary);
    let n = returns.len();
    let current_return = returns[n - 1].ok_or(NoTradeReason::InsufficientData)?;

    let history: Vec<f64> = returns[n - 1 - window..n - 1]
        .iter()
        .copied()
        .collect::<Option<_>>()
        .ok_or(NoTradeReason::InsufficientData)?;
    let historical_std = sample_std(&history)
        .filter(|s| *s > 0.0 && s.is_finite())
        .ok_or(NoTradeReason::DegenerateVolatility)?;

    Ok(MoveStats { current_return, historical_std })
}

/// Pearson correlation of daily returns over the last `window` pairs, ends
/// of both series aligned.
pub fn return_correlation(primary: &[f64], secondary: &[f64], window: usize) -> Veto<f64> {
    let rp = daily_returns(primary);
    let rs = daily_returns(secondary);
    let pairs = rp.len().min(rs.len()).min(window);
    let a = &rp[rp.len() - pairs..];
    let b = &rs[rs.len() - pairs..];

    let complete = a.iter().zip(b).filter(|(x, y)| x.is_some() && y.is_some()).count();
    if complete < window {
        return Err(NoTradeReason::CorrelationUnavailable);
    }
    pearson(a, b)
        .ok()
        .flatten()
        .ok_or(NoTradeReason::CorrelationUnavailable)
}

/// [`return_correlation`] that also vetoes below `min_correlation`.
pub fn correlation_gate(primary: &[f64], secondary: &[f64], window: usize, min_correlation: f64) -> Veto<f64> {
    let correlation = return_correlation(primary, secondary, window)?;
    if correlation < min_correlation {
        return Err(NoTradeReason::WeakCorrelation);
    }
    Ok(correlation)
}

/// Direction implied by the z-score. A score exactly at the threshold is
/// not a move.
pub fn classify(zscore: f64, threshold: f64) -> Veto<SignalClass> {
    if zscore > threshold {
        Ok(SignalClass::Long)
    } else if zscore < -threshold {
        Ok(SignalClass::Short)
    } else {
        Err(NoTradeReason::BelowThreshold)
    }
}

/// Every intraday change must point the same way as the candidate (flat
/// steps are allowed). With fewer than two prices there is nothing to
/// contradict the candidate.
pub fn direction_consistency(recent: &[f64], candidate: SignalClass) -> Veto<()> {
    let prices: Vec<f64> = recent.iter().copied().filter(|p| p.is_finite()).collect();
    let consistent = prices.windows(2).all(|w| {
        let change = w[1] - w[0];
        match candidate {
            SignalClass::Long => change >= 0.0,
            SignalClass::Short => change <= 0.0,
            SignalClass::NoTrade => true,
        }
    });
    if consistent {
        Ok(())
    } else {
        Err(NoTradeReason::InconsistentDirection)
    }
}

/// Blocks trading when the secondary market moved more than `ceiling` (as
/// a fraction) in either direction. An absent reading counts as no move.
pub fn secondary_stability(auxiliary: &AuxiliarySnapshot, indicator: &str, ceiling: f64) -> Veto<()> {
    let variation = auxiliary
        .get(indicator)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    if variation.abs() > ceiling {
        Err(NoTradeReason::SecondaryInstability)
    } else {
        Ok(())
    }
}

/// `min(|z| / scale, 1)`.
pub fn confidence(zscore: f64, scale: f64) -> f64 {
    (zscore.abs() / scale).min(1.0)
}
