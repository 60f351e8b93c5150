use chrono::{DateTime, Utc};

use common::{AuxiliarySnapshot, FeatureSnapshot, NoTradeReason, Signal, SignalClass};

use crate::config::SignalConfig;
use crate::filters::{self, Veto};

/// Everything one decision needs, borrowed from the caller's snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    /// Daily closes of the leading instrument, oldest first.
    pub primary: &'a [f64],
    /// Daily closes of the traded equity on the same dates.
    pub secondary: &'a [f64],
    /// Intraday prices of the primary inside the direction look-back.
    pub recent: &'a [f64],
    pub auxiliary: &'a AuxiliarySnapshot,
}

/// Turns a move of the primary instrument into a LONG / SHORT / NO_TRADE
/// decision for the equity.
///
/// The checks run in a fixed order and the first failing one decides the
/// reason. The engine holds only its parameters, so one instance can serve
/// any number of cycles.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: SignalConfig,
}

impl DecisionEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Evaluate one cycle. Never fails: anything that prevents a decision
    /// becomes a `NO_TRADE` carrying the features computed so far.
    pub fn evaluate(&self, input: &DecisionInput<'_>, as_of: DateTime<Utc>) -> Signal {
        let mut features = FeatureSnapshot {
            auxiliary: input.auxiliary.clone(),
            ..FeatureSnapshot::default()
        };
        match self.decide(input, &mut features) {
            Ok((class, confidence)) => Signal::trade(class, confidence, features, as_of),
            Err(reason) => Signal::no_trade(reason, features, as_of),
        }
    }

    fn decide(&self, input: &DecisionInput<'_>, features: &mut FeatureSnapshot) -> Veto<(SignalClass, f64)> {
        let cfg = &self.config;

        filters::require_history(input.primary, cfg.window)?;
        filters::risk_filter(input.auxiliary, &cfg.risk_indicator, cfg.risk_ceiling)?;

        let stats = filters::move_stats(input.primary, cfg.window)?;
        features.current_return = Some(stats.current_return);
        features.historical_std = Some(stats.historical_std);

        let correlation = filters::return_correlation(input.primary, input.secondary, cfg.window)?;
        features.correlation = Some(correlation);
        if correlation < cfg.min_correlation {
            return Err(NoTradeReason::WeakCorrelation);
        }

        let z = stats.zscore();
        features.zscore = Some(z);
        let candidate = filters::classify(z, cfg.zscore_threshold)?;

        filters::direction_consistency(input.recent, candidate)?;
        filters::secondary_stability(input.auxiliary, &cfg.secondary_indicator, cfg.secondary_ceiling)?;

        Ok((candidate, filters::confidence(z, cfg.confidence_scale)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 13, 0, 0).unwrap()
    }

    /// 23 closes whose first 21 returns alternate +1% / -1% and whose last
    /// return is `last_move`.
    fn closes(start: f64, last_move: f64) -> Vec<f64> {
        let mut prices = vec![start];
        for i in 0..21 {
            let r = if i % 2 == 0 { 0.01 } else { -0.01 };
            let p = *prices.last().unwrap();
            prices.push(p * (1.0 + r));
        }
        let p = *prices.last().unwrap();
        prices.push(p * (1.0 + last_move));
        prices
    }

    /// Prices starting at `start` whose daily returns are the primary's plus
    /// `noise` times a period-four pattern orthogonal to the alternating one.
    fn tracking(primary: &[f64], start: f64, noise: f64) -> Vec<f64> {
        let pattern = [0.01, 0.01, -0.01, -0.01];
        let mut prices = vec![start];
        for (i, pair) in primary.windows(2).enumerate() {
            let r = pair[1] / pair[0] - 1.0 + noise * pattern[i % 4];
            let p = *prices.last().unwrap();
            prices.push(p * (1.0 + r));
        }
        prices
    }

    fn aux(entries: &[(&str, f64)]) -> AuxiliarySnapshot {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(SignalConfig::default())
    }

    #[test]
    fn sharp_drop_with_calm_markets_is_short() {
        let primary = closes(100.0, -0.03);
        let secondary = tracking(&primary, 60.0, 1.75);
        let auxiliary = aux(&[("vix", 15.0), ("usd_brl_change", 0.001)]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &secondary,
            recent: &[96.0, 95.8, 95.8, 95.5],
            auxiliary: &auxiliary,
        };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.class, SignalClass::Short);
        assert_eq!(signal.reason, None);
        assert!(signal.confidence > 0.0 && signal.confidence <= 1.0);
        assert!(signal.features.zscore.unwrap() < -1.5);
        let c = signal.features.correlation.unwrap();
        assert!(c > 0.45 && c < 0.55, "{c}");
        assert_eq!(signal.timestamp, as_of());
    }

    #[test]
    fn moderate_correlation_passes_the_gate() {
        let primary = closes(100.0, -0.03);
        let auxiliary = aux(&[]);
        for (noise, low, high) in [(1.0, 0.7, 0.8), (2.5, 0.3, 0.4)] {
            let secondary = tracking(&primary, 60.0, noise);
            let input = DecisionInput {
                primary: &primary,
                secondary: &secondary,
                recent: &[],
                auxiliary: &auxiliary,
            };
            let signal = engine().evaluate(&input, as_of());
            assert_eq!(signal.class, SignalClass::Short);
            let c = signal.features.correlation.unwrap();
            assert!(c > low && c < high, "{noise}: {c}");
        }
    }

    #[test]
    fn high_fear_gauge_blocks_trading() {
        let primary = closes(100.0, -0.03);
        let auxiliary = aux(&[("vix", 30.0)]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &primary,
            recent: &[],
            auxiliary: &auxiliary,
        };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.class, SignalClass::NoTrade);
        assert_eq!(signal.reason, Some(NoTradeReason::RiskFilter));
        assert_eq!(signal.confidence, 0.0);
        assert_eq!(signal.features.auxiliary["vix"], 30.0);
    }

    #[test]
    fn weak_correlation_blocks_trading() {
        let primary = closes(100.0, -0.03);
        // a period-four return pattern is orthogonal to the alternating one
        let mut secondary = vec![50.0];
        let pattern = [0.01, 0.01, -0.01, -0.01];
        for i in 0..22 {
            let p = *secondary.last().unwrap();
            secondary.push(p * (1.0 + pattern[i % 4]));
        }
        let auxiliary = aux(&[]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &secondary,
            recent: &[],
            auxiliary: &auxiliary,
        };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.reason, Some(NoTradeReason::WeakCorrelation));
        let c = signal.features.correlation.unwrap();
        assert!(c < 0.2 && c > -0.2);
        assert!(signal.features.historical_std.is_some());
    }

    #[test]
    fn flat_prices_have_no_volatility() {
        let primary = vec![80.0; 25];
        let auxiliary = aux(&[]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &primary,
            recent: &[],
            auxiliary: &auxiliary,
        };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.reason, Some(NoTradeReason::DegenerateVolatility));
        assert_eq!(signal.class, SignalClass::NoTrade);
    }

    #[test]
    fn short_history_is_insufficient() {
        let primary = vec![1.0, 2.0, 3.0];
        let auxiliary = aux(&[("vix", 90.0)]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &primary,
            recent: &[],
            auxiliary: &auxiliary,
        };
        // history is checked before the risk filter
        assert_eq!(
            engine().evaluate(&input, as_of()).reason,
            Some(NoTradeReason::InsufficientData)
        );
    }

    #[test]
    fn later_vetoes_in_order() {
        let primary = closes(100.0, 0.05);
        let auxiliary = aux(&[("usd_brl_change", 0.02)]);

        // intraday prices falling against a rise
        let input = DecisionInput {
            primary: &primary,
            secondary: &primary,
            recent: &[100.0, 99.0],
            auxiliary: &auxiliary,
        };
        assert_eq!(
            engine().evaluate(&input, as_of()).reason,
            Some(NoTradeReason::InconsistentDirection)
        );

        let input = DecisionInput { recent: &[99.0, 100.0], ..input };
        assert_eq!(
            engine().evaluate(&input, as_of()).reason,
            Some(NoTradeReason::SecondaryInstability)
        );

        let calm = aux(&[("usd_brl_change", 0.0)]);
        let input = DecisionInput { auxiliary: &calm, ..input };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.class, SignalClass::Long);
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn small_move_is_below_threshold() {
        let primary = closes(100.0, 0.005);
        let auxiliary = aux(&[]);
        let input = DecisionInput {
            primary: &primary,
            secondary: &primary,
            recent: &[],
            auxiliary: &auxiliary,
        };
        let signal = engine().evaluate(&input, as_of());
        assert_eq!(signal.reason, Some(NoTradeReason::BelowThreshold));
        assert!(signal.features.zscore.unwrap().abs() < 1.5);
    }
}
