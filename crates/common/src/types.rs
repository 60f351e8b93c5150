use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Latest value of each auxiliary indicator, keyed by name
/// (e.g. `"vix"`, `"usd_brl_change"`).
pub type AuxiliarySnapshot = BTreeMap<String, f64>;

/// One daily observation of an instrument.
///
/// `price` is the decision price (settlement for futures, close for
/// equities). The OHLCV fields are optional because not every source
/// provides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            price,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }

    pub fn with_ohlcv(mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.close = Some(close);
        self.volume = Some(volume);
        self
    }

    /// Value of an OHLCV field, if the source provided it.
    pub fn field(&self, field: OhlcvField) -> Option<f64> {
        match field {
            OhlcvField::Open => self.open,
            OhlcvField::High => self.high,
            OhlcvField::Low => self.low,
            OhlcvField::Close => self.close,
            OhlcvField::Volume => self.volume,
        }
    }
}

/// Optional per-bar fields carried alongside the decision price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OhlcvField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl OhlcvField {
    pub const ALL: [OhlcvField; 5] = [
        OhlcvField::Open,
        OhlcvField::High,
        OhlcvField::Low,
        OhlcvField::Close,
        OhlcvField::Volume,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            OhlcvField::Open => "open",
            OhlcvField::High => "high",
            OhlcvField::Low => "low",
            OhlcvField::Close => "close",
            OhlcvField::Volume => "volume",
        }
    }
}

/// Ordered daily observations of one instrument. Dates are strictly
/// increasing; the constructor rejects anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PriceObservation>", into = "Vec<PriceObservation>")]
pub struct PriceSeries {
    observations: Vec<PriceObservation>,
}

impl PriceSeries {
    pub fn new(observations: Vec<PriceObservation>) -> Result<Self> {
        if let Some(w) = observations.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(Error::config(format!(
                "price series dates must be strictly increasing ({} followed by {})",
                w[0].date, w[1].date
            )));
        }
        Ok(Self { observations })
    }

    /// Build a price-only series from `(date, price)` pairs.
    pub fn from_points(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self> {
        Self::new(
            points
                .into_iter()
                .map(|(date, price)| PriceObservation::new(date, price))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.observations.iter().map(|o| o.date)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.price).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    /// True when at least one observation carries `field`.
    pub fn has_field(&self, field: OhlcvField) -> bool {
        self.observations.iter().any(|o| o.field(field).is_some())
    }
}

impl TryFrom<Vec<PriceObservation>> for PriceSeries {
    type Error = Error;

    fn try_from(observations: Vec<PriceObservation>) -> Result<Self> {
        Self::new(observations)
    }
}

impl From<PriceSeries> for Vec<PriceObservation> {
    fn from(series: PriceSeries) -> Self {
        series.observations
    }
}

/// A single intraday quote of the primary instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntradayTick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl IntradayTick {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Collapse intraday ticks into a daily series using the last tick of each
/// UTC calendar date. Ticks may arrive unordered; non-finite prices are
/// skipped.
pub fn resample_daily_last(ticks: &[IntradayTick]) -> PriceSeries {
    let mut sorted: Vec<&IntradayTick> = ticks.iter().filter(|t| t.price.is_finite()).collect();
    sorted.sort_by_key(|t| t.timestamp);

    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tick in sorted {
        daily.insert(tick.timestamp.date_naive(), tick.price);
    }

    PriceSeries {
        observations: daily
            .into_iter()
            .map(|(date, price)| PriceObservation::new(date, price))
            .collect(),
    }
}

/// Everything one evaluation cycle reads, gathered by the caller.
///
/// ```json
/// {
///   "series": { "iron_ore": [{ "date": "2024-06-03", "price": 108.2 }] },
///   "intraday": [{ "timestamp": "2024-06-03T12:00:00Z", "price": 108.4 }],
///   "auxiliary": { "vix": 13.1, "usd_brl_change": 0.002 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Daily series keyed by name.
    pub series: BTreeMap<String, PriceSeries>,
    /// Intraday ticks of the primary instrument, any order.
    #[serde(default)]
    pub intraday: Vec<IntradayTick>,
    #[serde(default)]
    pub auxiliary: AuxiliarySnapshot,
}

impl MarketSnapshot {
    /// Finite intraday prices with `start < timestamp <= end`, oldest first.
    pub fn intraday_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<f64> {
        let mut ticks: Vec<&IntradayTick> = self
            .intraday
            .iter()
            .filter(|t| t.timestamp > start && t.timestamp <= end && t.price.is_finite())
            .collect();
        ticks.sort_by_key(|t| t.timestamp);
        ticks.into_iter().map(|t| t.price).collect()
    }
}

/// Outcome class of one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClass {
    Long,
    Short,
    NoTrade,
}

impl std::fmt::Display for SignalClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalClass::Long => write!(f, "LONG"),
            SignalClass::Short => write!(f, "SHORT"),
            SignalClass::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}

/// Why a cycle ended in `NO_TRADE`. Variants are listed in the order the
/// decision chain checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTradeReason {
    InsufficientData,
    RiskFilter,
    DegenerateVolatility,
    CorrelationUnavailable,
    WeakCorrelation,
    BelowThreshold,
    InconsistentDirection,
    SecondaryInstability,
}

impl NoTradeReason {
    /// Stable machine-readable code, identical to the serde representation.
    pub fn code(self) -> &'static str {
        match self {
            NoTradeReason::InsufficientData => "insufficient_data",
            NoTradeReason::RiskFilter => "risk_filter",
            NoTradeReason::DegenerateVolatility => "degenerate_volatility",
            NoTradeReason::CorrelationUnavailable => "correlation_unavailable",
            NoTradeReason::WeakCorrelation => "weak_correlation",
            NoTradeReason::BelowThreshold => "below_threshold",
            NoTradeReason::InconsistentDirection => "inconsistent_direction",
            NoTradeReason::SecondaryInstability => "secondary_instability",
        }
    }
}

impl std::fmt::Display for NoTradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoTradeReason::InsufficientData => write!(f, "insufficient data"),
            NoTradeReason::RiskFilter => write!(f, "risk filter"),
            NoTradeReason::DegenerateVolatility => write!(f, "historical volatility is zero or undefined"),
            NoTradeReason::CorrelationUnavailable => write!(f, "correlation could not be computed"),
            NoTradeReason::WeakCorrelation => write!(f, "correlation too weak"),
            NoTradeReason::BelowThreshold => write!(f, "move below z-score threshold"),
            NoTradeReason::InconsistentDirection => write!(f, "recent direction inconsistent"),
            NoTradeReason::SecondaryInstability => write!(f, "secondary instrument unstable"),
        }
    }
}

/// Feature values that produced a decision. Fields the chain never reached
/// stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Latest daily return of the primary instrument, as a fraction.
    pub current_return: Option<f64>,
    pub zscore: Option<f64>,
    /// Sample std of the returns preceding `current_return`.
    pub historical_std: Option<f64>,
    pub correlation: Option<f64>,
    pub auxiliary: AuxiliarySnapshot,
}

/// One decision instance. Created once per cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub class: SignalClass,
    /// In `[0, 1]`; always `0.0` for `NO_TRADE`.
    pub confidence: f64,
    pub reason: Option<NoTradeReason>,
    pub features: FeatureSnapshot,
}

impl Signal {
    pub fn trade(
        class: SignalClass,
        confidence: f64,
        features: FeatureSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            class,
            confidence: confidence.clamp(0.0, 1.0),
            reason: None,
            features,
        }
    }

    pub fn no_trade(
        reason: NoTradeReason,
        features: FeatureSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            class: SignalClass::NoTrade,
            confidence: 0.0,
            reason: Some(reason),
            features,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.class != SignalClass::NoTrade
    }
}
