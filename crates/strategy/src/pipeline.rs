use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use common::{Error, MarketSnapshot, Result, Signal, SignalClass};
use features::{align, validate_alignment, AlignMethod, AlignmentDiagnostics};

use crate::config::SignalConfig;
use crate::engine::{DecisionEngine, DecisionInput};

/// Emitted on the outbound channel after every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SignalEvent {
    pub signal: Signal,
    pub primary_key: String,
    pub equity_key: String,
}

impl SignalEvent {
    /// Short human-readable alert for chat-style notifiers.
    pub fn alert_text(&self) -> String {
        let emoji = match self.signal.class {
            SignalClass::Long => "🟢",
            SignalClass::Short => "🔴",
            SignalClass::NoTrade => "⚪",
        };
        let zscore = self
            .signal
            .features
            .zscore
            .map_or_else(|| "n/a".to_string(), |z| format!("{z:.2}"));
        let mut text = format!(
            "{emoji} {} {} on {} move\nConfidence: {:.1}%\nZ-score ({}): {zscore}",
            self.signal.class,
            self.equity_key,
            self.primary_key,
            self.signal.confidence * 100.0,
            self.primary_key,
        );
        if let Some(reason) = self.signal.reason {
            text.push_str(&format!("\nReason: {reason}"));
        }
        text
    }
}

/// Result of one cycle handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub signal: Signal,
    pub diagnostics: AlignmentDiagnostics,
}

/// Align → features → decision, for one snapshot at a time.
///
/// Holds no state between cycles. Events go out through an optional
/// bounded channel with `try_send`; a slow or missing consumer never holds
/// up evaluation.
pub struct SignalPipeline {
    engine: DecisionEngine,
    outbound: Option<mpsc::Sender<SignalEvent>>,
}

impl SignalPipeline {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            engine: DecisionEngine::new(config),
            outbound: None,
        }
    }

    pub fn with_outbound(mut self, outbound: mpsc::Sender<SignalEvent>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn config(&self) -> &SignalConfig {
        self.engine.config()
    }

    /// Evaluate the snapshot as of `as_of`. Daily rows dated after `as_of`
    /// are ignored. Only configuration problems (an unknown series key, a
    /// malformed snapshot) are errors.
    pub fn evaluate(&self, snapshot: &MarketSnapshot, as_of: DateTime<Utc>) -> Result<CycleReport> {
        let cfg = self.engine.config();
        if !snapshot.series.contains_key(&cfg.primary_key) {
            return Err(Error::config(format!(
                "snapshot has no '{}' series",
                cfg.primary_key
            )));
        }

        let table = align(
            &snapshot.series,
            AlignMethod::ForwardFill,
            &cfg.equity_key,
            cfg.max_gap_days,
        )?
        .until(as_of.date_naive());
        let diagnostics = validate_alignment(&table);
        debug!(
            rows = diagnostics.total_rows,
            gaps = diagnostics.date_gaps,
            "Aligned snapshot"
        );
        if diagnostics.date_gaps > 0 {
            warn!(gaps = diagnostics.date_gaps, "Aligned calendar has unusually long gaps");
        }

        let (_, primary, secondary) = table.dense_pair(&cfg.primary_key, &cfg.equity_key)?;
        let rows = primary.len();

        let lookback = Duration::hours(i64::from(cfg.direction_lookback_hours));
        let recent = snapshot.intraday_between(as_of - lookback, as_of);

        let input = DecisionInput {
            primary: &primary,
            secondary: &secondary,
            recent: &recent,
            auxiliary: &snapshot.auxiliary,
        };
        let signal = self.engine.evaluate(&input, as_of);

        info!(
            id = %signal.id,
            class = %signal.class,
            confidence = signal.confidence,
            reason = signal.reason.map(|r| r.code()).unwrap_or("none"),
            rows,
            "Signal evaluated"
        );

        self.emit(&signal);
        Ok(CycleReport { signal, diagnostics })
    }

    fn emit(&self, signal: &Signal) {
        let Some(tx) = &self.outbound else {
            return;
        };
        let cfg = self.engine.config();
        let event = SignalEvent {
            signal: signal.clone(),
            primary_key: cfg.primary_key.clone(),
            equity_key: cfg.equity_key.clone(),
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(id = %event.signal.id, "Outbound channel full, signal event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(id = %event.signal.id, "Outbound channel closed, signal event dropped");
            }
        }
    }
}
