use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, MarketSnapshot, Result};
use strategy::{SignalConfig, SignalEvent, SignalPipeline};

fn load_snapshot(path: &str) -> Result<MarketSnapshot> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Read the snapshot file fresh and run one cycle. Failures are logged and
/// the next cycle starts from scratch.
fn run_cycle(pipeline: &SignalPipeline, snapshot_path: &str) {
    let snapshot = match load_snapshot(snapshot_path) {
        Ok(s) => s,
        Err(e) => {
            error!(path = %snapshot_path, "Failed to load snapshot: {e}");
            return;
        }
    };

    match pipeline.evaluate(&snapshot, Utc::now()) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize cycle report: {e}"),
        },
        Err(e) => error!("Cycle aborted: {e}"),
    }
}

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(environment = %cfg.environment, "orebridge starting");

    let signal_cfg = SignalConfig::load(&cfg.signal_config_path).unwrap_or_else(|e| {
        panic!("Invalid signal config at '{}': {e}", cfg.signal_config_path)
    });
    info!(
        primary = %signal_cfg.primary_key,
        equity = %signal_cfg.equity_key,
        window = signal_cfg.window,
        threshold = signal_cfg.zscore_threshold,
        "Signal parameters loaded"
    );

    // ── Outbound notifications (fire-and-forget consumer) ─────────────────────
    let (event_tx, mut event_rx) = mpsc::channel::<SignalEvent>(cfg.outbound_capacity);
    let notifier = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if event.signal.is_trade() {
                info!(id = %event.signal.id, "Signal alert:\n{}", event.alert_text());
            } else {
                debug!(id = %event.signal.id, "No-trade cycle:\n{}", event.alert_text());
            }
        }
    });

    let pipeline = SignalPipeline::new(signal_cfg).with_outbound(event_tx);

    // ── Evaluation ────────────────────────────────────────────────────────────
    match cfg.eval_interval_secs {
        None => run_cycle(&pipeline, &cfg.snapshot_path),
        Some(secs) => {
            info!(interval_secs = secs, "Evaluating periodically. Waiting for shutdown signal.");
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_cycle(&pipeline, &cfg.snapshot_path),
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received.");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the pipeline closes the channel so the notifier drains and exits.
    drop(pipeline);
    if let Err(e) = notifier.await {
        warn!("Notifier task ended abnormally: {e}");
    }
    info!("Exiting.");
}
