pub mod config;
pub mod engine;
pub mod filters;
pub mod pipeline;

pub use config::SignalConfig;
pub use engine::{DecisionEngine, DecisionInput};
pub use pipeline::{CycleReport, SignalEvent, SignalPipeline};
