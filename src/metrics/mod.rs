// src/metrics/mod.rs
mod collector;
mod recorder;

pub use collector::{MetricsCollector, MetricsRegistry, Timer};
pub use recorder::{FailureReason, MetricsRecorder, NoopRecorder};
