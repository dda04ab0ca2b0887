// src/metrics/recorder.rs
use std::fmt;
use std::time::Duration;

/// Why a session failed before relaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    DialError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::DialError => "dial_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observations emitted by the connection path.
///
/// Implementations must not block and must swallow their own failures: a
/// metric that cannot be recorded never aborts a relay.
pub trait MetricsRecorder: Send + Sync {
    fn active_connections_inc(&self);

    fn active_connections_dec(&self);

    fn set_active_connections(&self, count: i64);

    fn connection_handled(&self);

    fn connection_failed(&self, reason: FailureReason);

    fn observe_connection_duration(&self, duration: Duration);

    fn observe_dial_duration(&self, duration: Duration);

    fn bytes_transferred(&self, bytes: u64);
}

/// Recorder that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn active_connections_inc(&self) {}

    fn active_connections_dec(&self) {}

    fn set_active_connections(&self, _count: i64) {}

    fn connection_handled(&self) {}

    fn connection_failed(&self, _reason: FailureReason) {}

    fn observe_connection_duration(&self, _duration: Duration) {}

    fn observe_dial_duration(&self, _duration: Duration) {}

    fn bytes_transferred(&self, _bytes: u64) {}
}
