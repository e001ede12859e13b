//! Scoped timing for long-running phases.
//!
//! Observability only: a phase logs its start and, on success, its duration
//! in h:m:s. The explicit [`std::time::Duration`] return keeps callers
//! independent of the logging facility.

use std::time::{Duration, Instant};

/// A started phase; call [`finish`](TimedPhase::finish) when it completes.
pub struct TimedPhase {
    label: String,
    start: Instant,
}

impl TimedPhase {
    /// Start timing and log the phase start.
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        tracing::info!("{label}");
        Self { label, start: Instant::now() }
    }

    /// Log the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::info!("finished {} with runtime {} (h:m:s)", self.label, format_hms(elapsed));
        elapsed
    }
}

/// Format a duration as `HH:MM:SS`, truncating sub-second precision.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
