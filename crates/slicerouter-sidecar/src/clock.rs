//! Time gate for the reconciliation pass.

use std::time::Duration;

use tokio::time::Instant;

/// Remembers when reconciliation last ran.
///
/// The gate is purely time-based: a pass is due once `interval` has elapsed
/// since the last attempt, however many callers arrive in between.
#[derive(Debug, Clone)]
pub struct ReconcileClock {
    interval: Duration,
    last: Instant,
}

impl ReconcileClock {
    /// Starts the clock at now, so the first pass is one interval away.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn since_last(&self) -> Duration {
        self.last.elapsed()
    }

    pub fn is_due(&self) -> bool {
        self.since_last() >= self.interval
    }

    /// Records an attempt at now, whatever its outcome.
    pub fn mark(&mut self) {
        self.last = Instant::now();
    }
}
