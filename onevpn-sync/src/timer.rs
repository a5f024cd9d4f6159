//! Owned handle for the poll interval.

use std::future;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// The single repeating poll timer.
///
/// Holds at most one [`Interval`]; [`PollTimer::start`] drops the previous
/// one before creating a new one, so restarting never stacks timers.
#[derive(Debug)]
pub struct PollTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl PollTimer {
    /// Creates a stopped timer.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            interval: None,
        }
    }

    /// Poll period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer is running.
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Starts the timer, replacing a running one. The first tick is immediate.
    pub fn start(&mut self) {
        if self.interval.take().is_some() {
            debug!("[SYNC] Replacing running poll timer");
        }
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        debug!("[SYNC] Poll timer started ({:?})", self.period);
    }

    /// Stops the timer. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.interval.take().is_some();
        if was_running {
            debug!("[SYNC] Poll timer stopped");
        }
        was_running
    }

    /// Waits for the next tick. Never resolves while stopped.
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => future::pending().await,
        }
    }
}
