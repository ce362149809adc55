//! Tick scheduling on a monotonic clock with explicit cancellation.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulePolicy {
    /// Next tick starts `interval` after the previous one finished; tick latency adds drift.
    #[default]
    FixedDelay,
    /// Next tick starts `interval` after the previous one started. An overrunning tick
    /// is followed immediately by the next one, with no catch-up burst.
    FixedRate,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    policy: SchedulePolicy,
}

impl Scheduler {
    pub fn new(interval: Duration, policy: SchedulePolicy) -> Self {
        Self { interval, policy }
    }

    pub fn next_deadline(&self, started: Instant, finished: Instant) -> Instant {
        match self.policy {
            SchedulePolicy::FixedDelay => finished + self.interval,
            SchedulePolicy::FixedRate => started + self.interval,
        }
    }

    /// Run `tick` once now and then once per interval until `cancel` fires.
    ///
    /// Ticks never overlap. Cancellation is only observed between ticks, so a tick in
    /// flight always completes. The first error a tick returns stops the loop.
    /// Returns the number of ticks that completed successfully.
    pub async fn run<F, Fut, E>(&self, cancel: &CancellationToken, mut tick: F) -> Result<u64, E>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut completed = 0u64;

        while !cancel.is_cancelled() {
            let started = Instant::now();
            tick(completed + 1).await?;
            completed += 1;

            let finished = Instant::now();
            let deadline = self.next_deadline(started, finished);
            if deadline <= finished {
                warn!(
                    took_ms = finished.duration_since(started).as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "tick overran the sampling interval"
                );
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }
        }

        debug!(completed, "scheduler stopped");
        Ok(completed)
    }
}
