//! Periodic task scheduler for hsm.
//!
//! Two layers:
//!
//! - [`TickScheduler`]: a fixed-interval clock. `wait_for_tick` resolves
//!   once per interval; ticks missed while the caller was busy are dropped.
//! - [`PeriodicTask`]: a background Tokio task that drives a
//!   `TickScheduler` and runs a job on every tick until it is shut down.
//!
//! A tick is never re-entered: the job for tick N finishes before the
//! scheduler is asked for tick N + 1, so a slow job only delays the next
//! check.
//!
//! # Integration
//!
//! The session cache's background refresh is one `PeriodicTask`:
//!
//! ```ignore
//! let task = PeriodicTask::spawn("session-refresh", TickConfig::every(Duration::from_secs(60)), move |_tick| {
//!     let cache = cache.clone();
//!     async move { cache.refresh_if_needed().await; }
//! });
//! // ...
//! task.shutdown(Duration::from_secs(10)).await;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Full configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl TickConfig {
    /// Shortest interval the scheduler accepts.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// A config ticking every `interval`.
    pub fn every(interval: Duration) -> Self {
        Self { interval }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`TickScheduler::new`]. A zero interval
    /// would spin, so it is raised to [`Self::MIN_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval tick scheduler.
///
/// Ticks land on the grid `start + k * interval`. When the caller was busy
/// past one or more deadlines, the missed ticks are dropped rather than
/// fired back to back.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    /// When the next tick should fire (Tokio instant for `sleep_until`).
    next_tick: Instant,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let next_tick = Instant::now() + config.interval;

        debug!(
            interval_ms = config.interval.as_millis() as u64,
            "tick scheduler created"
        );

        Self {
            config,
            tick_count: 0,
            next_tick,
        }
    }

    /// Wait until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let deadline = self.next_tick;
        time::sleep_until(deadline).await;

        let now = Instant::now();
        let interval = self.config.interval;
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(deadline);
        let skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
        let steps = u32::try_from(skipped + 1).unwrap_or(u32::MAX);
        self.next_tick = deadline + interval * steps;

        if skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }
        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
        }
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

// ---------------------------------------------------------------------------
// Periodic task
// ---------------------------------------------------------------------------

/// A background task running a job once per tick.
///
/// Started with [`PeriodicTask::spawn`], stopped with
/// [`PeriodicTask::shutdown`]. Dropping the handle cancels the loop
/// without waiting for it.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `job` onto the Tokio runtime, called once per tick.
    ///
    /// Cancellation is only observed between ticks: a job that is already
    /// running finishes before the loop exits, and no job starts once the
    /// task has been cancelled.
    pub fn spawn<F, Fut>(name: &'static str, config: TickConfig, mut job: F) -> Self
    where
        F: FnMut(TickInfo) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut scheduler = TickScheduler::new(config);

        let handle = tokio::spawn(async move {
            debug!(task = name, "periodic task started");
            loop {
                let info = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    info = scheduler.wait_for_tick() => info,
                };
                job(info).await;
                if token.is_cancelled() {
                    break;
                }
            }
            debug!(task = name, ticks = scheduler.tick_count(), "periodic task stopped");
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait up to `timeout` for it to exit.
    ///
    /// Returns `true` if the task observably stopped in time. On timeout
    /// the task is aborted and `false` is returned.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return true;
        };

        match time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                debug!(task = self.name, "periodic task shut down");
                true
            }
            Ok(Err(e)) => {
                warn!(task = self.name, error = %e, "periodic task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    task = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "periodic task did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
