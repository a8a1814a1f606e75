//! Fixed-period scheduler for Duelnet.
//!
//! The reliability layer re-examines its pending table on a fixed period
//! rather than arming one timer per message. [`TickScheduler`] provides
//! that period. A late wake-up skips the missed ticks instead of firing a
//! burst of them.
//!
//! The scheduler sits inside a task's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = cancel.cancelled() => break,
//!         _ = scheduler.wait_for_tick() => link.sweep().await,
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tick scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Time between ticks.
    pub period: Duration,
    /// Upper bound on random delay added to the *first* tick, so two
    /// peers started together do not sweep in lockstep.
    pub initial_jitter: Duration,
}

impl TickConfig {
    /// Shortest period accepted. Anything below this is raised.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A config with the given period and up to 2ms of first-tick jitter.
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            initial_jitter: Duration::from_millis(2),
        }
    }

    /// Raises a period below [`Self::MIN_PERIOD`]. Called by
    /// [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_us = self.period.as_micros() as u64,
                "tick period below minimum, raising"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// `true` if the tick fired more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods skipped because of the overrun.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-period tick scheduler. One per background loop.
pub struct TickScheduler {
    period: Duration,
    tick_count: u64,
    next_tick: Instant,
}

impl TickScheduler {
    /// Creates a scheduler. The first tick is due one period from now,
    /// plus a random share of `initial_jitter`.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();

        let jitter_us = config.initial_jitter.as_micros() as u64;
        let jitter = if jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..jitter_us))
        } else {
            Duration::ZERO
        };

        debug!(
            period_ms = config.period.as_secs_f64() * 1000.0,
            jitter_us = jitter.as_micros() as u64,
            "tick scheduler created"
        );

        Self {
            period: config.period,
            tick_count: 0,
            next_tick: Instant::now() + config.period + jitter,
        }
    }

    /// Waits until the next tick is due.
    ///
    /// After an overrun the next tick is scheduled one period from the
    /// late wake-up, and the missed ticks are reported as skipped.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.next_tick).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(self.next_tick);
        let overrun = late_by > self.period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / self.period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = now + self.period;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
