//! Fixed-period tick clock.
//!
//! Drives the repeating tasks of a [`Scheduler`](crate::Scheduler): the
//! caller awaits [`TickClock::wait_for_tick`], runs its work, then reports
//! back with [`TickClock::record_tick_end`] so slow work can be noticed.
//! A tick that fires late skips ahead instead of bunching up.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{trace, warn};

/// Configuration for a [`TickClock`].
#[derive(Debug, Clone)]
pub(crate) struct TickConfig {
    /// Time between ticks. `None` means the clock never fires.
    pub period: Option<Duration>,
    /// Delay before the first tick.
    pub initial_delay: Duration,
    /// Fraction of the period (0.0 to 1.0) a tick's work may take before a
    /// warning is logged.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: None,
            initial_delay: Duration::ZERO,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// A clock ticking every `period`, first tick after `initial_delay`.
    pub fn every(period: Duration, initial_delay: Duration) -> Self {
        Self {
            period: Some(period),
            initial_delay,
            ..Default::default()
        }
    }

    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - A zero period would spin; it is treated as "never fires".
    /// - The budget threshold is clamped to `0.0..=1.0`.
    pub fn validated(mut self) -> Self {
        if self.period == Some(Duration::ZERO) {
            warn!("tick period of zero, clock disabled");
            self.period = None;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

/// Fixed-period tick clock.
pub(crate) struct TickClock {
    config: TickConfig,
    tick_count: u64,
    next_tick: Option<Instant>,
    tick_start: Option<Instant>,
}

impl TickClock {
    /// Create a clock from config. The first tick is due after
    /// `initial_delay`.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let next_tick = config
            .period
            .map(|_| Instant::now() + config.initial_delay);

        Self {
            config,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// Wait until the next tick is due and return its number (from 1).
    ///
    /// For a clock without a period this future pends forever.
    pub async fn wait_for_tick(&mut self) -> u64 {
        let (next, period) = match (self.next_tick, self.config.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let late_by = now.saturating_duration_since(next);
        let skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if late_by > period / 10 && skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, "tick fired");
        self.tick_count
    }

    /// Record that the work for the current tick has finished.
    pub fn record_tick_end(&mut self) {
        let (Some(start), Some(period)) = (self.tick_start.take(), self.config.period) else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = period.as_secs_f64() * 1000.0,
                "scheduled task is taking most of its period"
            );
        }
    }
}
