//! Recheck scheduling with exponential backoff.
//!
//! A periodic check runs every `base` interval while it succeeds. Each consecutive
//! failure widens the interval by a factor of 1.5, up to five steps and never beyond
//! `max`; a success resets it.

use std::time::{Duration, Instant};

pub const DEFAULT_BASE: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX: Duration = Duration::from_secs(60);

const GROWTH: f64 = 1.5;
const MAX_STEPS: u32 = 5;

/// How a check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Failed,
}

/// Typed backoff state: interval policy plus the consecutive error count.
#[derive(Debug, Clone, PartialEq)]
pub struct PollBackoff {
    base: Duration,
    max: Duration,
    error_count: u32,
}

impl Default for PollBackoff {
    fn default() -> Self {
        PollBackoff::new(DEFAULT_BASE, DEFAULT_MAX)
    }
}

impl PollBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        PollBackoff { base, max: max.max(base), error_count: 0 }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// `min(base * 1.5^min(errors, 5), max)`
    pub fn interval(&self) -> Duration {
        let steps = self.error_count.min(MAX_STEPS) as i32;
        self.base.mul_f64(GROWTH.powi(steps)).min(self.max)
    }

    pub fn record(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Success => self.error_count = 0,
            CheckOutcome::Failed => self.error_count = self.error_count.saturating_add(1),
        }
    }
}

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// When the next check is due. The first check is due immediately; each completed check
/// schedules the next one an interval later.
#[derive(Debug, Clone)]
pub struct RecheckSchedule {
    backoff: PollBackoff,
    next_due: Instant,
}

impl RecheckSchedule {
    pub fn new<C: Clock + ?Sized>(backoff: PollBackoff, clock: &C) -> Self {
        RecheckSchedule { backoff, next_due: clock.now() }
    }

    pub fn backoff(&self) -> &PollBackoff {
        &self.backoff
    }

    pub fn is_due<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now() >= self.next_due
    }

    pub fn until_due<C: Clock + ?Sized>(&self, clock: &C) -> Duration {
        self.next_due.saturating_duration_since(clock.now())
    }

    /// Record the outcome of the check that just ran and return the wait until the next.
    pub fn complete<C: Clock + ?Sized>(&mut self, outcome: CheckOutcome, clock: &C) -> Duration {
        self.backoff.record(outcome);
        let wait = self.backoff.interval();
        self.next_due = clock.now() + wait;
        wait
    }
}
