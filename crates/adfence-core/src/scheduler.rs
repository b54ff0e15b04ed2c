//! Adaptive polling: fast while things change, slow once they settle.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::TimingConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SchedulerMode {
    #[default]
    Active,
    Idle,
}

impl std::fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Idle => f.write_str("idle"),
        }
    }
}

/// Picks the mode and sleep for the next tick.
///
/// Active until a full idle interval has passed without activity.
pub fn next_interval(since_activity: Duration, timing: &TimingConfig) -> (SchedulerMode, Duration) {
    if since_activity < timing.idle() {
        (SchedulerMode::Active, timing.active())
    } else {
        (SchedulerMode::Idle, timing.idle())
    }
}

/// Tracks when the engine last saw activity.
///
/// Activity is a change of the classification fingerprint or anything the
/// engine reports through [`Self::touch`].
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last_activity: Instant,
    fingerprint: Option<u64>,
}

impl ActivityTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            fingerprint: None,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Records this tick's fingerprint; returns whether it changed.
    pub fn observe(&mut self, fingerprint: u64, now: Instant) -> bool {
        let changed = self.fingerprint != Some(fingerprint);
        self.fingerprint = Some(fingerprint);
        if changed {
            self.touch(now);
        }
        changed
    }

    pub fn since_activity(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Gates a periodic chore to its own interval, independent of the tick.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns `true` (and restarts the interval) when the chore is due.
    /// Always due the first time.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Makes the chore due on the next check.
    pub fn expire(&mut self) {
        self.last = None;
    }
}
