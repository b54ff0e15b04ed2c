use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use crate::scheduler::SchedulerMode;

/// Observable snapshot of the engine, returned by [`super::Engine::state`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub enabled: bool,
    pub aggressive_mode: bool,
    /// Whether the worker thread is running.
    pub running: bool,
    pub mode: SchedulerMode,
    pub last_error: Option<String>,
    pub last_tick: Option<SystemTime>,
    /// Failed restore attempts since the last reset.
    pub restore_failures: u64,
    pub last_restore_error: Option<String>,
    /// Running instances of the target process.
    pub target_process_count: usize,
    pub main_window_count: usize,
    /// Windows currently recorded as hidden.
    pub hidden_windows: usize,
    /// Resize calls issued since start.
    pub resized_total: u64,
    /// Hide calls issued since start.
    pub hidden_total: u64,
}

/// Drops repeats of the same message within a window.
#[derive(Debug, Default)]
pub(crate) struct RateLimiter {
    last_logged: Mutex<HashMap<String, Instant>>,
}

/// Entries older than this many windows are forgotten on the next check.
const FORGET_AFTER: u32 = 10;

impl RateLimiter {
    /// Returns `true` if `message` was not let through within `window`.
    pub(crate) fn allow(&self, message: &str, now: Instant, window: Duration) -> bool {
        let Ok(mut last) = self.last_logged.lock() else {
            return true;
        };
        if let Some(at) = last.get(message)
            && now.saturating_duration_since(*at) < window
        {
            return false;
        }
        let horizon = window * FORGET_AFTER;
        last.retain(|_, at| now.saturating_duration_since(*at) < horizon);
        last.insert(message.to_owned(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_suppressed_within_window() {
        let limiter = RateLimiter::default();
        let t0 = Instant::now();
        let window = Duration::from_secs(5);

        assert!(limiter.allow("boom", t0, window));
        assert!(!limiter.allow("boom", t0 + Duration::from_secs(1), window));
        assert!(limiter.allow("other", t0 + Duration::from_secs(1), window));
        assert!(limiter.allow("boom", t0 + window, window));
    }
}
