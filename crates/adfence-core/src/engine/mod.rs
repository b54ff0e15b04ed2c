//! The polling engine.
//!
//! One worker thread runs scan → classify → apply ticks. Everything else
//! talks to it through [`Engine`]'s control methods, which queue a command
//! and wake the worker (or run it inline when no worker is running).

mod state;
mod tick;

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{RuleSet, Settings};
use crate::ledger::{Ledger, RestoreReport};
use crate::scheduler::{ActivityTracker, Throttle, next_interval};
use crate::{IdentityCache, ProcessResolver, WindowProvider};

pub use state::EngineState;
use state::RateLimiter;

/// Locks `mutex`, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Control requests handed to the worker.
#[derive(Debug, Clone)]
enum Command {
    SetEnabled(bool),
    SetAggressive(bool),
    ResetRestoreFailures,
    ReloadRules(Box<RuleSet>),
    ReloadSettings(Box<Settings>),
    NotifyActivity,
}

#[derive(Debug, Default)]
struct Queue {
    pending: VecDeque<Command>,
    stop: bool,
    /// Bumped by every `start`; a worker only serves its own generation.
    generation: u64,
}

/// Rules and settings in effect. Replaced wholesale on reload.
#[derive(Debug, Clone)]
struct Config {
    rules: Arc<RuleSet>,
    settings: Arc<Settings>,
}

/// Bookkeeping owned by whoever is running a tick.
struct LoopState {
    tracker: ActivityTracker,
    pid_scan: Throttle,
    sweep: Throttle,
    pids: BTreeSet<u32>,
}

struct Inner {
    provider: Arc<dyn WindowProvider>,
    resolver: Arc<dyn ProcessResolver>,
    config: Mutex<Config>,
    state: Mutex<EngineState>,
    errors: RateLimiter,
    cache: IdentityCache,
    ledger: Ledger,
    queue: Mutex<Queue>,
    wake: Condvar,
    looping: Mutex<LoopState>,
    /// Newest worker generation that has left its loop.
    exited: Mutex<u64>,
    exited_cv: Condvar,
}

/// Handle to the ad-blocking engine.
///
/// All methods take `&self` and may be called from any thread.
pub struct Engine {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn WindowProvider>,
        resolver: Arc<dyn ProcessResolver>,
        settings: Settings,
        rules: RuleSet,
    ) -> Self {
        let now = Instant::now();
        let state = EngineState {
            enabled: settings.enabled,
            aggressive_mode: settings.aggressive_mode,
            ..Default::default()
        };
        let looping = LoopState {
            tracker: ActivityTracker::new(now),
            pid_scan: Throttle::new(settings.timing.pid_scan()),
            sweep: Throttle::new(settings.timing.cache_sweep()),
            pids: BTreeSet::new(),
        };
        let inner = Inner {
            provider,
            resolver,
            config: Mutex::new(Config {
                rules: Arc::new(rules),
                settings: Arc::new(settings),
            }),
            state: Mutex::new(state),
            errors: RateLimiter::default(),
            cache: IdentityCache::new(),
            ledger: Ledger::new(),
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            looping: Mutex::new(looping),
            exited: Mutex::new(0),
            exited_cv: Condvar::new(),
        };
        Self {
            inner: Arc::new(inner),
            worker: Mutex::new(None),
        }
    }

    /// Runs one warm-up tick on the calling thread, then starts the worker.
    ///
    /// An ad window present at start is therefore hidden before `start`
    /// returns. Does nothing if already running.
    pub fn start(&self) -> std::io::Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        let generation = {
            let mut queue = lock(&self.inner.queue);
            queue.stop = false;
            queue.generation += 1;
            queue.generation
        };

        {
            let timing = self.inner.settings().timing.clone();
            let mut looping = lock(&self.inner.looping);
            looping.pid_scan.set_interval(timing.pid_scan());
            looping.sweep.set_interval(timing.cache_sweep());
            looping.tracker.touch(Instant::now());
            self.inner.tick(&mut looping);
        }

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("adfence-engine".into())
            .spawn(move || inner.run(generation))?;
        *worker = Some(handle);
        lock(&self.inner.state).running = true;
        log::info!("engine started");
        Ok(())
    }

    /// Stops the worker and restores every hidden window.
    ///
    /// Waits up to `timing.stop_timeout_ms` for the worker to finish its
    /// tick. A worker that does not finish in time is detached and a
    /// warning is recorded; restoration happens either way.
    pub fn stop(&self) {
        let worker = lock(&self.worker).take();
        if let Some(handle) = worker {
            let generation = {
                let mut queue = lock(&self.inner.queue);
                queue.stop = true;
                queue.generation
            };
            self.inner.wake.notify_all();

            let timeout = self.inner.settings().timing.stop_timeout();
            let (_exited, wait) = self
                .inner
                .exited_cv
                .wait_timeout_while(lock(&self.inner.exited), timeout, |done| *done < generation)
                .unwrap_or_else(PoisonError::into_inner);
            if wait.timed_out() {
                self.inner.report_warning(format!(
                    "engine worker did not stop within {}ms; detaching it",
                    timeout.as_millis()
                ));
            } else if handle.join().is_err() {
                self.inner.report_warning("engine worker panicked".into());
            }
        }

        // A detached worker may still hold the loop lock, so restore
        // without it.
        let report = self.inner.ledger.restore_all(self.inner.provider.as_ref());
        self.inner.record_restore(&report);
        lock(&self.inner.state).running = false;
        log::info!("engine stopped");
    }

    /// Turns ad blocking on or off. Turning it off restores hidden windows;
    /// polling continues either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    pub fn set_aggressive_mode(&self, aggressive: bool) {
        self.send(Command::SetAggressive(aggressive));
    }

    /// Clears the restore failure counters. Unless blocking is active,
    /// also forgets the records that could not be restored.
    pub fn reset_restore_failures(&self) {
        self.send(Command::ResetRestoreFailures);
    }

    /// Records a warning from outside the engine (config loading, the
    /// process resolver, ...). Takes only the state lock.
    pub fn report_warning(&self, message: String) {
        self.inner.report_warning(message);
    }

    /// Signals outside activity; the scheduler switches to the active
    /// interval.
    pub fn notify_activity(&self) {
        self.send(Command::NotifyActivity);
    }

    pub fn reload_rules(&self, rules: RuleSet) {
        self.send(Command::ReloadRules(Box::new(rules)));
    }

    pub fn reload_settings(&self, settings: Settings) {
        self.send(Command::ReloadSettings(Box::new(settings)));
    }

    pub fn state(&self) -> EngineState {
        lock(&self.inner.state).clone()
    }

    fn send(&self, command: Command) {
        lock(&self.inner.queue).pending.push_back(command);
        if self.is_running() {
            self.inner.wake.notify_all();
        } else {
            self.inner.drain_inline();
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl Inner {
    fn settings(&self) -> Arc<Settings> {
        Arc::clone(&lock(&self.config).settings)
    }

    fn config(&self) -> Config {
        lock(&self.config).clone()
    }

    fn stop_requested(&self) -> bool {
        lock(&self.queue).stop
    }

    /// Worker loop: sleep for the scheduled interval (or until woken by a
    /// command or stop), then tick.
    fn run(&self, generation: u64) {
        let current = |q: &Queue| !q.stop && q.generation == generation;
        loop {
            let interval = self.schedule();
            {
                let queue = lock(&self.queue);
                let (queue, _) = self
                    .wake
                    .wait_timeout_while(queue, interval, |q| current(&*q) && q.pending.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
                if !current(&*queue) {
                    break;
                }
            }
            let mut looping = lock(&self.looping);
            self.tick(&mut looping);
        }
        let mut exited = lock(&self.exited);
        *exited = (*exited).max(generation);
        drop(exited);
        self.exited_cv.notify_all();
    }

    /// Picks the next sleep and publishes the mode.
    fn schedule(&self) -> Duration {
        let since = lock(&self.looping).tracker.since_activity(Instant::now());
        let (mode, interval) = next_interval(since, &self.settings().timing);
        let mut state = lock(&self.state);
        if state.mode != mode {
            log::debug!("scheduler: {} -> {mode}", state.mode);
            state.mode = mode;
        }
        interval
    }

    /// Applies queued commands on the caller's thread when no worker runs.
    ///
    /// Never waits for the loop state: a worker detached by a timed-out
    /// `stop` may still be holding it.
    fn drain_inline(&self) {
        let applied = match self.looping.try_lock() {
            Ok(mut looping) => self.drain_commands(&mut looping, Instant::now()),
            Err(TryLockError::Poisoned(e)) => self.drain_commands(&mut e.into_inner(), Instant::now()),
            Err(TryLockError::WouldBlock) => {
                let commands = self.take_commands();
                let applied = !commands.is_empty();
                for command in commands {
                    self.apply_command(command, None);
                }
                applied
            }
        };
        if applied {
            self.restore_if_disabled();
        }
    }

    fn take_commands(&self) -> Vec<Command> {
        lock(&self.queue).pending.drain(..).collect()
    }

    /// Applies every queued command. Returns whether any was applied.
    fn drain_commands(&self, looping: &mut LoopState, now: Instant) -> bool {
        let commands = self.take_commands();
        if commands.is_empty() {
            return false;
        }
        for command in commands {
            self.apply_command(command, Some(&mut *looping));
        }
        looping.tracker.touch(now);
        true
    }

    /// `looping` is `None` when the loop state is out of reach; throttle
    /// intervals are then picked up on the next `start`.
    fn apply_command(&self, command: Command, looping: Option<&mut LoopState>) {
        match command {
            Command::SetEnabled(enabled) => {
                self.update_settings(|s| s.enabled = enabled);
                log::info!("blocking {}", if enabled { "enabled" } else { "disabled" });
            }
            Command::SetAggressive(aggressive) => {
                self.update_settings(|s| s.aggressive_mode = aggressive);
                log::info!("aggressive mode {}", if aggressive { "on" } else { "off" });
            }
            Command::ResetRestoreFailures => {
                let blocking = self.settings().enabled && lock(&self.state).running;
                if !blocking {
                    let dropped = self.ledger.reset();
                    if dropped > 0 {
                        log::info!("discarded {dropped} unrestored windows");
                    }
                }
                let remaining = self.ledger.len();
                let mut state = lock(&self.state);
                state.restore_failures = 0;
                state.last_restore_error = None;
                state.hidden_windows = remaining;
            }
            Command::ReloadRules(rules) => {
                lock(&self.config).rules = Arc::new(*rules);
                self.cache.clear();
                log::info!("rules reloaded");
            }
            Command::ReloadSettings(settings) => {
                if let Some(looping) = looping {
                    looping.pid_scan.set_interval(settings.timing.pid_scan());
                    looping.sweep.set_interval(settings.timing.cache_sweep());
                    looping.pid_scan.expire();
                }
                self.update_settings(|s| *s = *settings);
                log::info!("settings reloaded");
            }
            Command::NotifyActivity => {}
        }
    }

    /// Replaces the settings and mirrors the flags into the state.
    fn update_settings(&self, edit: impl FnOnce(&mut Settings)) {
        let settings = {
            let mut config = lock(&self.config);
            let mut settings = (*config.settings).clone();
            edit(&mut settings);
            config.settings = Arc::new(settings);
            Arc::clone(&config.settings)
        };
        let mut state = lock(&self.state);
        state.enabled = settings.enabled;
        state.aggressive_mode = settings.aggressive_mode;
    }

    /// Restores the ledger while blocking is disabled. Records that fail
    /// are retried on every call.
    fn restore_if_disabled(&self) {
        if self.settings().enabled || self.ledger.is_empty() {
            return;
        }
        let report = self.ledger.restore_all(self.provider.as_ref());
        self.record_restore(&report);
    }

    fn record_restore(&self, report: &RestoreReport) {
        if report.restored > 0 || report.discarded > 0 {
            log::info!(
                "restored {} windows, discarded {} stale records",
                report.restored,
                report.discarded
            );
        }
        let remaining = self.ledger.len();
        let mut state = lock(&self.state);
        state.hidden_windows = remaining;
        if report.failed > 0 {
            state.restore_failures += report.failed as u64;
            state.last_restore_error = report.last_error.clone();
            drop(state);
            if let Some(e) = &report.last_error {
                self.report_error(e);
            }
        }
    }

    fn report_warning(&self, message: String) {
        log::warn!("{message}");
        lock(&self.state).last_error = Some(message);
    }

    /// Records an error; repeats of the same message are only logged once
    /// per `log_rate_limit_ms`.
    fn report_error(&self, message: &str) {
        let window = lock(&self.config).rules.log_rate_limit();
        if self.errors.allow(message, Instant::now(), window) {
            log::error!("{message}");
        }
        lock(&self.state).last_error = Some(message.to_owned());
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
