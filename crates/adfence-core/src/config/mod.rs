mod decode;
mod loader;
pub mod rules;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

pub use loader::{
    config_dir, load_rules, load_rules_from, load_settings, load_settings_from, rules_path,
    save_rules_to, save_settings_to, settings_path, write_defaults,
};
pub use rules::RuleSet;

/// Runtime settings for adfence.
///
/// Loaded from `~/.config/adfence/config.toml`. Missing keys fall back to
/// defaults; invalid values are repaired with a warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether ad blocking is applied. The engine keeps polling either way.
    pub enabled: bool,
    /// Enables the banner geometry and ad-token heuristics.
    pub aggressive_mode: bool,
    /// Executable name of the target application.
    pub target_process: String,
    /// Polling and throttling intervals.
    pub timing: TimingConfig,
    /// File logging.
    pub logging: LogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            aggressive_mode: false,
            target_process: "KakaoTalk.exe".into(),
            timing: TimingConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Scheduler intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Tick interval while classification keeps changing.
    pub active_interval_ms: u64,
    /// Tick interval once nothing has changed for a full idle interval.
    pub idle_interval_ms: u64,
    /// How often the target process list is refreshed.
    pub pid_scan_interval_ms: u64,
    /// How often expired cache entries are swept.
    pub cache_sweep_interval_ms: u64,
    /// How long `stop` waits for the worker before giving up on it.
    pub stop_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            active_interval_ms: 50,
            idle_interval_ms: 300,
            pid_scan_interval_ms: 500,
            cache_sweep_interval_ms: 1000,
            stop_timeout_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn active(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn pid_scan(&self) -> Duration {
        Duration::from_millis(self.pid_scan_interval_ms)
    }

    pub fn cache_sweep(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Settings {
    /// Clamps every interval to its safe range and returns one warning
    /// per correction.
    pub fn repair(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let t = &mut self.timing;
        clamp_ms(&mut t.active_interval_ms, 16, 1000, "timing.active_interval_ms", &mut warnings);
        clamp_ms(&mut t.idle_interval_ms, 200, 5000, "timing.idle_interval_ms", &mut warnings);
        clamp_ms(&mut t.pid_scan_interval_ms, 200, 5000, "timing.pid_scan_interval_ms", &mut warnings);
        clamp_ms(&mut t.cache_sweep_interval_ms, 250, 60_000, "timing.cache_sweep_interval_ms", &mut warnings);
        clamp_ms(&mut t.stop_timeout_ms, 100, 10_000, "timing.stop_timeout_ms", &mut warnings);
        if t.idle_interval_ms < t.active_interval_ms {
            warnings.push(format!(
                "timing.idle_interval_ms ({}) is shorter than timing.active_interval_ms ({}); raised to match",
                t.idle_interval_ms, t.active_interval_ms
            ));
            t.idle_interval_ms = t.active_interval_ms;
        }

        if self.target_process.trim().is_empty() {
            warnings.push("target_process is empty; using the default".into());
            self.target_process = Settings::default().target_process;
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !matches!(level.as_str(), "debug" | "info" | "warn" | "error") {
            warnings.push(format!(
                "logging.level '{}' is not one of debug/info/warn/error; using info",
                self.logging.level
            ));
            self.logging.level = "info".into();
        }
        warnings
    }
}

fn clamp_ms(value: &mut u64, min: u64, max: u64, key: &str, warnings: &mut Vec<String>) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        warnings.push(format!("{key} = {value} is outside {min}..={max}; using {clamped}"));
        *value = clamped;
    }
}

/// A loaded value together with the warnings produced while repairing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

/// Errors raised by configuration persistence.
///
/// Loading never surfaces these: it falls back to defaults and turns them
/// into warnings. Saving returns them.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
