//! File-based logger with size-based rotation.
//!
//! Logs are written to `~/.config/adfence/logs/adfence.log`. When the file
//! exceeds the configured max size, it is rotated to `adfence.log.1` (one
//! backup kept). Installed as the `log` crate's global logger, so the rest
//! of the workspace just uses `log::info!` and friends.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};

const LOG_FILE_NAME: &str = "adfence.log";
const BACKUP_SUFFIX: &str = ".1";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether file logging is enabled. Defaults to `true`.
    pub enabled: bool,
    /// Minimum log level: "debug", "info", "warn", or "error".
    pub level: String,
    /// Maximum log file size in megabytes before rotation.
    pub max_file_mb: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".into(),
            max_file_mb: 10,
        }
    }
}

/// Parses a config level string. Unknown values mean `Info`.
pub fn parse_level(s: &str) -> LevelFilter {
    match s.to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

struct RotatingFile {
    file: File,
    path: PathBuf,
    max_bytes: u64,
    written: u64,
}

/// `log::Log` sink that appends to a size-capped file.
pub struct FileLogger {
    level: LevelFilter,
    inner: Mutex<RotatingFile>,
}

impl FileLogger {
    /// Opens (or creates) `adfence.log` inside `dir`.
    pub fn open(dir: &Path, config: &LogConfig) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            level: parse_level(&config.level),
            inner: Mutex::new(RotatingFile {
                file,
                path,
                max_bytes: config.max_file_mb * 1024 * 1024,
                written,
            }),
        })
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Ok(mut sink) = self.inner.lock() else {
            return;
        };
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!(
            "{now} [{lvl}] {target}: {args}\n",
            lvl = record.level(),
            target = record.target(),
            args = record.args()
        );
        let _ = sink.file.write_all(line.as_bytes());
        sink.written += line.len() as u64;

        if sink.max_bytes > 0 && sink.written >= sink.max_bytes {
            sink.rotate();
        }
    }

    fn flush(&self) {
        if let Ok(mut sink) = self.inner.lock() {
            let _ = sink.file.flush();
        }
    }
}

impl RotatingFile {
    fn rotate(&mut self) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(BACKUP_SUFFIX);
        let _ = fs::rename(&self.path, &backup);
        if let Ok(f) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            self.file = f;
        }
        self.written = 0;
    }
}

/// Installs the file logger as the global `log` sink. Call once at startup.
///
/// Does nothing if `config.enabled` is `false`, the config directory is
/// unknown, or a logger is already installed.
pub fn init(config: &LogConfig) {
    if !config.enabled {
        return;
    }
    let Some(dir) = crate::config::config_dir() else {
        return;
    };
    let Ok(logger) = FileLogger::open(&dir.join("logs"), config) else {
        return;
    };
    let level = logger.level;
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level);
    }
}
