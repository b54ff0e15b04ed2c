use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use toml::Table;

use super::decode::{decode_rules, decode_settings};
use super::{ConfigError, Loaded, RuleSet, Settings};

const SETTINGS_FILE: &str = "config.toml";
const RULES_FILE: &str = "rules.toml";
const BACKUP_MARKER: &str = ".broken-";
const BACKUP_STAMP: &str = "%Y%m%d-%H%M%S";
const BACKUP_MAX_COUNT: usize = 10;
const BACKUP_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Returns the config directory: `~/.config/adfence/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("adfence"))
}

/// Returns the settings file path: `~/.config/adfence/config.toml`.
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(SETTINGS_FILE))
}

/// Returns the rules file path: `~/.config/adfence/rules.toml`.
pub fn rules_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(RULES_FILE))
}

/// Loads `config.toml`, falling back to defaults.
pub fn load_settings() -> Loaded<Settings> {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => no_config_dir(Settings::default()),
    }
}

/// Loads `rules.toml`, falling back to defaults.
pub fn load_rules() -> Loaded<RuleSet> {
    match rules_path() {
        Some(path) => load_rules_from(&path),
        None => no_config_dir(RuleSet::default()),
    }
}

pub fn load_settings_from(path: &Path) -> Loaded<Settings> {
    load_from(path, decode_settings, Settings::repair)
}

pub fn load_rules_from(path: &Path) -> Loaded<RuleSet> {
    load_from(path, decode_rules, RuleSet::repair)
}

fn no_config_dir<T>(value: T) -> Loaded<T> {
    Loaded {
        value,
        warnings: vec![ConfigError::NoConfigDir.to_string()],
    }
}

/// Reads, decodes and repairs a config file.
///
/// - missing file: defaults, no warning
/// - unreadable file: defaults, warning
/// - malformed TOML: file backed up as `<name>.broken-<stamp>`, defaults,
///   warning
/// - bad individual values: that value defaulted, warning
///
/// Every warning is prefixed with the file name.
fn load_from<T: Default>(
    path: &Path,
    decode: fn(&Table, &mut Vec<String>) -> T,
    repair: fn(&mut T) -> Vec<String>,
) -> Loaded<T> {
    let name = file_label(path);
    let mut warnings = Vec::new();

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Loaded {
                value: T::default(),
                warnings,
            };
        }
        Err(e) => {
            let err = ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            };
            warnings.push(format!("{err}; using defaults"));
            return Loaded {
                value: T::default(),
                warnings,
            };
        }
    };

    let table: Table = match content.parse() {
        Ok(t) => t,
        Err(e) => {
            let err = ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            };
            let backup = match backup_broken(path) {
                Ok(b) => format!("backed up to {}", b.display()),
                Err(be) => format!("backup failed: {be}"),
            };
            warnings.push(format!("{err}; {backup}; using defaults"));
            prune_backups(path, SystemTime::now());
            return Loaded {
                value: T::default(),
                warnings,
            };
        }
    };

    let mut field_warnings = Vec::new();
    let mut value = decode(&table, &mut field_warnings);
    field_warnings.extend(repair(&mut value));
    warnings.extend(field_warnings.into_iter().map(|w| format!("{name}: {w}")));

    Loaded { value, warnings }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Copies a malformed file aside so the user can recover their edits.
fn backup_broken(path: &Path) -> Result<PathBuf, ConfigError> {
    let stamp = Local::now().format(BACKUP_STAMP).to_string();
    let base = format!("{}{BACKUP_MARKER}{stamp}", file_label(path));
    let mut backup = path.with_file_name(&base);
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{base}-{n}"));
        n += 1;
    }
    fs::copy(path, &backup).map_err(|e| ConfigError::Io {
        path: backup.clone(),
        source: e,
    })?;
    Ok(backup)
}

/// Deletes backups older than 30 days, then all but the newest ten.
///
/// Backups whose stamp cannot be parsed are left alone.
pub(super) fn prune_backups(path: &Path, now: SystemTime) {
    let Some(dir) = path.parent() else {
        return;
    };
    let prefix = format!("{}{BACKUP_MARKER}", file_label(path));
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut backups: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let stamp = name.strip_prefix(&prefix)?;
            Some((backup_time(stamp)?, entry.path()))
        })
        .collect();

    backups.retain(|(time, p)| {
        let expired = now.duration_since(*time).unwrap_or_default() > BACKUP_MAX_AGE;
        if expired {
            let _ = fs::remove_file(p);
        }
        !expired
    });

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, p) in backups.iter().skip(BACKUP_MAX_COUNT) {
        let _ = fs::remove_file(p);
    }
}

/// Parses the `YYYYmmdd-HHMMSS` stamp (ignoring any `-n` suffix).
fn backup_time(stamp: &str) -> Option<SystemTime> {
    let head = stamp.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(head, BACKUP_STAMP).ok()?;
    let local = naive.and_local_timezone(Local).earliest()?;
    Some(SystemTime::from(local))
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    save_to(path, settings)
}

pub fn save_rules_to(path: &Path, rules: &RuleSet) -> Result<(), ConfigError> {
    save_to(path, rules)
}

fn save_to<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(value)?;
    atomic_write(path, &content)
}

/// Writes through a temp file in the same directory, then renames over the
/// target. On failure the temp file is removed and the target is untouched.
fn atomic_write(path: &Path, content: &str) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_label(path), std::process::id()));

    let written = fs::File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(content.as_bytes())?;
            f.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(path)(e));
    }
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

/// Writes default `config.toml` and `rules.toml`, skipping files that
/// already exist. Returns the paths that were written.
pub fn write_defaults() -> Result<Vec<PathBuf>, ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    write_defaults_in(&dir)
}

pub(super) fn write_defaults_in(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut written = Vec::new();
    let settings = dir.join(SETTINGS_FILE);
    if !settings.exists() {
        save_settings_to(&settings, &Settings::default())?;
        written.push(settings);
    }
    let rules = dir.join(RULES_FILE);
    if !rules.exists() {
        save_rules_to(&rules, &RuleSet::default())?;
        written.push(rules);
    }
    Ok(written)
}
