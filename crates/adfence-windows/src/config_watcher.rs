//! Watches `config.toml` and `rules.toml` and sends reloads.
//!
//! Uses `FindFirstChangeNotificationW` on the config directory. When it
//! fires, mtimes tell which file changed. Reloads always carry a usable
//! value: a broken file reloads as defaults plus warnings, the same as at
//! startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use adfence_core::config::{self, Loaded, RuleSet, Settings};

use windows::Win32::Foundation::WAIT_OBJECT_0;
use windows::Win32::Storage::FileSystem::{
    FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_WRITE, FindCloseChangeNotification,
    FindFirstChangeNotificationW, FindNextChangeNotification,
};
use windows::Win32::System::Threading::WaitForSingleObject;
use windows::core::HSTRING;

/// Timeout between stop-flag checks when nothing changes (ms).
const WAIT_TIMEOUT_MS: u32 = 5000;

pub enum ConfigReload {
    Settings(Loaded<Settings>),
    Rules(Loaded<RuleSet>),
}

struct Watched {
    path: PathBuf,
    mtime: Option<SystemTime>,
}

impl Watched {
    fn new(path: PathBuf) -> Self {
        let mtime = mtime(&path);
        Self { path, mtime }
    }

    /// Returns `true` once per modification.
    fn changed(&mut self) -> bool {
        let new = mtime(&self.path);
        if new == self.mtime {
            return false;
        }
        self.mtime = new;
        true
    }
}

/// Runs the watcher loop. Blocks until `stop` is set or the receiver is
/// dropped.
pub fn watch(tx: Sender<ConfigReload>, stop: Arc<AtomicBool>) {
    let (Some(dir), Some(settings_path), Some(rules_path)) =
        (config::config_dir(), config::settings_path(), config::rules_path())
    else {
        log::info!("config dir not found, watcher exiting");
        return;
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        log::warn!("cannot create {}: {e}, watcher exiting", dir.display());
        return;
    }

    let mut settings = Watched::new(settings_path);
    let mut rules = Watched::new(rules_path);

    let dir_str = HSTRING::from(dir.as_os_str());
    let flags = FILE_NOTIFY_CHANGE_LAST_WRITE | FILE_NOTIFY_CHANGE_FILE_NAME;

    // SAFETY: dir_str outlives the call; the handle is closed below.
    let Ok(handle) = (unsafe { FindFirstChangeNotificationW(&dir_str, false, flags) }) else {
        log::warn!("FindFirstChangeNotificationW failed, watcher exiting");
        return;
    };

    while !stop.load(Ordering::Relaxed) {
        // SAFETY: handle is a live change-notification handle.
        let result = unsafe { WaitForSingleObject(handle, WAIT_TIMEOUT_MS) };
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if result != WAIT_OBJECT_0 {
            continue;
        }

        if settings.changed() {
            log::info!("config.toml changed, reloading");
            let loaded = config::load_settings_from(&settings.path);
            if tx.send(ConfigReload::Settings(loaded)).is_err() {
                break;
            }
        }
        if rules.changed() {
            log::info!("rules.toml changed, reloading");
            let loaded = config::load_rules_from(&rules.path);
            if tx.send(ConfigReload::Rules(loaded)).is_err() {
                break;
            }
        }

        // SAFETY: re-arms the same handle.
        let _ = unsafe { FindNextChangeNotification(handle) };
    }

    // SAFETY: closes the handle opened above.
    let _ = unsafe { FindCloseChangeNotification(handle) };
}

fn mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().ok().and_then(|m| m.modified().ok())
}
