use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use adfence_core::{config, pid};

pub fn execute() {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Item"), Cell::new("Value")]);

    table.add_row(vec![Cell::new("Blocker"), Cell::new(blocker_status())]);
    table.add_row(vec![Cell::new("Autostart"), Cell::new(autostart_status())]);

    let settings = config::load_settings();
    let s = &settings.value;
    table.add_row(vec![Cell::new("Target"), Cell::new(&s.target_process)]);
    table.add_row(vec![Cell::new("Enabled"), Cell::new(s.enabled)]);
    table.add_row(vec![Cell::new("Aggressive mode"), Cell::new(s.aggressive_mode)]);
    for (label, path) in [
        ("config.toml", config::settings_path()),
        ("rules.toml", config::rules_path()),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(describe(path.as_deref()))]);
    }

    println!("{table}");
    for warning in &settings.warnings {
        println!("Warning: {warning}");
    }
}

fn describe(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) if p.exists() => p.display().to_string(),
        Some(p) => format!("{} (missing, using defaults)", p.display()),
        None => "unknown home directory".into(),
    }
}

/// Checks the PID file, cleaning it up if its process is gone.
#[cfg(windows)]
fn blocker_status() -> String {
    match pid::read_pid_file() {
        Ok(Some(pid)) if adfence_windows::process::is_process_alive(pid) => {
            format!("running (PID: {pid})")
        }
        Ok(Some(_)) => {
            let _ = pid::remove_pid_file();
            "not running (cleaned up stale PID file)".into()
        }
        Ok(None) => "not running".into(),
        Err(e) => format!("unknown ({e})"),
    }
}

#[cfg(not(windows))]
fn blocker_status() -> String {
    match pid::read_pid_file() {
        Ok(Some(pid)) => format!("PID file present ({pid}), liveness unknown on this platform"),
        Ok(None) => "not running".into(),
        Err(e) => format!("unknown ({e})"),
    }
}

#[cfg(windows)]
fn autostart_status() -> &'static str {
    if adfence_windows::autostart::is_enabled() {
        "enabled"
    } else {
        "disabled"
    }
}

#[cfg(not(windows))]
fn autostart_status() -> &'static str {
    "unsupported on this platform"
}
