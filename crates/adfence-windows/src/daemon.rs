//! Foreground runner behind `adfence run`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use adfence_core::{Engine, EngineState, config, logging, pid};

use crate::config_watcher::{self, ConfigReload};
use crate::process::Win32ProcessResolver;
use crate::{Win32Provider, ctrl_c};

/// How often the main thread checks for config reloads while waiting for
/// Ctrl+C.
const POLL: Duration = Duration::from_millis(250);

/// Runs the blocker until Ctrl+C, then restores every hidden window.
///
/// Config load warnings end up in the engine's `last_error` as well as the
/// log.
pub fn run() -> io::Result<()> {
    let settings = config::load_settings();
    let rules = config::load_rules();
    logging::init(&settings.value.logging);

    pid::write_pid_file()?;
    let result = serve(settings, rules);
    let _ = pid::remove_pid_file();
    result
}

fn serve(
    settings: config::Loaded<config::Settings>,
    rules: config::Loaded<config::RuleSet>,
) -> io::Result<()> {
    let resolver = Arc::new(Win32ProcessResolver::new(&settings.value.target_process));
    let engine = Engine::new(
        Arc::new(Win32Provider::new()),
        resolver.clone(),
        settings.value,
        rules.value,
    );
    for warning in settings.warnings.into_iter().chain(rules.warnings) {
        engine.report_warning(warning);
    }

    let (ctrl_tx, ctrl_rx) = mpsc::channel();
    ctrl_c::set_handler(ctrl_tx)?;

    engine.start()?;
    log::info!("adfence started");
    eprintln!("adfence running. Press Ctrl+C to stop and restore hidden windows.");

    let stop = Arc::new(AtomicBool::new(false));
    let (reload_tx, reload_rx) = mpsc::channel();
    let watcher = {
        let stop = stop.clone();
        thread::Builder::new()
            .name("adfence-config-watcher".into())
            .spawn(move || config_watcher::watch(reload_tx, stop))?
    };

    loop {
        while let Ok(reload) = reload_rx.try_recv() {
            apply_reload(&engine, &resolver, reload);
        }
        match ctrl_rx.recv_timeout(POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    stop.store(true, Ordering::Relaxed);
    engine.stop();
    let state = engine.state();
    log::info!("adfence stopped: {}", summary(&state));
    eprintln!("adfence stopped: {}", summary(&state));
    if let Some(error) = &state.last_restore_error {
        eprintln!("some windows could not be restored: {error}");
    }

    // The watcher notices the stop flag within one wait timeout; don't
    // hold up shutdown for it.
    drop(watcher);
    Ok(())
}

fn apply_reload(engine: &Engine, resolver: &Win32ProcessResolver, reload: ConfigReload) {
    match reload {
        ConfigReload::Settings(loaded) => {
            resolver.set_image_name(&loaded.value.target_process);
            for warning in loaded.warnings {
                engine.report_warning(warning);
            }
            engine.reload_settings(loaded.value);
        }
        ConfigReload::Rules(loaded) => {
            for warning in loaded.warnings {
                engine.report_warning(warning);
            }
            engine.reload_rules(loaded.value);
        }
    }
}

fn summary(state: &EngineState) -> String {
    format!(
        "{} hidden, {} resized, {} restore failures",
        state.hidden_total, state.resized_total, state.restore_failures
    )
}
