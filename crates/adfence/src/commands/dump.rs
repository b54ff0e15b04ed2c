use std::path::Path;

/// Captures the target's window tree without starting the engine.
///
/// Writes `window_dump_<timestamp>.json` into `out`, or prints the JSON to
/// stdout when no directory is given.
#[cfg(windows)]
pub fn execute(out: Option<&Path>, depth: u32) {
    use adfence_core::{ProcessResolver, config, dump_tree};
    use adfence_windows::{Win32ProcessResolver, Win32Provider};

    let settings = config::load_settings();
    for warning in &settings.warnings {
        eprintln!("Warning: {warning}");
    }
    let target = &settings.value.target_process;

    let resolver = Win32ProcessResolver::new(target);
    let pids = resolver.current_target_process_ids();
    if let Some(warning) = resolver.take_warning() {
        eprintln!("Warning: {warning}");
    }
    if pids.is_empty() {
        eprintln!("Error: {target} is not running.");
        std::process::exit(1);
    }

    let dump = match dump_tree(&Win32Provider::new(), &pids, depth) {
        Ok(dump) => dump,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match out {
        Some(dir) => match dump.save_in(dir) {
            Ok(path) => println!("Wrote {} windows to {}", dump.window_count(), path.display()),
            Err(e) => {
                eprintln!("Error: could not write dump to {}: {e}", dir.display());
                std::process::exit(1);
            }
        },
        None => match dump.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
    }
}

#[cfg(not(windows))]
pub fn execute(_out: Option<&Path>, _depth: u32) {
    super::unsupported("dump");
}
