//! Delegates to [`adfence_windows::autostart`] for the registry work.

#[cfg(windows)]
pub fn enable() {
    match adfence_windows::autostart::enable() {
        Ok(()) => println!("Autostart enabled."),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
pub fn disable() {
    match adfence_windows::autostart::disable() {
        Ok(()) => println!("Autostart disabled."),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
pub fn status() {
    if adfence_windows::autostart::is_enabled() {
        println!("Autostart is enabled.");
    } else {
        println!("Autostart is disabled.");
    }
}

#[cfg(not(windows))]
pub fn enable() {
    super::unsupported("autostart enable");
}

#[cfg(not(windows))]
pub fn disable() {
    super::unsupported("autostart disable");
}

#[cfg(not(windows))]
pub fn status() {
    super::unsupported("autostart status");
}
