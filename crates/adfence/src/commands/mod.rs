pub mod autostart;
pub mod dump;
pub mod init;
pub mod run;
pub mod status;

/// Exits with status 1 for commands that need the Win32 window API.
#[cfg(not(windows))]
pub fn unsupported(command: &str) -> ! {
    eprintln!("Error: `adfence {command}` is only supported on Windows.");
    std::process::exit(1);
}
