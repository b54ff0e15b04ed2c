//! Win32 implementation of the adfence capability traits, plus the
//! pieces `adfence run` needs around the engine. Everything here is
//! Windows-only; on other platforms the crate is empty.

/// Start-on-logon registration (HKCU Run key).
#[cfg(windows)]
pub mod autostart;

/// Reloads `config.toml` and `rules.toml` when they change.
#[cfg(windows)]
pub mod config_watcher;

/// Ctrl+C handling via `SetConsoleCtrlHandler`.
#[cfg(windows)]
pub mod ctrl_c;

/// Foreground blocker loop.
#[cfg(windows)]
pub mod daemon;

/// Top-level and child window enumeration.
#[cfg(windows)]
pub mod enumerate;

/// Target process lookup and the alive check.
#[cfg(windows)]
pub mod process;

/// `WindowProvider` over Win32 `HWND`s.
#[cfg(windows)]
pub mod window;

#[cfg(windows)]
pub use process::Win32ProcessResolver;
#[cfg(windows)]
pub use window::Win32Provider;
