//! Ctrl+C signal handler using `SetConsoleCtrlHandler`.

use std::io;
use std::sync::OnceLock;
use std::sync::mpsc::Sender;

use windows::Win32::System::Console::{
    CTRL_BREAK_EVENT, CTRL_C_EVENT, CTRL_CLOSE_EVENT, SetConsoleCtrlHandler,
};

/// Written once by `set_handler`, read by the callback.
static SENDER: OnceLock<Sender<()>> = OnceLock::new();

/// Registers a handler that sends `()` on `tx` for Ctrl+C, Ctrl+Break and
/// console close.
///
/// Fails if a handler was already registered in this process.
pub fn set_handler(tx: Sender<()>) -> io::Result<()> {
    SENDER
        .set(tx)
        .map_err(|_| io::Error::new(io::ErrorKind::AlreadyExists, "Ctrl+C handler already registered"))?;
    // SAFETY: `handler` only touches the SENDER static.
    unsafe { SetConsoleCtrlHandler(Some(handler), true) }.map_err(io::Error::other)
}

unsafe extern "system" fn handler(ctrl_type: u32) -> windows::core::BOOL {
    let wanted = [CTRL_C_EVENT, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT];
    if wanted.contains(&ctrl_type)
        && let Some(tx) = SENDER.get()
    {
        let _ = tx.send(());
        return windows::core::BOOL(1);
    }
    windows::core::BOOL(0)
}
