#[cfg(windows)]
pub fn execute() {
    if let Ok(Some(pid)) = adfence_core::pid::read_pid_file()
        && pid != std::process::id()
        && adfence_windows::process::is_process_alive(pid)
    {
        eprintln!("adfence is already running (PID: {pid}).");
        std::process::exit(1);
    }

    if let Err(e) = adfence_windows::daemon::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(windows))]
pub fn execute() {
    super::unsupported("run");
}
