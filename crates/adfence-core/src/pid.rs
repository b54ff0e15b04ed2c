use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PID_FILE: &str = "adfence.pid";

/// Returns the adfence data directory, creating it if needed.
///
/// On Windows: `%LOCALAPPDATA%\adfence`
fn data_dir() -> io::Result<PathBuf> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "local data directory not found"))?;
    let dir = base.join("adfence");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the path to the PID file.
pub fn pid_path() -> io::Result<PathBuf> {
    Ok(data_dir()?.join(PID_FILE))
}

/// Writes the current process's PID to the PID file.
///
/// Called when `adfence run` starts, so `adfence status` can tell whether
/// a blocker is already running.
pub fn write_pid_file() -> io::Result<()> {
    write_pid_to(&pid_path()?, std::process::id())
}

/// Reads the PID from the PID file, if it exists.
pub fn read_pid_file() -> io::Result<Option<u32>> {
    read_pid_from(&pid_path()?)
}

/// Removes the PID file. Called on clean shutdown.
pub fn remove_pid_file() -> io::Result<()> {
    remove_pid_at(&pid_path()?)
}

fn write_pid_to(path: &Path, pid: u32) -> io::Result<()> {
    fs::write(path, pid.to_string())
}

fn read_pid_from(path: &Path) -> io::Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    let pid = contents.trim().parse().map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("invalid PID file contents: {e}"))
    })?;
    Ok(Some(pid))
}

fn remove_pid_at(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
