use std::collections::BTreeSet;
use std::os::windows::process::CommandExt;
use std::process::Command;
use std::sync::Mutex;

use adfence_core::ProcessResolver;
use adfence_core::process::normalize_image_name;

use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

/// `CREATE_NO_WINDOW`: `tasklist` must not flash a console window.
const NO_WINDOW: u32 = 0x08000000;

/// Checks whether a process with the given PID is still alive.
///
/// Used by `adfence status` to detect a stale PID file left behind when
/// the blocker was killed without a clean shutdown.
pub fn is_process_alive(pid: u32) -> bool {
    // SAFETY: PROCESS_QUERY_LIMITED_INFORMATION is the least-privilege
    // access right that still confirms the process exists.
    let result = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) };

    match result {
        Ok(handle) => {
            // SAFETY: the handle was only opened to check existence.
            unsafe {
                let _ = CloseHandle(handle);
            }
            true
        }
        Err(_) => false,
    }
}

/// Finds the target executable's processes.
///
/// Walks a Toolhelp32 process snapshot. If the snapshot cannot be taken,
/// falls back to parsing `tasklist /FO CSV` output. Either failure leaves a
/// warning for [`ProcessResolver::take_warning`].
pub struct Win32ProcessResolver {
    image: Mutex<String>,
    warning: Mutex<Option<String>>,
}

impl Win32ProcessResolver {
    pub fn new(image_name: &str) -> Self {
        Self {
            image: Mutex::new(normalize_image_name(image_name)),
            warning: Mutex::new(None),
        }
    }

    /// Switches the target executable, e.g. after a settings reload.
    pub fn set_image_name(&self, image_name: &str) {
        if let Ok(mut image) = self.image.lock() {
            *image = normalize_image_name(image_name);
        }
    }

    fn image(&self) -> String {
        self.image.lock().map(|i| i.clone()).unwrap_or_default()
    }

    fn warn(&self, message: String) {
        if let Ok(mut warning) = self.warning.lock() {
            *warning = Some(message);
        }
    }
}

impl ProcessResolver for Win32ProcessResolver {
    fn current_target_process_ids(&self) -> BTreeSet<u32> {
        let image = self.image();
        if image.is_empty() {
            return BTreeSet::new();
        }

        let snapshot_error = match snapshot_pids(&image) {
            Ok(pids) => return pids,
            Err(e) => e,
        };
        match tasklist_pids(&image) {
            Ok(pids) => {
                self.warn(format!("process snapshot failed ({snapshot_error}), used tasklist"));
                pids
            }
            Err(e) => {
                self.warn(format!(
                    "process lookup failed: snapshot: {snapshot_error}; tasklist: {e}"
                ));
                BTreeSet::new()
            }
        }
    }

    fn take_warning(&self) -> Option<String> {
        self.warning.lock().ok().and_then(|mut w| w.take())
    }
}

fn snapshot_pids(image: &str) -> windows::core::Result<BTreeSet<u32>> {
    let mut pids = BTreeSet::new();

    // SAFETY: the snapshot handle is closed before returning, and the entry
    // carries its own size as the API requires.
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;
        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut next = Process32FirstW(snapshot, &mut entry);
        while next.is_ok() {
            let len = entry
                .szExeFile
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szExeFile.len());
            let name = String::from_utf16_lossy(&entry.szExeFile[..len]);
            if normalize_image_name(&name) == image {
                pids.insert(entry.th32ProcessID);
            }
            next = Process32NextW(snapshot, &mut entry);
        }
        let _ = CloseHandle(snapshot);
    }

    Ok(pids)
}

fn tasklist_pids(image: &str) -> Result<BTreeSet<u32>, String> {
    let output = Command::new("tasklist")
        .args(["/FO", "CSV", "/NH", "/FI", &format!("IMAGENAME eq {image}")])
        .creation_flags(NO_WINDOW)
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("tasklist exited with {}", output.status));
    }
    Ok(parse_tasklist(&String::from_utf8_lossy(&output.stdout), image))
}

/// Parses `tasklist /FO CSV /NH` rows: `"Image","PID","Session",...`.
///
/// The "no tasks" info line has no quoted fields and is skipped.
fn parse_tasklist(output: &str, image: &str) -> BTreeSet<u32> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split("\",\"").map(|f| f.trim().trim_matches('"'));
            let name = fields.next()?;
            let pid = fields.next()?.parse().ok()?;
            (normalize_image_name(name) == image).then_some(pid)
        })
        .collect()
}
