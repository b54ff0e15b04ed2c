//! Start-on-logon registration via the HKCU Run registry key.
//!
//! Writes an `adfence` value under
//! `HKEY_CURRENT_USER\Software\Microsoft\Windows\CurrentVersion\Run`
//! holding `"<exe>" run`. HKCU is per-user, so no elevation is needed.

use windows::Win32::Foundation::ERROR_FILE_NOT_FOUND;
use windows::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_SAM_FLAGS, REG_SZ, RegCloseKey,
    RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
};
use windows::core::PCWSTR;

const RUN_KEY: &str = r"Software\Microsoft\Windows\CurrentVersion\Run";
const VALUE_NAME: &str = "adfence";

/// Registers `adfence run` to start on logon.
pub fn enable() -> Result<(), String> {
    let command = run_command()?;
    RunKey::open(KEY_SET_VALUE)?.set(&command)
}

/// Removes the entry. Succeeds if it did not exist.
pub fn disable() -> Result<(), String> {
    RunKey::open(KEY_SET_VALUE)?.delete()
}

pub fn is_enabled() -> bool {
    RunKey::open(KEY_QUERY_VALUE).is_ok_and(|key| key.exists())
}

/// `"<exe_path>" run`
fn run_command() -> Result<String, String> {
    let exe = std::env::current_exe().map_err(|e| format!("could not resolve exe path: {e}"))?;
    Ok(format!("\"{}\" run", exe.display()))
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Open handle to the Run key, closed on drop.
struct RunKey(HKEY);

impl RunKey {
    fn open(access: REG_SAM_FLAGS) -> Result<Self, String> {
        let path = wide(RUN_KEY);
        let mut key = HKEY::default();
        // SAFETY: path is null-terminated and outlives the call.
        let status =
            unsafe { RegOpenKeyExW(HKEY_CURRENT_USER, PCWSTR(path.as_ptr()), None, access, &mut key) };
        if status.is_err() {
            return Err(format!("could not open registry key: {status:?}"));
        }
        Ok(Self(key))
    }

    fn set(&self, value: &str) -> Result<(), String> {
        let name = wide(VALUE_NAME);
        let data = wide(value);
        // SAFETY: a &[u16] viewed as twice as many bytes covers the same
        // contiguous memory.
        let bytes: &[u8] = unsafe { std::slice::from_raw_parts(data.as_ptr().cast(), data.len() * 2) };
        // SAFETY: name is null-terminated; bytes carries its own length.
        let status = unsafe { RegSetValueExW(self.0, PCWSTR(name.as_ptr()), None, REG_SZ, Some(bytes)) };
        if status.is_err() {
            return Err(format!("could not write registry value: {status:?}"));
        }
        Ok(())
    }

    fn delete(&self) -> Result<(), String> {
        let name = wide(VALUE_NAME);
        // SAFETY: name is null-terminated.
        let status = unsafe { RegDeleteValueW(self.0, PCWSTR(name.as_ptr())) };
        if status.is_err() && status != ERROR_FILE_NOT_FOUND {
            return Err(format!("could not delete registry value: {status:?}"));
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        let name = wide(VALUE_NAME);
        // SAFETY: with no data buffer this only checks that the value exists.
        unsafe { RegQueryValueExW(self.0, PCWSTR(name.as_ptr()), None, None, None, None) }.is_ok()
    }
}

impl Drop for RunKey {
    fn drop(&mut self) {
        // SAFETY: the key was opened by RunKey::open.
        let _ = unsafe { RegCloseKey(self.0) };
    }
}
