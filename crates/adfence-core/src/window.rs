use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Rect;

/// An OS-assigned window handle.
///
/// Handles are recycled by the OS once a window is destroyed, so a handle
/// alone never identifies a window across ticks. See [`WindowIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub usize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Composite key that survives handle reuse.
///
/// If the `(process_id, class_name)` pair observed at a handle changes,
/// the window behind it is treated as a different window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowIdentity {
    pub handle: WindowHandle,
    pub process_id: u32,
    pub class_name: String,
}

impl WindowIdentity {
    pub fn new(handle: WindowHandle, process_id: u32, class_name: impl Into<String>) -> Self {
        Self {
            handle,
            process_id,
            class_name: class_name.into(),
        }
    }

    /// Reads the live identity at this handle and compares it.
    ///
    /// Any provider failure counts as a mismatch: a window we cannot
    /// read is not a window we may touch.
    pub fn still_matches(&self, provider: &dyn WindowProvider) -> bool {
        if !provider.is_valid(self.handle) {
            return false;
        }
        let pid = provider.process_id(self.handle);
        let class = provider.class_name(self.handle);
        matches!((pid, class), (Ok(p), Ok(c)) if p == self.process_id && c == self.class_name)
    }
}

impl fmt::Display for WindowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}, class {})",
            self.handle, self.process_id, self.class_name
        )
    }
}

/// Per-tick view of a window.
///
/// Light snapshots (the polling path) leave `bounds` and `visible` unset;
/// full snapshots (diagnostic dumps) fill them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub identity: WindowIdentity,
    pub parent: Option<WindowHandle>,
    pub text: String,
    pub bounds: Option<Rect>,
    pub visible: Option<bool>,
    pub is_top_level: bool,
}

impl WindowSnapshot {
    pub fn handle(&self) -> WindowHandle {
        self.identity.handle
    }

    pub fn class_name(&self) -> &str {
        &self.identity.class_name
    }
}

/// A failed native window call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed for {handle} (os error {code})")]
pub struct ProviderError {
    /// Name of the failing primitive, e.g. `"set_bounds"`.
    pub op: &'static str,
    pub handle: WindowHandle,
    /// OS-level error code (`GetLastError` on Windows).
    pub code: u32,
}

impl ProviderError {
    pub fn new(op: &'static str, handle: WindowHandle, code: u32) -> Self {
        Self { op, handle, code }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability interface over the OS window API.
///
/// Stateless: every call goes to the OS. The Windows implementation lives
/// in `adfence-windows`; tests use an in-memory fake.
pub trait WindowProvider: Send + Sync {
    /// All top-level windows, including owned popups.
    fn top_level_windows(&self) -> ProviderResult<Vec<WindowHandle>>;

    /// Direct children of `parent`.
    fn children(&self, parent: WindowHandle) -> ProviderResult<Vec<WindowHandle>>;

    fn process_id(&self, handle: WindowHandle) -> ProviderResult<u32>;

    fn class_name(&self, handle: WindowHandle) -> ProviderResult<String>;

    fn text(&self, handle: WindowHandle) -> ProviderResult<String>;

    /// Parent or owner window, `None` for unowned top-level windows.
    fn parent(&self, handle: WindowHandle) -> ProviderResult<Option<WindowHandle>>;

    fn bounds(&self, handle: WindowHandle) -> ProviderResult<Rect>;

    fn is_visible(&self, handle: WindowHandle) -> ProviderResult<bool>;

    fn set_visible(&self, handle: WindowHandle, visible: bool) -> ProviderResult<()>;

    /// Moves and resizes. `bounds` is in screen coordinates.
    fn set_bounds(&self, handle: WindowHandle, bounds: Rect) -> ProviderResult<()>;

    /// Resizes in place without moving.
    fn resize(&self, handle: WindowHandle, width: i32, height: i32) -> ProviderResult<()>;

    fn is_valid(&self, handle: WindowHandle) -> bool;
}
