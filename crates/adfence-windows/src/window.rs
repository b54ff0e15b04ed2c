use adfence_core::{ProviderError, ProviderResult, Rect, WindowHandle, WindowProvider};

use windows::Win32::Foundation::{GetLastError, HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::MapWindowPoints;
use windows::Win32::UI::WindowsAndMessaging::{
    GA_PARENT, GWL_STYLE, GetAncestor, GetClassNameW, GetParent, GetWindowLongPtrW,
    GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible, SW_HIDE, SW_SHOWNOACTIVATE, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOZORDER,
    SetWindowPos, ShowWindow, WS_CHILD,
};

use crate::enumerate;

/// `ERROR_INVALID_WINDOW_HANDLE`
const INVALID_HANDLE_CODE: u32 = 1400;

/// [`WindowProvider`] backed by the Win32 window API.
///
/// Stateless: every call goes straight to the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Provider;

impl Win32Provider {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut _)
}

pub(crate) fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize)
}

/// Builds an error from the calling thread's last Win32 error.
fn last_error(op: &'static str, handle: WindowHandle) -> ProviderError {
    // SAFETY: GetLastError only reads thread-local state.
    let code = unsafe { GetLastError() }.0;
    ProviderError::new(op, handle, code)
}

/// Maps a `windows` crate error (an HRESULT) back to its Win32 code.
fn win32_error(op: &'static str, handle: WindowHandle, e: &windows::core::Error) -> ProviderError {
    ProviderError::new(op, handle, (e.code().0 as u32) & 0xFFFF)
}

fn invalid(op: &'static str, handle: WindowHandle) -> ProviderError {
    ProviderError::new(op, handle, INVALID_HANDLE_CODE)
}

impl Win32Provider {
    fn ensure_valid(&self, op: &'static str, handle: WindowHandle) -> ProviderResult<()> {
        if self.is_valid(handle) {
            Ok(())
        } else {
            Err(invalid(op, handle))
        }
    }

    /// Parent of a `WS_CHILD` window, whose position is relative to that
    /// parent's client area.
    fn child_parent(&self, h: HWND) -> Option<HWND> {
        // SAFETY: read-only style and ancestor queries.
        unsafe {
            let style = GetWindowLongPtrW(h, GWL_STYLE) as u32;
            if style & WS_CHILD.0 == 0 {
                return None;
            }
            let parent = GetAncestor(h, GA_PARENT);
            (!parent.is_invalid()).then_some(parent)
        }
    }
}

impl WindowProvider for Win32Provider {
    fn top_level_windows(&self) -> ProviderResult<Vec<WindowHandle>> {
        enumerate::top_level().map_err(|e| win32_error("top_level_windows", WindowHandle(0), &e))
    }

    fn children(&self, parent: WindowHandle) -> ProviderResult<Vec<WindowHandle>> {
        self.ensure_valid("children", parent)?;
        Ok(enumerate::direct_children(hwnd(parent)))
    }

    fn process_id(&self, handle: WindowHandle) -> ProviderResult<u32> {
        let mut pid = 0u32;
        // SAFETY: pid outlives the call.
        let thread = unsafe { GetWindowThreadProcessId(hwnd(handle), Some(&mut pid)) };
        if thread == 0 {
            return Err(last_error("process_id", handle));
        }
        Ok(pid)
    }

    fn class_name(&self, handle: WindowHandle) -> ProviderResult<String> {
        // 256 is the maximum class name length in Win32.
        let mut buffer = [0u16; 256];
        // SAFETY: the buffer outlives the call and its length is passed.
        let length = unsafe { GetClassNameW(hwnd(handle), &mut buffer) };
        if length <= 0 {
            return Err(last_error("class_name", handle));
        }
        Ok(String::from_utf16_lossy(&buffer[..length as usize]))
    }

    fn text(&self, handle: WindowHandle) -> ProviderResult<String> {
        self.ensure_valid("text", handle)?;
        // SAFETY: GetWindowTextLengthW and GetWindowTextW read the title
        // into a buffer we own.
        unsafe {
            let length = GetWindowTextLengthW(hwnd(handle));
            if length == 0 {
                return Ok(String::new());
            }
            // +1 for the null terminator
            let mut buffer = vec![0u16; (length + 1) as usize];
            let copied = GetWindowTextW(hwnd(handle), &mut buffer);
            Ok(String::from_utf16_lossy(&buffer[..copied as usize]))
        }
    }

    fn parent(&self, handle: WindowHandle) -> ProviderResult<Option<WindowHandle>> {
        self.ensure_valid("parent", handle)?;
        // SAFETY: read-only query. Fails (with no error code) for unowned
        // top-level windows.
        match unsafe { GetParent(hwnd(handle)) } {
            Ok(p) if !p.is_invalid() => Ok(Some(self::handle(p))),
            _ => Ok(None),
        }
    }

    fn bounds(&self, handle: WindowHandle) -> ProviderResult<Rect> {
        let mut rect = RECT::default();
        // SAFETY: rect outlives the call.
        unsafe { GetWindowRect(hwnd(handle), &mut rect) }
            .map_err(|e| win32_error("bounds", handle, &e))?;
        Ok(Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn is_visible(&self, handle: WindowHandle) -> ProviderResult<bool> {
        self.ensure_valid("is_visible", handle)?;
        // SAFETY: read-only query.
        Ok(unsafe { IsWindowVisible(hwnd(handle)) }.as_bool())
    }

    fn set_visible(&self, handle: WindowHandle, visible: bool) -> ProviderResult<()> {
        self.ensure_valid("set_visible", handle)?;
        let cmd = if visible { SW_SHOWNOACTIVATE } else { SW_HIDE };
        // SAFETY: ShowWindow returns the previous visibility, not an error.
        let _ = unsafe { ShowWindow(hwnd(handle), cmd) };
        self.ensure_valid("set_visible", handle)
    }

    fn set_bounds(&self, handle: WindowHandle, bounds: Rect) -> ProviderResult<()> {
        let h = hwnd(handle);
        let mut origin = [POINT {
            x: bounds.x,
            y: bounds.y,
        }];
        if let Some(parent) = self.child_parent(h) {
            // SAFETY: converts one point from screen to the parent's client
            // coordinates, in place.
            unsafe { MapWindowPoints(None, Some(parent), &mut origin) };
        }
        let [POINT { x, y }] = origin;
        // SAFETY: SetWindowPos with a valid HWND is safe.
        unsafe {
            SetWindowPos(
                h,
                None,
                x,
                y,
                bounds.width,
                bounds.height,
                SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| win32_error("set_bounds", handle, &e))
    }

    fn resize(&self, handle: WindowHandle, width: i32, height: i32) -> ProviderResult<()> {
        // SAFETY: SetWindowPos with a valid HWND is safe.
        unsafe {
            SetWindowPos(
                hwnd(handle),
                None,
                0,
                0,
                width,
                height,
                SWP_NOMOVE | SWP_NOZORDER | SWP_NOACTIVATE,
            )
        }
        .map_err(|e| win32_error("resize", handle, &e))
    }

    fn is_valid(&self, handle: WindowHandle) -> bool {
        // SAFETY: IsWindow accepts any value.
        unsafe { IsWindow(Some(hwnd(handle))) }.as_bool()
    }
}
