use adfence_core::WindowHandle;

use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{EnumChildWindows, EnumWindows, GA_PARENT, GetAncestor};
use windows::core::BOOL;

use crate::window::handle;

/// Enumerates every top-level window, visible or not.
///
/// Hidden windows are included on purpose: windows the blocker has hidden
/// must still be found on later passes.
pub fn top_level() -> windows::core::Result<Vec<WindowHandle>> {
    let mut windows: Vec<WindowHandle> = Vec::new();

    // SAFETY: EnumWindows runs synchronously, so the Vec behind the LPARAM
    // outlives every callback.
    unsafe {
        EnumWindows(Some(collect), LPARAM(&mut windows as *mut _ as isize))?;
    }

    Ok(windows)
}

/// Direct children of `parent`, in Z order.
///
/// `EnumChildWindows` walks the whole subtree, so grandchildren are
/// filtered out by comparing each window's parent.
pub fn direct_children(parent: HWND) -> Vec<WindowHandle> {
    let mut search = ChildSearch {
        parent,
        found: Vec::new(),
    };

    // SAFETY: same as above; the return value only reports whether the
    // callback stopped early, which ours never does.
    unsafe {
        let _ = EnumChildWindows(
            Some(parent),
            Some(collect_direct),
            LPARAM(&mut search as *mut _ as isize),
        );
    }

    search.found
}

struct ChildSearch {
    parent: HWND,
    found: Vec<WindowHandle>,
}

unsafe extern "system" fn collect(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points to the Vec owned by top_level().
    let windows = unsafe { &mut *(lparam.0 as *mut Vec<WindowHandle>) };
    windows.push(handle(hwnd));
    BOOL(1)
}

unsafe extern "system" fn collect_direct(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points to the ChildSearch owned by direct_children().
    let search = unsafe { &mut *(lparam.0 as *mut ChildSearch) };
    // SAFETY: read-only query.
    if unsafe { GetAncestor(hwnd, GA_PARENT) } == search.parent {
        search.found.push(handle(hwnd));
    }
    BOOL(1)
}
