//! Stretches the main window's content views over the space the ad used.

use crate::classifier::ContentView;
use crate::config::RuleSet;
use crate::{ProviderResult, Rect, WindowHandle, WindowProvider};

/// Size a content view should have inside a parent of `parent` bounds.
///
/// Returns `None` when the result would be degenerate (a parent smaller
/// than the paddings, usually a minimized window).
pub fn target_size(view: ContentView, parent: &Rect, rules: &RuleSet) -> Option<(i32, i32)> {
    let width = parent.width - rules.layout_shadow_padding_px;
    let height = match view {
        ContentView::OnlineMain => parent.height - rules.main_view_padding_px,
        ContentView::LockMode => parent.height,
    };
    (width >= 1 && height >= 1).then_some((width, height))
}

/// Resizes `handle` to `target` unless it already has that size.
///
/// Returns whether a resize was issued.
pub fn apply(
    provider: &dyn WindowProvider,
    handle: WindowHandle,
    current: &Rect,
    target: (i32, i32),
) -> ProviderResult<bool> {
    if (current.width, current.height) == target {
        return Ok(false);
    }
    provider.resize(handle, target.0, target.1)?;
    Ok(true)
}
