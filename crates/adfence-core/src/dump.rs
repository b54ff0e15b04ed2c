//! Diagnostic snapshot of the target application's window tree.
//!
//! Used when the window layout changes and the rules need retuning: the
//! dump shows every class, title and rectangle the classifier would see.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::{ProviderResult, WindowHandle, WindowIdentity, WindowProvider, WindowSnapshot};

/// Default depth of [`dump_tree`].
pub const DEFAULT_DUMP_DEPTH: u32 = 8;

#[derive(Debug, Clone, Serialize)]
pub struct TreeDump {
    /// RFC 3339 local time of the capture.
    pub captured_at: String,
    pub target_pids: Vec<u32>,
    pub max_depth: u32,
    pub windows: Vec<DumpNode>,
    #[serde(skip)]
    stamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpNode {
    #[serde(flatten)]
    pub snapshot: WindowSnapshot,
    pub depth: u32,
    pub children: Vec<DumpNode>,
}

impl TreeDump {
    /// Total number of windows in the dump.
    pub fn window_count(&self) -> usize {
        fn count(nodes: &[DumpNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.windows)
    }

    /// `window_dump_YYYYmmdd-HHMMSS.json`
    pub fn file_name(&self) -> String {
        format!("window_dump_{}.json", self.stamp)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the dump into `dir` and returns the file path.
    pub fn save_in(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = self.to_json().map_err(std::io::Error::other)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}

/// Captures full snapshots of every top-level window owned by `pids`,
/// and their descendants down to `max_depth` levels.
///
/// Windows that vanish mid-capture are left out. Only the top-level
/// enumeration itself can fail.
pub fn dump_tree(
    provider: &dyn WindowProvider,
    pids: &BTreeSet<u32>,
    max_depth: u32,
) -> ProviderResult<TreeDump> {
    let now = Local::now();
    let mut windows = Vec::new();
    for handle in provider.top_level_windows()? {
        let Ok(pid) = provider.process_id(handle) else {
            continue;
        };
        if !pids.contains(&pid) {
            continue;
        }
        if let Some(node) = capture(provider, handle, None, 0, max_depth) {
            windows.push(node);
        }
    }
    Ok(TreeDump {
        captured_at: now.to_rfc3339(),
        target_pids: pids.iter().copied().collect(),
        max_depth,
        windows,
        stamp: now.format("%Y%m%d-%H%M%S").to_string(),
    })
}

fn capture(
    provider: &dyn WindowProvider,
    handle: WindowHandle,
    parent: Option<WindowHandle>,
    depth: u32,
    max_depth: u32,
) -> Option<DumpNode> {
    let snapshot = full_snapshot(provider, handle, parent).ok()?;
    let children = if depth < max_depth {
        provider
            .children(handle)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| capture(provider, c, Some(handle), depth + 1, max_depth))
            .collect()
    } else {
        Vec::new()
    };
    Some(DumpNode {
        snapshot,
        depth,
        children,
    })
}

/// Snapshot with bounds and visibility filled in.
pub fn full_snapshot(
    provider: &dyn WindowProvider,
    handle: WindowHandle,
    parent: Option<WindowHandle>,
) -> ProviderResult<WindowSnapshot> {
    let identity = WindowIdentity::new(handle, provider.process_id(handle)?, provider.class_name(handle)?);
    Ok(WindowSnapshot {
        identity,
        parent,
        text: provider.text(handle)?,
        bounds: provider.bounds(handle).ok(),
        visible: provider.is_visible(handle).ok(),
        is_top_level: parent.is_none(),
    })
}
