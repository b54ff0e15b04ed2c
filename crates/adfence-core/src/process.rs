use std::collections::BTreeSet;

/// Finds the running instances of the target executable.
pub trait ProcessResolver: Send + Sync {
    /// Current process ids of the target. Empty when it is not running
    /// or every lookup strategy failed.
    fn current_target_process_ids(&self) -> BTreeSet<u32>;

    /// Returns (and clears) the warning left by the last lookup, naming the
    /// strategy that failed and why.
    fn take_warning(&self) -> Option<String>;
}

/// Normalises an image name for comparison: trimmed, lower-case, with an
/// `.exe` suffix. Returns an empty string for blank input.
pub fn normalize_image_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.is_empty() || name.ends_with(".exe") {
        name
    } else {
        format!("{name}.exe")
    }
}
