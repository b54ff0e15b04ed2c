//! Record of every window the engine hid, so the change can be undone.
//!
//! Lock discipline: the record map is locked only to read or write
//! entries. All provider calls happen on cloned records with the lock
//! released.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::{ProviderResult, Rect, WindowHandle, WindowIdentity, WindowProvider};

/// How a window was taken off screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppliedAction {
    Hidden,
    /// The window ignored the hide request and was parked at
    /// [`Rect::OFFSCREEN`] instead.
    MovedOffscreen,
}

/// Original state of a hidden window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HideRecord {
    pub identity: WindowIdentity,
    pub original_bounds: Rect,
    pub original_visible: bool,
    pub applied_action: AppliedAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideOutcome {
    /// First hide; a record was created.
    Applied(AppliedAction),
    /// The window had come back and was hidden again.
    Reapplied(AppliedAction),
    /// Already hidden, nothing to do.
    Unchanged,
    /// The handle no longer belongs to the window that was classified.
    Stale,
}

impl HideOutcome {
    pub fn mutated(self) -> bool {
        matches!(self, Self::Applied(_) | Self::Reapplied(_))
    }
}

/// Result of a restore pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Records dropped because their handle was destroyed or reused.
    pub discarded: usize,
    /// Records kept for a later retry.
    pub failed: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    records: Mutex<HashMap<WindowIdentity, HideRecord>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, identity: &WindowIdentity) -> Option<HideRecord> {
        self.records.lock().ok()?.get(identity).cloned()
    }

    fn insert(&self, record: HideRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.entry(record.identity.clone()).or_insert(record);
        }
    }

    fn update_action(&self, identity: &WindowIdentity, action: AppliedAction) {
        if let Ok(mut records) = self.records.lock()
            && let Some(r) = records.get_mut(identity)
        {
            r.applied_action = action;
        }
    }

    fn remove(&self, identity: &WindowIdentity) {
        if let Ok(mut records) = self.records.lock() {
            records.remove(identity);
        }
    }

    /// Hides `identity`'s window, recording its original state the first
    /// time.
    pub fn hide(
        &self,
        provider: &dyn WindowProvider,
        identity: &WindowIdentity,
    ) -> ProviderResult<HideOutcome> {
        if !identity.still_matches(provider) {
            if self.get(identity).is_some() {
                self.remove(identity);
            }
            return Ok(HideOutcome::Stale);
        }

        let handle = identity.handle;
        if let Some(record) = self.get(identity) {
            let back = match record.applied_action {
                AppliedAction::Hidden => provider.is_visible(handle)?,
                AppliedAction::MovedOffscreen => {
                    let b = provider.bounds(handle)?;
                    (b.x, b.y) != Rect::OFFSCREEN
                }
            };
            if !back {
                return Ok(HideOutcome::Unchanged);
            }
            let action = take_off_screen(provider, &record.original_bounds, handle)?;
            if action != record.applied_action {
                self.update_action(identity, action);
            }
            return Ok(HideOutcome::Reapplied(action));
        }

        let original_bounds = provider.bounds(handle)?;
        let original_visible = provider.is_visible(handle)?;
        let applied_action = take_off_screen(provider, &original_bounds, handle)?;
        self.insert(HideRecord {
            identity: identity.clone(),
            original_bounds,
            original_visible,
            applied_action,
        });
        Ok(HideOutcome::Applied(applied_action))
    }

    /// Undoes every recorded hide.
    ///
    /// Records whose window is gone or whose handle now belongs to another
    /// window are discarded without touching anything. Records that fail to
    /// restore are kept.
    pub fn restore_all(&self, provider: &dyn WindowProvider) -> RestoreReport {
        let mut report = RestoreReport::default();
        for record in self.records() {
            if !record.identity.still_matches(provider) {
                log::debug!("not restoring {}: window no longer matches", record.identity);
                self.remove(&record.identity);
                report.discarded += 1;
                continue;
            }
            match restore(provider, &record) {
                Ok(()) => {
                    self.remove(&record.identity);
                    report.restored += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    report.last_error = Some(format!("restore {}: {e}", record.identity));
                }
            }
        }
        report
    }

    /// Drops records for windows that were destroyed while hidden.
    pub fn prune(&self, provider: &dyn WindowProvider) -> usize {
        let stale: Vec<WindowIdentity> = self
            .records()
            .into_iter()
            .map(|r| r.identity)
            .filter(|id| !id.still_matches(provider))
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale.len()
    }

    /// Forgets every record. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        self.records
            .lock()
            .map(|mut r| r.drain().count())
            .unwrap_or(0)
    }

    pub fn records(&self) -> Vec<HideRecord> {
        self.records
            .lock()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, identity: &WindowIdentity) -> bool {
        self.get(identity).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hides the window, parking it offscreen when it refuses.
fn take_off_screen(
    provider: &dyn WindowProvider,
    original: &Rect,
    handle: WindowHandle,
) -> ProviderResult<AppliedAction> {
    let hidden = provider.set_visible(handle, false).is_ok()
        && !provider.is_visible(handle).unwrap_or(true);
    if hidden {
        return Ok(AppliedAction::Hidden);
    }
    let (x, y) = Rect::OFFSCREEN;
    provider.set_bounds(handle, original.moved_to(x, y))?;
    Ok(AppliedAction::MovedOffscreen)
}

fn restore(provider: &dyn WindowProvider, record: &HideRecord) -> ProviderResult<()> {
    let handle = record.identity.handle;
    if record.applied_action == AppliedAction::MovedOffscreen {
        provider.set_bounds(handle, record.original_bounds)?;
    }
    provider.set_visible(handle, record.original_visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeProvider, Mutation};

    fn ad(provider: &FakeProvider) -> WindowIdentity {
        let h = provider.add_top_level(100, "EVA_Window_Dblclk", "Chrome Legacy Window", Rect::new(10, 20, 300, 100));
        WindowIdentity::new(h, 100, "EVA_Window_Dblclk")
    }

    #[test]
    fn hide_records_original_state() {
        // Arrange
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);

        // Act
        let outcome = ledger.hide(&provider, &id).unwrap();

        // Assert
        assert_eq!(outcome, HideOutcome::Applied(AppliedAction::Hidden));
        assert!(!provider.shown(id.handle));
        let record = &ledger.records()[0];
        assert_eq!(record.original_bounds, Rect::new(10, 20, 300, 100));
        assert!(record.original_visible);
    }

    #[test]
    fn second_hide_is_a_no_op() {
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        ledger.hide(&provider, &id).unwrap();
        provider.clear_mutations();

        let outcome = ledger.hide(&provider, &id).unwrap();

        assert_eq!(outcome, HideOutcome::Unchanged);
        assert!(provider.mutations().is_empty());
    }

    #[test]
    fn reshown_window_is_hidden_again_without_recapture() {
        // Arrange
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        ledger.hide(&provider, &id).unwrap();
        provider.set_shown(id.handle, true);

        // Act
        let outcome = ledger.hide(&provider, &id).unwrap();

        // Assert
        assert_eq!(outcome, HideOutcome::Reapplied(AppliedAction::Hidden));
        assert!(!provider.shown(id.handle));
        assert!(ledger.records()[0].original_visible);
    }

    #[test]
    fn stubborn_window_is_moved_offscreen() {
        // Arrange
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        provider.set_refuses_hide(id.handle);

        // Act
        let outcome = ledger.hide(&provider, &id).unwrap();

        // Assert
        assert_eq!(outcome, HideOutcome::Applied(AppliedAction::MovedOffscreen));
        assert_eq!(provider.bounds(id.handle).unwrap(), Rect::new(-32000, -32000, 300, 100));
    }

    #[test]
    fn restore_puts_back_bounds_and_visibility() {
        // Arrange
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        provider.set_refuses_hide(id.handle);
        ledger.hide(&provider, &id).unwrap();

        // Act
        let report = ledger.restore_all(&provider);

        // Assert
        assert_eq!(report.restored, 1);
        assert_eq!(provider.bounds(id.handle).unwrap(), Rect::new(10, 20, 300, 100));
        assert!(provider.shown(id.handle));
        assert!(ledger.is_empty());
    }

    #[test]
    fn recycled_handle_is_skipped_and_discarded() {
        // Arrange: record for (h=42, pid=100, class X); the OS then hands 42
        // to a window of pid 200.
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let h = provider.add_top_level_at(WindowHandle(42), 100, "X", "", Rect::new(0, 0, 50, 50));
        let id = WindowIdentity::new(h, 100, "X");
        ledger.hide(&provider, &id).unwrap();
        provider.recycle(h, 200, "X");
        provider.set_shown(h, false);
        provider.clear_mutations();

        // Act
        let report = ledger.restore_all(&provider);

        // Assert
        assert_eq!(report.discarded, 1);
        assert!(provider.mutations().is_empty());
        assert!(!provider.shown(h));
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_restore_is_retained() {
        // Arrange
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        ledger.hide(&provider, &id).unwrap();
        provider.fail("set_visible");

        // Act
        let report = ledger.restore_all(&provider);

        // Assert
        assert_eq!(report.failed, 1);
        assert!(report.last_error.unwrap().contains("set_visible"));
        assert!(ledger.contains(&id));

        provider.heal("set_visible");
        assert_eq!(ledger.restore_all(&provider).restored, 1);
        assert!(provider.shown(id.handle));
    }

    #[test]
    fn stale_identity_is_never_hidden() {
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        provider.recycle(id.handle, 999, "Notepad");

        let outcome = ledger.hide(&provider, &id).unwrap();

        assert_eq!(outcome, HideOutcome::Stale);
        assert!(!provider.mutations().iter().any(|m| matches!(m, Mutation::SetVisible(..))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn prune_drops_destroyed_windows() {
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        let id = ad(&provider);
        ledger.hide(&provider, &id).unwrap();
        provider.remove(id.handle);

        assert_eq!(ledger.prune(&provider), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn reset_forgets_everything() {
        let provider = FakeProvider::new();
        let ledger = Ledger::new();
        ledger.hide(&provider, &ad(&provider)).unwrap();
        ledger.hide(&provider, &ad(&provider)).unwrap();

        assert_eq!(ledger.reset(), 2);
        assert!(ledger.is_empty());
    }
}
