use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Instant, SystemTime};

use super::{Config, Inner, LoopState, lock};
use crate::classifier::{ChildContext, Classification, Classifier, ContentView};
use crate::config::RuleSet;
use crate::ledger::HideOutcome;
use crate::resizer;
use crate::{ProviderResult, Rect, WindowHandle, WindowIdentity, WindowSnapshot};

/// What one tick did.
#[derive(Default)]
struct TickStats {
    main_windows: usize,
    resized: u64,
    hidden: u64,
    mutated: bool,
    /// Every non-irrelevant verdict, for change detection.
    verdicts: Vec<(WindowIdentity, Classification)>,
}

impl TickStats {
    fn fingerprint(&mut self) -> u64 {
        self.verdicts.sort_by(|a, b| a.0.handle.cmp(&b.0.handle));
        let mut hasher = DefaultHasher::new();
        self.verdicts.hash(&mut hasher);
        hasher.finish()
    }
}

/// Per-tick inputs shared by the apply steps.
struct Pass<'a> {
    rules: &'a RuleSet,
    classifier: Classifier<'a>,
    aggressive: bool,
    /// Whether mutations are allowed this tick.
    apply: bool,
    now: Instant,
}

impl Inner {
    /// One scan → classify → apply pass. Never fails: every error is
    /// recorded and the pass moves on.
    pub(super) fn tick(&self, looping: &mut LoopState) {
        let now = Instant::now();
        self.drain_commands(looping, now);
        self.restore_if_disabled();

        if looping.pid_scan.ready(now) {
            self.scan_pids(looping, now);
        }

        let Config { rules, settings } = self.config();
        let pass = Pass {
            rules: &rules,
            classifier: Classifier::new(&rules, settings.aggressive_mode),
            aggressive: settings.aggressive_mode,
            apply: settings.enabled && !self.stop_requested(),
            now,
        };
        let mut stats = TickStats::default();
        if !looping.pids.is_empty() {
            match self.provider.top_level_windows() {
                Ok(handles) => {
                    for handle in handles {
                        self.visit_top_level(handle, &looping.pids, &pass, &mut stats);
                    }
                }
                Err(e) => self.report_error(&format!("enumerate windows: {e}")),
            }
        }

        let changed = looping.tracker.observe(stats.fingerprint(), now);
        if stats.mutated && !changed {
            looping.tracker.touch(now);
        }

        if looping.sweep.ready(now) {
            let evicted = self.cache.sweep(self.provider.as_ref(), now);
            let pruned = self.ledger.prune(self.provider.as_ref());
            if evicted + pruned > 0 {
                log::debug!("sweep: {evicted} cache entries, {pruned} ledger records");
            }
        }

        let hidden = self.ledger.len();
        let mut state = lock(&self.state);
        state.last_tick = Some(SystemTime::now());
        state.target_process_count = looping.pids.len();
        state.main_window_count = stats.main_windows;
        state.hidden_windows = hidden;
        state.resized_total += stats.resized;
        state.hidden_total += stats.hidden;
    }

    fn scan_pids(&self, looping: &mut LoopState, now: Instant) {
        let pids: BTreeSet<u32> = self.resolver.current_target_process_ids();
        if let Some(warning) = self.resolver.take_warning() {
            self.report_error(&warning);
        }
        if pids == looping.pids {
            return;
        }
        if pids.is_empty() {
            log::info!("target process not running");
            self.cache.clear();
        } else {
            log::info!("target processes: {pids:?}");
        }
        looping.pids = pids;
        looping.tracker.touch(now);
    }

    fn visit_top_level(
        &self,
        handle: WindowHandle,
        pids: &BTreeSet<u32>,
        pass: &Pass<'_>,
        stats: &mut TickStats,
    ) {
        let Ok(pid) = self.provider.process_id(handle) else {
            return;
        };
        if !pids.contains(&pid) {
            return;
        }
        let window = match self.light(handle, pid, None, pass) {
            Ok(w) => w,
            Err(e) => {
                log::debug!("skipping {handle}: {e}");
                return;
            }
        };
        let rules = pass.rules;
        let class = window.class_name();
        if !rules.is_main_class(class) && !rules.is_ad_candidate_class(class) {
            return;
        }

        let children = self.children_of(handle, pass);
        let mut verdict = pass.classifier.classify_top_level(&window, &children);
        if !matches!(verdict, Classification::MainWindow | Classification::LegacyAdContainer)
            && rules.is_ad_candidate_class(class)
            && rules.signature_search_depth > 1
        {
            let below = self.descendants(handle, rules.signature_search_depth, pass);
            verdict = pass.classifier.classify_top_level(&window, &below);
        }
        if verdict != Classification::Irrelevant {
            stats.verdicts.push((window.identity.clone(), verdict));
        }

        match verdict {
            Classification::MainWindow => {
                stats.main_windows += 1;
                self.visit_main(&window, &children, pass, stats);
            }
            Classification::LegacyAdContainer => {
                let subwindows = children
                    .iter()
                    .filter(|c| pass.classifier.classify_legacy_child(c) == Classification::AdCandidate)
                    .count();
                log::trace!("legacy container {} with {subwindows} sub-windows", window.identity);
                if pass.apply {
                    self.hide(&window.identity, stats);
                }
            }
            _ => {}
        }
    }

    fn visit_main(
        &self,
        main: &WindowSnapshot,
        children: &[WindowSnapshot],
        pass: &Pass<'_>,
        stats: &mut TickStats,
    ) {
        let parent_bounds = match self.provider.bounds(main.handle()) {
            Ok(b) => b,
            Err(e) => {
                self.report_error(&format!("read main window bounds: {e}"));
                return;
            }
        };
        let mut custom_scroll = None;

        for child in children {
            if let Some(view) = pass.classifier.content_view(child) {
                if pass.apply {
                    self.resize_view(child, view, &parent_bounds, pass, stats);
                }
                continue;
            }

            let needs_scroll = child.class_name() == pass.rules.content_child_class && child.text.is_empty();
            let parent_has_custom_scroll =
                needs_scroll && *custom_scroll.get_or_insert_with(|| self.has_custom_scroll(main, pass));
            let geometry = if pass.aggressive {
                self.provider.bounds(child.handle()).ok().map(|b| (b, parent_bounds))
            } else {
                None
            };
            let ctx = ChildContext {
                parent_text: &main.text,
                parent_has_custom_scroll,
                geometry,
            };

            let verdict = pass.classifier.classify_main_child(child, &ctx);
            if verdict == Classification::Irrelevant {
                continue;
            }
            stats.verdicts.push((child.identity.clone(), verdict));
            if pass.apply {
                self.hide(&child.identity, stats);
            }
        }
    }

    fn resize_view(
        &self,
        view: &WindowSnapshot,
        kind: ContentView,
        parent: &Rect,
        pass: &Pass<'_>,
        stats: &mut TickStats,
    ) {
        let Some(target) = resizer::target_size(kind, parent, pass.rules) else {
            return;
        };
        if !view.identity.still_matches(self.provider.as_ref()) {
            return;
        }
        let handle = view.handle();
        let result = self
            .provider
            .bounds(handle)
            .and_then(|current| resizer::apply(self.provider.as_ref(), handle, &current, target));
        match result {
            Ok(true) => {
                log::debug!("resized {} to {}x{}", view.identity, target.0, target.1);
                stats.resized += 1;
                stats.mutated = true;
            }
            Ok(false) => {}
            Err(e) => self.report_error(&format!("resize {}: {e}", view.identity)),
        }
    }

    fn hide(&self, identity: &WindowIdentity, stats: &mut TickStats) {
        match self.ledger.hide(self.provider.as_ref(), identity) {
            Ok(HideOutcome::Applied(action)) => {
                log::info!("hid {identity} ({action:?})");
                stats.hidden += 1;
                stats.mutated = true;
            }
            Ok(HideOutcome::Reapplied(action)) => {
                log::debug!("re-hid {identity} ({action:?})");
                stats.hidden += 1;
                stats.mutated = true;
            }
            Ok(HideOutcome::Stale) => self.cache.invalidate(identity.handle),
            Ok(HideOutcome::Unchanged) => {}
            Err(e) => self.report_error(&format!("hide {identity}: {e}")),
        }
    }

    fn has_custom_scroll(&self, main: &WindowSnapshot, pass: &Pass<'_>) -> bool {
        self.cache.custom_scroll(&main.identity, pass.now, pass.rules, || {
            self.descendants(main.handle(), pass.rules.signature_search_depth, pass)
                .iter()
                .any(|d| d.class_name().starts_with(&pass.rules.custom_scroll_prefix))
        })
    }

    /// Light snapshot: identity and text, served from the cache.
    fn light(
        &self,
        handle: WindowHandle,
        pid: u32,
        parent: Option<WindowHandle>,
        pass: &Pass<'_>,
    ) -> ProviderResult<WindowSnapshot> {
        let provider = self.provider.as_ref();
        let class = self.cache.class_name(provider, handle, pid, pass.now, pass.rules)?;
        let identity = WindowIdentity::new(handle, pid, class);
        let text = self.cache.text(provider, &identity, pass.now, pass.rules)?;
        Ok(WindowSnapshot {
            identity,
            parent,
            text,
            bounds: None,
            visible: None,
            is_top_level: parent.is_none(),
        })
    }

    /// Light snapshots of the direct children. Children that vanish
    /// mid-read are skipped.
    fn children_of(&self, parent: WindowHandle, pass: &Pass<'_>) -> Vec<WindowSnapshot> {
        let handles = match self.provider.children(parent) {
            Ok(h) => h,
            Err(e) => {
                self.report_error(&format!("enumerate children of {parent}: {e}"));
                return Vec::new();
            }
        };
        handles
            .into_iter()
            .filter_map(|h| {
                let pid = self.provider.process_id(h).ok()?;
                self.light(h, pid, Some(parent), pass).ok()
            })
            .collect()
    }

    /// Breadth-first light snapshots down to `depth` levels.
    fn descendants(&self, root: WindowHandle, depth: u32, pass: &Pass<'_>) -> Vec<WindowSnapshot> {
        let mut found = Vec::new();
        let mut frontier = vec![root];
        for _ in 0..depth {
            let mut next = Vec::new();
            for parent in frontier {
                for child in self.children_of(parent, pass) {
                    next.push(child.handle());
                    found.push(child);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        found
    }
}
