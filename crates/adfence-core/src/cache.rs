//! Short-lived caches for window attributes read on every tick.
//!
//! Each domain has its own mutex, held only for map lookups and stores.
//! Fetches and liveness checks run with no lock held.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RuleSet;
use crate::{ProviderResult, WindowHandle, WindowIdentity, WindowProvider};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    captured_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) < self.ttl
    }
}

/// A map whose entries expire after a per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V, now: Instant, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                Entry {
                    value,
                    captured_at: now,
                    ttl,
                },
            );
        }
    }

    /// Returns the cached value, or runs `fetch` and caches its result.
    ///
    /// `ttl` picks the lifetime from the fetched value. Failed fetches are
    /// not cached.
    pub fn get_or_fetch<E>(
        &self,
        key: K,
        now: Instant,
        ttl: impl FnOnce(&V) -> Duration,
        fetch: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(v) = self.get(&key, now) {
            return Ok(v);
        }
        let value = fetch()?;
        let ttl = ttl(&value);
        self.insert(key, value.clone(), now, ttl);
        Ok(value)
    }

    /// Drops expired entries and entries whose key `is_alive` rejects.
    /// Returns how many entries were removed.
    pub fn sweep(&self, now: Instant, is_alive: impl Fn(&K) -> bool) -> usize {
        let (mut removed, live_keys) = {
            let Ok(mut entries) = self.entries.lock() else {
                return 0;
            };
            let before = entries.len();
            entries.retain(|_, e| e.is_fresh(now));
            let keys: Vec<K> = entries.keys().cloned().collect();
            (before - entries.len(), keys)
        };

        let dead: Vec<K> = live_keys.into_iter().filter(|k| !is_alive(k)).collect();
        if dead.is_empty() {
            return removed;
        }
        if let Ok(mut entries) = self.entries.lock() {
            for key in &dead {
                if entries.remove(key).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|k, _| keep(k));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The engine's three attribute caches.
///
/// Text and custom-scroll results are keyed by [`WindowIdentity`]. The
/// class cache produces part of that identity, so it is keyed by
/// `(handle, pid)` instead.
#[derive(Debug, Default)]
pub struct IdentityCache {
    text: TtlCache<WindowIdentity, String>,
    class: TtlCache<(WindowHandle, u32), String>,
    custom_scroll: TtlCache<WindowIdentity, bool>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_name(
        &self,
        provider: &dyn WindowProvider,
        handle: WindowHandle,
        process_id: u32,
        now: Instant,
        rules: &RuleSet,
    ) -> ProviderResult<String> {
        self.class.get_or_fetch(
            (handle, process_id),
            now,
            |_| rules.cache_ttl(),
            || provider.class_name(handle),
        )
    }

    /// Window text. Empty titles are often transient (windows being built),
    /// so they expire after the short TTL.
    pub fn text(
        &self,
        provider: &dyn WindowProvider,
        identity: &WindowIdentity,
        now: Instant,
        rules: &RuleSet,
    ) -> ProviderResult<String> {
        self.text.get_or_fetch(
            identity.clone(),
            now,
            |t| {
                if t.is_empty() {
                    rules.empty_text_ttl()
                } else {
                    rules.cache_ttl()
                }
            },
            || provider.text(identity.handle),
        )
    }

    /// Whether `identity` has a custom-scroll descendant; `search` runs on
    /// a miss.
    pub fn custom_scroll(
        &self,
        identity: &WindowIdentity,
        now: Instant,
        rules: &RuleSet,
        search: impl FnOnce() -> bool,
    ) -> bool {
        let found: Result<bool, std::convert::Infallible> =
            self.custom_scroll
                .get_or_fetch(identity.clone(), now, |_| rules.cache_ttl(), || Ok(search()));
        found.unwrap_or_else(|never| match never {})
    }

    /// Evicts expired entries and entries for destroyed windows.
    pub fn sweep(&self, provider: &dyn WindowProvider, now: Instant) -> usize {
        self.text.sweep(now, |id| provider.is_valid(id.handle))
            + self.class.sweep(now, |(h, _)| provider.is_valid(*h))
            + self.custom_scroll.sweep(now, |id| provider.is_valid(id.handle))
    }

    /// Forgets everything cached about `handle`.
    pub fn invalidate(&self, handle: WindowHandle) {
        self.text.retain(|id| id.handle != handle);
        self.class.retain(|(h, _)| *h != handle);
        self.custom_scroll.retain(|id| id.handle != handle);
    }

    pub fn clear(&self) {
        self.text.clear();
        self.class.clear();
        self.custom_scroll.clear();
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.class.len() + self.custom_scroll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
