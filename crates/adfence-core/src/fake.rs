//! In-memory [`WindowProvider`] and [`ProcessResolver`] for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{ProcessResolver, ProviderError, ProviderResult, Rect, WindowHandle, WindowProvider};

/// Error code returned by injected failures (`ERROR_ACCESS_DENIED`).
pub const FAKE_ERROR_CODE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    SetVisible(WindowHandle, bool),
    SetBounds(WindowHandle, Rect),
    Resize(WindowHandle, i32, i32),
}

#[derive(Debug, Clone)]
struct FakeWindow {
    pid: u32,
    class: String,
    text: String,
    bounds: Rect,
    visible: bool,
    parent: Option<WindowHandle>,
    top_level: bool,
    /// Ignores `set_visible(false)`, like some owner-drawn popups.
    refuses_hide: bool,
}

#[derive(Default)]
struct State {
    windows: BTreeMap<WindowHandle, FakeWindow>,
    next: usize,
    mutations: Vec<Mutation>,
    failing: HashSet<&'static str>,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<State>,
    text_reads: AtomicUsize,
    /// While set, `top_level_windows` blocks, like a hung window owner.
    stalled: Mutex<bool>,
    unstall: Condvar,
    stalled_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, window: FakeWindow) -> WindowHandle {
        let mut s = self.state.lock().unwrap();
        s.next += 1;
        let handle = WindowHandle(0x100 * s.next);
        s.windows.insert(handle, window);
        handle
    }

    pub fn add_top_level(&self, pid: u32, class: &str, text: &str, bounds: Rect) -> WindowHandle {
        self.insert(Self::top_level(pid, class, text, bounds))
    }

    /// Adds a top-level window at a chosen handle.
    pub fn add_top_level_at(
        &self,
        handle: WindowHandle,
        pid: u32,
        class: &str,
        text: &str,
        bounds: Rect,
    ) -> WindowHandle {
        let mut s = self.state.lock().unwrap();
        s.windows.insert(handle, Self::top_level(pid, class, text, bounds));
        handle
    }

    fn top_level(pid: u32, class: &str, text: &str, bounds: Rect) -> FakeWindow {
        FakeWindow {
            pid,
            class: class.into(),
            text: text.into(),
            bounds,
            visible: true,
            parent: None,
            top_level: true,
            refuses_hide: false,
        }
    }

    pub fn add_child(
        &self,
        parent: WindowHandle,
        pid: u32,
        class: &str,
        text: &str,
        bounds: Rect,
    ) -> WindowHandle {
        self.insert(FakeWindow {
            pid,
            class: class.into(),
            text: text.into(),
            bounds,
            visible: true,
            parent: Some(parent),
            top_level: false,
            refuses_hide: false,
        })
    }

    fn with<R>(&self, handle: WindowHandle, f: impl FnOnce(&mut FakeWindow) -> R) -> R {
        let mut s = self.state.lock().unwrap();
        f(s.windows.get_mut(&handle).expect("unknown fake window"))
    }

    /// Makes every `top_level_windows` call block until [`Self::release`].
    pub fn stall(&self) {
        *self.stalled.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.stalled.lock().unwrap() = false;
        self.unstall.notify_all();
    }

    /// Calls that have blocked on [`Self::stall`] so far.
    pub fn stalled_calls(&self) -> usize {
        self.stalled_calls.load(Ordering::SeqCst)
    }

    fn wait_if_stalled(&self) {
        let stalled = self.stalled.lock().unwrap();
        if *stalled {
            self.stalled_calls.fetch_add(1, Ordering::SeqCst);
        }
        let _released = self.unstall.wait_while(stalled, |s| *s).unwrap();
    }

    pub fn set_text(&self, handle: WindowHandle, text: &str) {
        self.with(handle, |w| w.text = text.into());
    }

    pub fn set_refuses_hide(&self, handle: WindowHandle) {
        self.with(handle, |w| w.refuses_hide = true);
    }

    /// Shows or hides a window behind the engine's back.
    pub fn set_shown(&self, handle: WindowHandle, visible: bool) {
        self.with(handle, |w| w.visible = visible);
    }

    /// Destroys a window (and its subtree).
    pub fn remove(&self, handle: WindowHandle) {
        let mut s = self.state.lock().unwrap();
        let mut doomed = vec![handle];
        while let Some(h) = doomed.pop() {
            s.windows.remove(&h);
            doomed.extend(
                s.windows
                    .iter()
                    .filter(|(_, w)| w.parent == Some(h))
                    .map(|(c, _)| *c),
            );
        }
    }

    /// Simulates the OS handing a destroyed window's handle to a new one.
    pub fn recycle(&self, handle: WindowHandle, pid: u32, class: &str) {
        self.with(handle, |w| {
            w.pid = pid;
            w.class = class.into();
        });
    }

    /// Makes every call of `op` fail until [`Self::heal`].
    pub fn fail(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    pub fn shown(&self, handle: WindowHandle) -> bool {
        self.with(handle, |w| w.visible)
    }

    pub fn text_reads(&self) -> usize {
        self.text_reads.load(Ordering::SeqCst)
    }

    fn read<R>(
        &self,
        op: &'static str,
        handle: WindowHandle,
        f: impl FnOnce(&FakeWindow) -> R,
    ) -> ProviderResult<R> {
        let s = self.state.lock().unwrap();
        if s.failing.contains(op) {
            return Err(ProviderError::new(op, handle, FAKE_ERROR_CODE));
        }
        // ERROR_INVALID_WINDOW_HANDLE
        s.windows
            .get(&handle)
            .map(f)
            .ok_or(ProviderError::new(op, handle, 1400))
    }

    fn write(
        &self,
        op: &'static str,
        handle: WindowHandle,
        mutation: Mutation,
        f: impl FnOnce(&mut FakeWindow),
    ) -> ProviderResult<()> {
        let mut s = self.state.lock().unwrap();
        s.mutations.push(mutation);
        if s.failing.contains(op) {
            return Err(ProviderError::new(op, handle, FAKE_ERROR_CODE));
        }
        let window = s
            .windows
            .get_mut(&handle)
            .ok_or(ProviderError::new(op, handle, 1400))?;
        f(window);
        Ok(())
    }
}

impl WindowProvider for FakeProvider {
    fn top_level_windows(&self) -> ProviderResult<Vec<WindowHandle>> {
        self.wait_if_stalled();
        let s = self.state.lock().unwrap();
        if s.failing.contains("top_level_windows") {
            return Err(ProviderError::new("top_level_windows", WindowHandle(0), FAKE_ERROR_CODE));
        }
        Ok(s.windows
            .iter()
            .filter(|(_, w)| w.top_level)
            .map(|(h, _)| *h)
            .collect())
    }

    fn children(&self, parent: WindowHandle) -> ProviderResult<Vec<WindowHandle>> {
        let s = self.state.lock().unwrap();
        if s.failing.contains("children") {
            return Err(ProviderError::new("children", parent, FAKE_ERROR_CODE));
        }
        Ok(s.windows
            .iter()
            .filter(|(_, w)| w.parent == Some(parent))
            .map(|(h, _)| *h)
            .collect())
    }

    fn process_id(&self, handle: WindowHandle) -> ProviderResult<u32> {
        self.read("process_id", handle, |w| w.pid)
    }

    fn class_name(&self, handle: WindowHandle) -> ProviderResult<String> {
        self.read("class_name", handle, |w| w.class.clone())
    }

    fn text(&self, handle: WindowHandle) -> ProviderResult<String> {
        self.text_reads.fetch_add(1, Ordering::SeqCst);
        self.read("text", handle, |w| w.text.clone())
    }

    fn parent(&self, handle: WindowHandle) -> ProviderResult<Option<WindowHandle>> {
        self.read("parent", handle, |w| w.parent)
    }

    fn bounds(&self, handle: WindowHandle) -> ProviderResult<Rect> {
        self.read("bounds", handle, |w| w.bounds)
    }

    fn is_visible(&self, handle: WindowHandle) -> ProviderResult<bool> {
        self.read("is_visible", handle, |w| w.visible)
    }

    fn set_visible(&self, handle: WindowHandle, visible: bool) -> ProviderResult<()> {
        self.write("set_visible", handle, Mutation::SetVisible(handle, visible), |w| {
            if visible || !w.refuses_hide {
                w.visible = visible;
            }
        })
    }

    fn set_bounds(&self, handle: WindowHandle, bounds: Rect) -> ProviderResult<()> {
        self.write("set_bounds", handle, Mutation::SetBounds(handle, bounds), |w| {
            w.bounds = bounds;
        })
    }

    fn resize(&self, handle: WindowHandle, width: i32, height: i32) -> ProviderResult<()> {
        self.write("resize", handle, Mutation::Resize(handle, width, height), |w| {
            w.bounds.width = width;
            w.bounds.height = height;
        })
    }

    fn is_valid(&self, handle: WindowHandle) -> bool {
        self.state.lock().unwrap().windows.contains_key(&handle)
    }
}

/// Resolver returning a settable pid set.
#[derive(Default)]
pub struct FakeResolver {
    pids: Mutex<BTreeSet<u32>>,
    warning: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new(pids: &[u32]) -> Self {
        Self {
            pids: Mutex::new(pids.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn set(&self, pids: &[u32]) {
        *self.pids.lock().unwrap() = pids.iter().copied().collect();
    }

    pub fn warn(&self, message: &str) {
        *self.warning.lock().unwrap() = Some(message.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProcessResolver for FakeResolver {
    fn current_target_process_ids(&self) -> BTreeSet<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pids.lock().unwrap().clone()
    }

    fn take_warning(&self) -> Option<String> {
        self.warning.lock().unwrap().take()
    }
}
