use std::collections::HashSet;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::fake::{FakeProvider, FakeResolver, Mutation};
use crate::scheduler::SchedulerMode;
use crate::{Rect, WindowHandle};

const PID: u32 = 100;

struct Scene {
    main: WindowHandle,
    view: WindowHandle,
    ad: WindowHandle,
}

/// Main window with a chat list view, plus a legacy ad container whose
/// embedded web view carries the signature.
fn kakao(provider: &FakeProvider) -> Scene {
    let main = provider.add_top_level(PID, "EVA_Window_Dblclk", "카카오톡", Rect::new(0, 0, 400, 700));
    let view = provider.add_child(main, PID, "EVA_ChildWindow", "OnlineMainView_0x1", Rect::new(0, 0, 398, 569));
    provider.add_child(view, PID, "_EVA_CustomScrollCtrl", "", Rect::new(380, 0, 18, 569));
    let ad = provider.add_top_level(PID, "EVA_Window_Dblclk", "", Rect::new(0, 600, 400, 100));
    provider.add_child(ad, PID, "Chrome_WidgetWin_1", "Chrome Legacy Window", Rect::new(0, 600, 400, 100));
    Scene { main, view, ad }
}

fn engine(provider: &Arc<FakeProvider>, resolver: &Arc<FakeResolver>, settings: Settings) -> Engine {
    Engine::new(provider.clone(), resolver.clone(), settings, RuleSet::default())
}

fn tick(engine: &Engine) {
    let mut looping = lock(&engine.inner.looping);
    engine.inner.tick(&mut looping);
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

// -- lifecycle --

#[test]
fn warm_up_hides_ad_before_start_returns() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());

    // Act
    engine.start().unwrap();

    // Assert
    assert!(!provider.shown(scene.ad));
    let state = engine.state();
    assert!(state.running);
    assert_eq!(state.hidden_windows, 1);
    assert_eq!(state.main_window_count, 1);
    assert_eq!(state.target_process_count, 1);
    engine.stop();
}

#[test]
fn start_resizes_content_view() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());

    engine.start().unwrap();
    engine.stop();

    assert_eq!(provider.bounds(scene.view).unwrap(), Rect::new(0, 0, 398, 669));
    assert!(provider.shown(scene.main));
}

#[test]
fn stop_restores_hidden_windows() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    engine.start().unwrap();

    // Act
    engine.stop();

    // Assert
    assert!(provider.shown(scene.ad));
    let state = engine.state();
    assert!(!state.running);
    assert_eq!(state.hidden_windows, 0);
}

#[test]
fn control_calls_return_after_stuck_worker_is_detached() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let mut settings = Settings::default();
    settings.timing.stop_timeout_ms = 100;
    let engine = Arc::new(engine(&provider, &resolver, settings));
    engine.start().unwrap();
    provider.stall();
    wait_until("worker to block", || provider.stalled_calls() > 0);
    engine.stop();

    // Act
    let (done_tx, done_rx) = mpsc::channel();
    let caller = Arc::clone(&engine);
    thread::spawn(move || {
        caller.set_enabled(false);
        caller.set_aggressive_mode(true);
        caller.reset_restore_failures();
        caller.notify_activity();
        let _ = done_tx.send(());
    });
    let returned = done_rx.recv_timeout(Duration::from_secs(2)).is_ok();
    let state = engine.state();
    provider.release();

    // Assert
    assert!(returned, "control calls blocked behind the detached worker");
    assert!(!state.enabled);
    assert!(state.aggressive_mode);
    assert!(!state.running);
    assert!(state.last_error.unwrap().contains("did not stop"));
    assert!(provider.shown(scene.ad));
}

#[test]
fn restart_after_detach_runs_a_single_worker() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    let mut settings = Settings::default();
    settings.timing.stop_timeout_ms = 100;
    let engine = engine(&provider, &resolver, settings);
    engine.start().unwrap();
    provider.stall();
    wait_until("worker to block", || provider.stalled_calls() > 0);
    engine.stop();
    provider.release();

    // Act
    engine.start().unwrap();
    let stopped_at = Instant::now();
    engine.stop();

    // Assert
    assert!(stopped_at.elapsed() < Duration::from_millis(100));
    assert!(!engine.state().running);
}

#[test]
fn stop_never_shows_a_recycled_handle() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    engine.start().unwrap();
    provider.recycle(scene.ad, 200, "EVA_Window_Dblclk");

    // Act
    engine.stop();

    // Assert
    assert!(!provider.shown(scene.ad));
    assert!(!provider.mutations().contains(&Mutation::SetVisible(scene.ad, true)));
}

#[test]
fn disabling_restores_while_running() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    engine.start().unwrap();

    // Act
    engine.set_enabled(false);

    // Assert
    wait_until("ad restored", || provider.shown(scene.ad));
    wait_until("state to catch up", || engine.state().hidden_windows == 0);
    assert!(!engine.state().enabled);
    assert!(engine.state().running);
    engine.stop();
}

#[test]
fn disabling_without_worker_restores_inline() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    tick(&engine);
    assert!(!provider.shown(scene.ad));

    // Act
    engine.set_enabled(false);

    // Assert
    assert!(provider.shown(scene.ad));
}

#[test]
fn disabled_engine_classifies_but_never_mutates() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    let settings = Settings {
        enabled: false,
        ..Default::default()
    };
    let engine = engine(&provider, &resolver, settings);

    tick(&engine);

    assert!(provider.mutations().is_empty());
    assert_eq!(engine.state().main_window_count, 1);
}

// -- targeting --

#[test]
fn other_processes_are_never_touched() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let stranger = provider.add_top_level(999, "EVA_Window_Dblclk", "Chrome Legacy Window", Rect::new(0, 0, 100, 100));
    let engine = engine(&provider, &resolver, Settings::default());

    // Act
    tick(&engine);

    // Assert
    assert!(provider.shown(stranger));
    assert!(provider.mutations().is_empty());
}

#[test]
fn nothing_happens_while_target_is_not_running() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[]));
    kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());

    tick(&engine);

    assert!(provider.mutations().is_empty());
    assert_eq!(engine.state().target_process_count, 0);
}

#[test]
fn pid_scan_is_throttled() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());

    // Act
    for _ in 0..5 {
        tick(&engine);
    }

    // Assert
    assert_eq!(resolver.calls(), 1);
}

#[test]
fn resolver_warning_is_surfaced() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[]));
    resolver.warn("toolhelp snapshot failed; tasklist fallback also failed");
    let engine = engine(&provider, &resolver, Settings::default());

    tick(&engine);

    assert_eq!(
        engine.state().last_error.as_deref(),
        Some("toolhelp snapshot failed; tasklist fallback also failed")
    );
}

// -- child heuristics --

#[test]
fn empty_content_child_is_hidden_unless_custom_scroll_present() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let main = provider.add_top_level(PID, "EVA_Window_Dblclk", "카카오톡", Rect::new(0, 0, 400, 700));
    provider.add_child(main, PID, "EVA_ChildWindow", "OnlineMainView_0x1", Rect::new(0, 0, 398, 669));
    let empty = provider.add_child(main, PID, "EVA_ChildWindow", "", Rect::new(0, 600, 400, 100));
    let engine = engine(&provider, &resolver, Settings::default());

    // Act
    tick(&engine);

    // Assert
    assert!(!provider.shown(empty));
}

#[test]
fn empty_content_child_is_kept_with_custom_scroll() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let empty = provider.add_child(scene.main, PID, "EVA_ChildWindow", "", Rect::new(0, 600, 400, 100));
    let engine = engine(&provider, &resolver, Settings::default());

    tick(&engine);

    assert!(provider.shown(empty));
}

#[test]
fn banner_is_hidden_only_in_aggressive_mode() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let banner = provider.add_child(scene.main, PID, "Chrome_WidgetWin_1", "", Rect::new(0, 600, 400, 100));
    let engine = engine(&provider, &resolver, Settings::default());

    // Act / Assert
    tick(&engine);
    assert!(provider.shown(banner));

    engine.set_aggressive_mode(true);
    tick(&engine);
    assert!(!provider.shown(banner));
    assert!(engine.state().aggressive_mode);
}

#[test]
fn reloaded_rules_take_effect_next_tick() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let odd = provider.add_top_level(PID, "PopupHost", "Sponsored", Rect::new(0, 0, 300, 200));
    let engine = engine(&provider, &resolver, Settings::default());
    tick(&engine);
    assert!(provider.shown(odd));

    // Act
    engine.reload_rules(RuleSet {
        ad_candidate_classes: vec!["PopupHost".into()],
        chrome_legacy_title_contains: vec!["Sponsored".into()],
        ..Default::default()
    });
    tick(&engine);

    // Assert
    assert!(!provider.shown(odd));
}

// -- failures --

#[test]
fn failed_restore_is_counted_and_reset() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    engine.start().unwrap();
    provider.fail("set_visible");

    // Act
    engine.stop();

    // Assert
    let state = engine.state();
    assert_eq!(state.restore_failures, 1);
    assert!(state.last_restore_error.is_some());
    assert_eq!(state.hidden_windows, 1);

    engine.reset_restore_failures();
    let state = engine.state();
    assert_eq!(state.restore_failures, 0);
    assert!(state.last_restore_error.is_none());
    assert_eq!(state.hidden_windows, 0);
}

#[test]
fn failed_restore_is_retried_while_disabled() {
    // Arrange
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    let scene = kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());
    tick(&engine);
    provider.fail("set_visible");
    engine.set_enabled(false);
    assert!(!provider.shown(scene.ad));

    // Act
    provider.heal("set_visible");
    tick(&engine);

    // Assert
    assert!(provider.shown(scene.ad));
    assert_eq!(engine.state().restore_failures, 1);
}

#[test]
fn provider_errors_are_recorded_not_propagated() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    provider.fail("top_level_windows");
    let engine = engine(&provider, &resolver, Settings::default());

    tick(&engine);

    assert!(engine.state().last_error.unwrap().contains("top_level_windows"));
}

// -- scheduling --

#[test]
fn scheduler_decays_to_idle_when_nothing_changes() {
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    let engine = engine(&provider, &resolver, Settings::default());

    engine.start().unwrap();

    wait_until("idle mode", || engine.state().mode == SchedulerMode::Idle);
    engine.notify_activity();
    wait_until("active mode", || engine.state().mode == SchedulerMode::Active);
    engine.stop();
}

// -- concurrency --

#[test]
fn concurrent_warnings_and_tick_errors_do_not_race() {
    // Arrange: every tick fails reading the main window bounds, so the
    // worker keeps writing last_error while the threads below do too.
    let provider = Arc::new(FakeProvider::new());
    let resolver = Arc::new(FakeResolver::new(&[PID]));
    kakao(&provider);
    provider.fail("bounds");
    let engine = Arc::new(engine(&provider, &resolver, Settings::default()));
    engine.start().unwrap();

    // Act
    let writers: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    engine.report_warning(format!("warning {t}-{i}"));
                    if i % 50 == 0 {
                        engine.notify_activity();
                    }
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    engine.stop();

    // Assert
    let written: HashSet<String> = (0..8)
        .flat_map(|t| (0..200).map(move |i| format!("warning {t}-{i}")))
        .collect();
    let last = engine.state().last_error.unwrap();
    assert!(
        written.contains(&last) || last.contains("bounds"),
        "unexpected last_error: {last}"
    );
}
