//! End-to-end patch-loop properties through the manager: bounded retries,
//! sequential strategy replacement, and stale-cycle cancellation on
//! `force_reapply`.

use std::sync::Arc;
use std::time::Duration;

use portal_tuner::core::registry::FlavorRegistry;
use portal_tuner::core::types::HealOutcome;
use portal_tuner::dom::{PortalDom, Rect};
use portal_tuner::events::{EventBus, TunerEvent};
use portal_tuner::heal::PatchState;
use portal_tuner::manager::{ManagerSettings, PortalContextManager};

mod common;
use common::TestDom;

fn rect_with_mid_y(mid_y: f64) -> Rect {
    Rect {
        x: 0.0,
        y: mid_y - 25.0,
        width: 900.0,
        height: 50.0,
    }
}

/// A TestDom that detects as the classic flavor with nav/content midpoints
/// 100 px apart — centering fails until a strategy heals it.
fn uncentered_classic_dom() -> Arc<TestDom> {
    let dom = Arc::new(TestDom::new());
    dom.set_rect("#navigation", rect_with_mid_y(300.0));
    dom.set_rect("#content", rect_with_mid_y(400.0));
    dom.set_viewport(1280, 900);
    dom
}

fn settings(settle_ms: u64) -> ManagerSettings {
    ManagerSettings {
        settle: Duration::from_millis(settle_ms),
        debounce: Duration::from_millis(10),
        // Keep the monitor quiet during these tests.
        poll: Duration::from_secs(30),
        ..ManagerSettings::default()
    }
}

async fn wait_for_history(
    manager: &PortalContextManager,
    want: usize,
    timeout: Duration,
) -> Vec<portal_tuner::core::types::HealRecord> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let history = manager.heal_history();
        if history.len() >= want {
            return history;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {want} heal record(s), have {}",
            history.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// No strategy can center this DOM: the cycle must stop after exactly
/// `max_patch_attempts` strategies, report failure, and revert the patch.
#[tokio::test]
async fn hopeless_layout_fails_after_max_attempts() {
    let dom = uncentered_classic_dom();
    let manager = PortalContextManager::start(
        Arc::clone(&dom) as Arc<dyn PortalDom>,
        Arc::new(FlavorRegistry::builtin()),
        EventBus::default(),
        settings(2),
    )
    .await;

    let history = wait_for_history(&manager, 1, Duration::from_secs(2)).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, HealOutcome::Failed { attempts: 3 });
    assert_eq!(manager.patch_state(), PatchState::Failed);
    assert!(
        dom.current_patch().is_none(),
        "exhaustion must revert to the native layout"
    );
    manager.destroy().await;
}

/// The second strategy (grid) heals the layout: exactly two stylesheets are
/// applied in order, the second replacing the first, and the winner stays.
#[tokio::test]
async fn second_strategy_heals_and_stays_applied() {
    let dom = uncentered_classic_dom();
    // Layout becomes centered only while the grid strategy's CSS is live.
    dom.heal_when_css_contains("display: grid", "#navigation", rect_with_mid_y(400.0));

    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let manager = PortalContextManager::start(
        Arc::clone(&dom) as Arc<dyn PortalDom>,
        Arc::new(FlavorRegistry::builtin()),
        bus,
        settings(2),
    )
    .await;

    let history = wait_for_history(&manager, 1, Duration::from_secs(2)).await;
    assert_eq!(
        history[0].outcome,
        HealOutcome::Applied {
            strategy: "grid".to_string(),
            attempts: 2
        }
    );
    assert_eq!(
        manager.patch_state(),
        PatchState::Applied {
            strategy: "grid".to_string()
        }
    );
    // The winning stylesheet stays, alone — flexbox was replaced, not stacked.
    let css = dom.current_patch().expect("winning strategy stays applied");
    assert!(css.contains("display: grid"));
    assert!(!css.contains("display: flex"));

    // Event order: readiness first, then the apply notification.
    let mut saw_ready = false;
    loop {
        let envelope = rx.recv().await.expect("event stream open");
        match envelope.event {
            TunerEvent::ManagerReady { .. } => saw_ready = true,
            TunerEvent::PatchApplied { strategy, attempts, .. } => {
                assert!(saw_ready, "readiness must precede the apply event");
                assert_eq!(strategy, "grid");
                assert_eq!(attempts, 2);
                break;
            }
            _ => {}
        }
    }
    manager.destroy().await;
}

/// `force_reapply` mid-cycle aborts the in-flight cycle: its pending
/// validation never fires, so only the replacement cycle records an outcome.
#[tokio::test]
async fn force_reapply_cancels_the_inflight_cycle() {
    let dom = uncentered_classic_dom();
    // Long settle keeps the first cycle parked inside its first validation
    // delay while we yank it.
    let manager = PortalContextManager::start(
        Arc::clone(&dom) as Arc<dyn PortalDom>,
        Arc::new(FlavorRegistry::builtin()),
        EventBus::default(),
        settings(150),
    )
    .await;

    // First strategy injected, first settle pending.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dom.current_patch().is_some());

    manager.force_reapply();

    // Only the restarted cycle may complete; the aborted one must not have
    // committed anything.
    let history = wait_for_history(&manager, 1, Duration::from_secs(3)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let history_after = manager.heal_history();
    assert_eq!(history_after.len(), history.len());
    assert_eq!(history_after.len(), 1, "exactly one cycle may record an outcome");
    assert_eq!(history_after[0].outcome, HealOutcome::Failed { attempts: 3 });
    manager.destroy().await;
}

/// `destroy` mid-cycle drops the cycle entirely — no outcome is recorded
/// afterwards.
#[tokio::test]
async fn destroy_mid_cycle_records_nothing() {
    let dom = uncentered_classic_dom();
    let manager = PortalContextManager::start(
        Arc::clone(&dom) as Arc<dyn PortalDom>,
        Arc::new(FlavorRegistry::builtin()),
        EventBus::default(),
        settings(150),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.destroy().await;
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(manager.heal_history().is_empty());
    assert!(manager.context().is_none());
}
