//! Monitor properties: bursts of DOM/viewport changes collapse into a single
//! recomputation, and teardown is idempotent with no trailing callbacks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portal_tuner::monitor::DynamicMonitor;

mod common;
use common::TestDom;

fn counting_monitor(
    dom: Arc<TestDom>,
    poll_ms: u64,
    debounce_ms: u64,
) -> (DynamicMonitor, Arc<AtomicU32>) {
    let runs = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&runs);
    let monitor = DynamicMonitor::spawn(
        dom,
        Duration::from_millis(poll_ms),
        Duration::from_millis(debounce_ms),
        move || {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        },
    );
    (monitor, runs)
}

/// Ten mutation bumps inside one debounce window produce exactly one
/// recomputation.
#[tokio::test]
async fn mutation_burst_collapses_to_one_recompute() {
    let dom = Arc::new(TestDom::new());
    dom.set_viewport(1280, 900);
    let (monitor, runs) = counting_monitor(Arc::clone(&dom), 5, 60);

    for _ in 0..10 {
        dom.bump_mutations();
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    monitor.destroy();
}

/// A viewport change alone also triggers a recomputation.
#[tokio::test]
async fn viewport_change_triggers_recompute() {
    let dom = Arc::new(TestDom::new());
    dom.set_viewport(1280, 900);
    let (monitor, runs) = counting_monitor(Arc::clone(&dom), 5, 30);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0, "no change, no recompute");

    dom.set_viewport(800, 600);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    monitor.destroy();
}

/// After `destroy`, pending and future triggers never fire the callback;
/// calling `destroy` twice is safe.
#[tokio::test]
async fn destroy_is_idempotent_and_silences_callbacks() {
    let dom = Arc::new(TestDom::new());
    dom.set_viewport(1280, 900);
    let (monitor, runs) = counting_monitor(Arc::clone(&dom), 5, 50);

    dom.bump_mutations();
    tokio::time::sleep(Duration::from_millis(20)).await; // trigger seen, debounce pending
    monitor.destroy();
    monitor.destroy();

    dom.bump_mutations();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
