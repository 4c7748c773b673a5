//! Dynamic monitor — keeps layout flags fresh without excessive recomputation.
//!
//! Two pieces:
//! * [`Debouncer`] — a single-owner debounce task: triggers collapse into one
//!   action per quiet period (last-writer-wins timer reset, not a queue).
//!   The "at most one pending recomputation" invariant is structural — only
//!   the debounce task owns the timer.
//! * [`DynamicMonitor`] — polls the page for viewport changes and in-page
//!   mutation ticks (the hook is scoped to the main-content element) and
//!   feeds the debouncer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dom::PortalDom;

// ─────────────────────────────────────────────────────────────────────────────
// Debouncer
// ─────────────────────────────────────────────────────────────────────────────

pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the debounce task: after the first trigger, wait until no new
    /// trigger arrives for `delay`, then run `action` once.
    pub fn spawn<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                // Block until a burst starts.
                if rx.recv().await.is_none() {
                    return;
                }
                // Collapse the burst: every further trigger resets the timer.
                loop {
                    match tokio::time::timeout(delay, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break, // quiet period elapsed
                    }
                }
                action().await;
            }
        });
        Self { tx, task }
    }

    /// Register a trigger. Never blocks; sends after shutdown are ignored.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    /// Cancel the debounce task, dropping any pending action.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DynamicMonitor
// ─────────────────────────────────────────────────────────────────────────────

pub struct DynamicMonitor {
    debouncer: Arc<Debouncer>,
    watch_task: JoinHandle<()>,
    destroyed: AtomicBool,
}

impl DynamicMonitor {
    /// Start watching `dom`. `on_quiet` runs once per collapsed burst of
    /// viewport/mutation changes — the manager wires it to a full probe
    /// recomputation.
    pub fn spawn<F, Fut>(
        dom: Arc<dyn PortalDom>,
        poll: Duration,
        debounce: Duration,
        on_quiet: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let debouncer = Arc::new(Debouncer::spawn(debounce, on_quiet));

        let watcher_debouncer = Arc::clone(&debouncer);
        let watch_task = tokio::spawn(async move {
            let mut last_viewport = dom.viewport().await;
            let mut last_ticks = dom.mutation_ticks().await;
            loop {
                tokio::time::sleep(poll).await;

                let viewport = dom.viewport().await;
                let ticks = dom.mutation_ticks().await;

                if viewport != last_viewport {
                    debug!("monitor: viewport changed {:?} → {:?}", last_viewport, viewport);
                    last_viewport = viewport;
                    watcher_debouncer.notify();
                }
                if ticks != last_ticks {
                    debug!("monitor: mutation ticks {:?} → {:?}", last_ticks, ticks);
                    last_ticks = ticks;
                    watcher_debouncer.notify();
                }
            }
        });

        Self {
            debouncer,
            watch_task,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Manual trigger; collapsed by the debouncer like any polled change.
    pub fn notify(&self) {
        if !self.destroyed.load(Ordering::SeqCst) {
            self.debouncer.notify();
        }
    }

    /// Stop watching: aborts the poll task and the debounce task, dropping
    /// any pending recomputation. Safe to call more than once.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.watch_task.abort();
        self.debouncer.shutdown();
    }
}

impl Drop for DynamicMonitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Ten triggers inside one debounce window collapse into a single
    /// action run.
    #[tokio::test]
    async fn burst_collapses_to_one_action() {
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let debouncer = Debouncer::spawn(Duration::from_millis(30), move || {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        for _ in 0..10 {
            debouncer.notify();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    /// Two bursts separated by a quiet period run the action twice.
    #[tokio::test]
    async fn separate_bursts_run_separately() {
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let debouncer = Debouncer::spawn(Duration::from_millis(20), move || {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        debouncer.notify();
        tokio::time::sleep(Duration::from_millis(80)).await;
        debouncer.notify();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    /// Shutdown cancels a pending action and is idempotent.
    #[tokio::test]
    async fn shutdown_drops_pending_action() {
        let runs = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&runs);
        let debouncer = Debouncer::spawn(Duration::from_millis(50), move || {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
            }
        });

        debouncer.notify();
        debouncer.shutdown();
        debouncer.shutdown();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
