//! Portal context manager — the one explicit context object.
//!
//! Owns the detected context, the layout flags, the monitor, and the patch
//! loop. Constructed once and shared by `Arc`; other components integrate
//! through the typed [`EventBus`] and the accessors here rather than poking
//! shared globals.
//!
//! Lifecycle: context is detected at `start` (and re-detected by
//! `reinitialize` after a `destroy`); flags are recomputed for the page's
//! lifetime; patch-cycle state lives only for the duration of one cycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::registry::FlavorRegistry;
use crate::core::types::{DetectedContext, HealRecord, LayoutFlags, Role, SelectorSet};
use crate::detect::Detector;
use crate::dom::PortalDom;
use crate::events::{EventBus, TunerEvent};
use crate::heal::{try_in_order, PatchState, CENTERING_STRATEGIES};
use crate::monitor::DynamicMonitor;
use crate::probe::{ProbeEngine, PROBE_NAV_CENTERED};

const HEAL_HISTORY_LIMIT: usize = 100;

/// Tunables resolved from [`crate::core::config::TunerConfig`] at startup.
#[derive(Clone, Debug)]
pub struct ManagerSettings {
    pub tolerance_px: f64,
    pub desktop_breakpoint_px: u32,
    pub debounce: Duration,
    pub poll: Duration,
    pub settle: Duration,
    pub max_patch_attempts: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            tolerance_px: 3.0,
            desktop_breakpoint_px: 992,
            debounce: Duration::from_millis(250),
            poll: Duration::from_millis(250),
            settle: Duration::from_millis(400),
            max_patch_attempts: 3,
        }
    }
}

pub struct PortalContextManager {
    inner: Arc<ManagerInner>,
    monitor: Mutex<Option<DynamicMonitor>>,
}

struct ManagerInner {
    dom: Arc<dyn PortalDom>,
    detector: Detector,
    probes: ProbeEngine,
    bus: EventBus,
    settings: ManagerSettings,
    context: RwLock<Option<DetectedContext>>,
    flags: RwLock<LayoutFlags>,
    patch_state: RwLock<PatchState>,
    heal_history: Mutex<VecDeque<HealRecord>>,
    // Cycle generation: bumped on every new cycle and on destroy, so an
    // aborted cycle can never commit a stale outcome.
    heal_generation: AtomicU64,
    heal_task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl PortalContextManager {
    /// Detect the portal context, run the initial probe pass, start the
    /// monitor, and kick a heal cycle if the centering probe already fails.
    pub async fn start(
        dom: Arc<dyn PortalDom>,
        registry: Arc<FlavorRegistry>,
        bus: EventBus,
        settings: ManagerSettings,
    ) -> Arc<Self> {
        let inner = Arc::new(ManagerInner {
            dom,
            detector: Detector::new(registry),
            probes: ProbeEngine::new(settings.tolerance_px, settings.desktop_breakpoint_px),
            bus,
            settings,
            context: RwLock::new(None),
            flags: RwLock::new(LayoutFlags::default()),
            patch_state: RwLock::new(PatchState::Idle),
            heal_history: Mutex::new(VecDeque::new()),
            heal_generation: AtomicU64::new(0),
            heal_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });
        let manager = Arc::new(Self {
            inner,
            monitor: Mutex::new(None),
        });
        manager.reinitialize().await;
        manager
    }

    /// (Re-)run detection and bring the monitor up. Also the explicit
    /// re-init path after `destroy`.
    pub async fn reinitialize(self: &Arc<Self>) {
        let inner = &self.inner;
        inner.destroyed.store(false, Ordering::SeqCst);

        let ctx = inner.detector.detect(inner.dom.as_ref()).await;
        if let Some(content_sel) = ctx.selectors.get(Role::MainContent) {
            inner.dom.install_mutation_hook(content_sel).await;
        }
        *inner.context.write().unwrap() = Some(ctx.clone());

        // Initial probe pass, before announcing readiness.
        let flags = inner.probes.run_all(inner.dom.as_ref(), &ctx.selectors).await;
        let centered = flags.get(PROBE_NAV_CENTERED);
        *inner.flags.write().unwrap() = flags;

        inner.bus.emit(TunerEvent::ManagerReady {
            flavor: ctx.flavor.clone(),
            fallback: ctx.fallback,
            fingerprint: ctx.fingerprint.clone(),
        });
        info!(
            "manager ready: flavor={} fallback={} centered={}",
            ctx.flavor, ctx.fallback, centered
        );

        if !centered {
            inner.spawn_heal_cycle(false);
        }

        let monitor_inner = Arc::clone(inner);
        let monitor = DynamicMonitor::spawn(
            Arc::clone(&inner.dom),
            inner.settings.poll,
            inner.settings.debounce,
            move || {
                let inner = Arc::clone(&monitor_inner);
                async move {
                    inner.revalidate().await;
                }
            },
        );
        if let Some(old) = self.monitor.lock().unwrap().replace(monitor) {
            old.destroy();
        }
    }

    /// Current detected context, if the manager is initialized.
    pub fn context(&self) -> Option<DetectedContext> {
        self.inner.context.read().unwrap().clone()
    }

    /// Snapshot of the current layout flags.
    pub fn flags(&self) -> LayoutFlags {
        self.inner.flags.read().unwrap().clone()
    }

    /// Observable patch-loop position.
    pub fn patch_state(&self) -> PatchState {
        self.inner.patch_state.read().unwrap().clone()
    }

    /// Most recent heal outcomes, newest last. Bounded ring.
    pub fn heal_history(&self) -> Vec<HealRecord> {
        self.inner.heal_history.lock().unwrap().iter().cloned().collect()
    }

    /// Manual revalidation trigger; collapsed by the monitor's debouncer.
    pub fn nudge(&self) {
        if let Some(monitor) = self.monitor.lock().unwrap().as_ref() {
            monitor.notify();
        }
    }

    /// Reset the patch loop and restart the whole cycle regardless of its
    /// current state. Cancels any in-flight validation timer so two cycles
    /// never race on the patch stylesheet.
    pub fn force_reapply(&self) {
        info!("force_reapply: restarting patch cycle");
        self.inner.spawn_heal_cycle(true);
    }

    /// Tear down: stop the monitor, cancel any heal cycle, clear context,
    /// fingerprint, and flags. Idempotent — safe to call twice. The last
    /// applied patch stylesheet is left in the page; re-init replaces it.
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            debug!("destroy: already destroyed");
            return;
        }
        if let Some(monitor) = self.monitor.lock().unwrap().take() {
            monitor.destroy();
        }
        // Invalidate any in-flight cycle before aborting it.
        self.inner.heal_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.heal_task.lock().unwrap().take() {
            handle.abort();
        }
        *self.inner.context.write().unwrap() = None;
        *self.inner.flags.write().unwrap() = LayoutFlags::default();
        *self.inner.patch_state.write().unwrap() = PatchState::Idle;
        info!("manager destroyed");
    }
}

impl ManagerInner {
    fn selectors(&self) -> Option<SelectorSet> {
        self.context
            .read()
            .unwrap()
            .as_ref()
            .map(|c| c.selectors.clone())
    }

    /// Recompute every probe, publish the flags, and kick the heal loop when
    /// centering regressed. Runs once per collapsed monitor burst.
    async fn revalidate(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let Some(selectors) = self.selectors() else {
            return;
        };
        let flags = self.probes.run_all(self.dom.as_ref(), &selectors).await;
        let centered = flags.get(PROBE_NAV_CENTERED);
        *self.flags.write().unwrap() = flags.clone();
        self.bus.emit(TunerEvent::LayoutRevalidated { flags });

        if !centered {
            self.spawn_heal_cycle(false);
        }
    }

    /// Start a heal cycle unless one is already in flight (`force` replaces
    /// an in-flight cycle). The previous cycle's task is aborted *after* the
    /// generation bump, so its pending validation can never commit.
    fn spawn_heal_cycle(self: &Arc<Self>, force: bool) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut guard = self.heal_task.lock().unwrap();
            if let Some(handle) = guard.as_ref() {
                if !handle.is_finished() && !force {
                    debug!("heal: cycle already in flight, not starting another");
                    return;
                }
            }
            let generation = self.heal_generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(old) = guard.take() {
                old.abort();
            }

            let inner = Arc::clone(self);
            let handle = tokio::spawn(async move {
                inner.run_heal_cycle(generation, force).await;
            });
            *guard = Some(handle);
        }
    }

    async fn run_heal_cycle(self: Arc<Self>, generation: u64, reset_first: bool) {
        let Some(selectors) = self.selectors() else {
            return;
        };

        if reset_first {
            // forceReapply starts from a clean slate: native layout, then
            // strategy 0.
            let _ = self.dom.clear_patch_style().await;
            *self.patch_state.write().unwrap() = PatchState::Idle;
        }

        let probes = self.probes.clone();
        let dom = Arc::clone(&self.dom);
        let validate_selectors = selectors.clone();
        let validate = move || {
            let probes = probes.clone();
            let dom = Arc::clone(&dom);
            let selectors = validate_selectors.clone();
            async move {
                probes
                    .run_probe(PROBE_NAV_CENTERED, dom.as_ref(), &selectors)
                    .await
            }
        };

        let state_inner = Arc::clone(&self);
        let outcome = try_in_order(
            self.dom.as_ref(),
            &selectors,
            CENTERING_STRATEGIES,
            validate,
            self.settings.max_patch_attempts,
            self.settings.settle,
            move |state| {
                *state_inner.patch_state.write().unwrap() = state;
            },
        )
        .await;

        // A newer cycle (or destroy) superseded this one while it was
        // finishing — its verdict is stale and must not be recorded.
        if self.heal_generation.load(Ordering::SeqCst) != generation {
            debug!("heal: cycle {} superseded, dropping outcome", generation);
            return;
        }

        if let Some(event) = TunerEvent::from_outcome(PROBE_NAV_CENTERED, &outcome) {
            self.bus.emit(event);
        }
        let mut history = self.heal_history.lock().unwrap();
        history.push_back(HealRecord {
            probe: PROBE_NAV_CENTERED.to_string(),
            outcome,
            timestamp: Utc::now(),
        });
        while history.len() > HEAL_HISTORY_LIMIT {
            history.pop_front();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
