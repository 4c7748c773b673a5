//! Shared test double: a [`PortalDom`] with scriptable selector counts and
//! geometry, so detection, probing, and healing can be exercised without a
//! browser.
#![allow(dead_code)] // not every suite uses every knob

use async_trait::async_trait;
use portal_tuner::dom::{DomError, PortalDom, Rect};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct TestDom {
    counts: Mutex<HashMap<String, usize>>,
    rects: Mutex<HashMap<String, Rect>>,
    viewport: Mutex<Option<(u32, u32)>>,
    patch: Mutex<Option<String>>,
    ticks: AtomicU64,
    /// When set to `(marker, selector, rect)`: while the applied patch CSS
    /// contains `marker`, `geometry(selector)` reports `rect` instead of the
    /// stored one — simulates a strategy that actually fixes the layout.
    healed_by: Mutex<Option<(String, String, Rect)>>,
}

impl TestDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, selector: &str, count: usize) {
        self.counts.lock().unwrap().insert(selector.to_string(), count);
    }

    pub fn set_rect(&self, selector: &str, rect: Rect) {
        self.rects.lock().unwrap().insert(selector.to_string(), rect);
        // An element with geometry also matches its selector.
        let mut counts = self.counts.lock().unwrap();
        counts.entry(selector.to_string()).or_insert(1);
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        *self.viewport.lock().unwrap() = Some((width, height));
    }

    pub fn clear_viewport(&self) {
        *self.viewport.lock().unwrap() = None;
    }

    pub fn bump_mutations(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    pub fn heal_when_css_contains(&self, marker: &str, selector: &str, rect: Rect) {
        *self.healed_by.lock().unwrap() =
            Some((marker.to_string(), selector.to_string(), rect));
    }

    pub fn current_patch(&self) -> Option<String> {
        self.patch.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalDom for TestDom {
    async fn count(&self, selector: &str) -> usize {
        self.counts.lock().unwrap().get(selector).copied().unwrap_or(0)
    }

    async fn geometry(&self, selector: &str) -> Option<Rect> {
        if let Some((marker, healed_sel, healed_rect)) = self.healed_by.lock().unwrap().clone() {
            let patched = self
                .patch
                .lock()
                .unwrap()
                .as_deref()
                .is_some_and(|css| css.contains(&marker));
            if patched && selector == healed_sel {
                return Some(healed_rect);
            }
        }
        self.rects.lock().unwrap().get(selector).copied()
    }

    async fn viewport(&self) -> Option<(u32, u32)> {
        *self.viewport.lock().unwrap()
    }

    async fn set_patch_style(&self, css: &str) -> Result<(), DomError> {
        *self.patch.lock().unwrap() = Some(css.to_string());
        Ok(())
    }

    async fn clear_patch_style(&self) -> Result<(), DomError> {
        *self.patch.lock().unwrap() = None;
        Ok(())
    }

    async fn patch_style_active(&self) -> bool {
        self.patch
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|css| !css.trim().is_empty())
    }

    async fn install_mutation_hook(&self, _selector: &str) -> bool {
        true
    }

    async fn mutation_ticks(&self) -> Option<u64> {
        Some(self.ticks.load(Ordering::SeqCst))
    }
}
