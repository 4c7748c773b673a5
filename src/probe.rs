//! Layout probes — named boolean checks over the detected selector set and
//! the live DOM geometry.
//!
//! Probes are pure reads: no probe mutates the page, and a selector that
//! resolves to nothing makes the probe `false` rather than an error (the
//! host markup can change without notice). `run_all` is the only writer of
//! [`LayoutFlags`].

use chrono::Utc;
use tracing::debug;

use crate::core::types::{LayoutFlags, Role, SelectorSet};
use crate::dom::PortalDom;

pub const PROBE_NAV_CENTERED: &str = "nav_centered";
pub const PROBE_SIDEBAR_VISIBLE: &str = "sidebar_visible";
pub const PROBE_DESKTOP_VIEWPORT: &str = "desktop_viewport";
pub const PROBE_ENHANCEMENT_ACTIVE: &str = "enhancement_active";

/// Every named probe, in the order `run_all` evaluates them.
pub const ALL_PROBES: [&str; 4] = [
    PROBE_NAV_CENTERED,
    PROBE_SIDEBAR_VISIBLE,
    PROBE_DESKTOP_VIEWPORT,
    PROBE_ENHANCEMENT_ACTIVE,
];

#[derive(Clone, Debug)]
pub struct ProbeEngine {
    tolerance_px: f64,
    desktop_breakpoint_px: u32,
}

impl ProbeEngine {
    pub fn new(tolerance_px: f64, desktop_breakpoint_px: u32) -> Self {
        Self {
            tolerance_px,
            desktop_breakpoint_px,
        }
    }

    pub fn tolerance_px(&self) -> f64 {
        self.tolerance_px
    }

    /// Run one named probe. Unknown names read as `false`.
    pub async fn run_probe(
        &self,
        name: &str,
        dom: &dyn PortalDom,
        selectors: &SelectorSet,
    ) -> bool {
        match name {
            PROBE_NAV_CENTERED => self.nav_centered(dom, selectors).await,
            PROBE_SIDEBAR_VISIBLE => self.sidebar_visible(dom, selectors).await,
            PROBE_DESKTOP_VIEWPORT => self.desktop_viewport(dom).await,
            PROBE_ENHANCEMENT_ACTIVE => dom.patch_style_active().await,
            other => {
                debug!("run_probe: unknown probe {:?}", other);
                false
            }
        }
    }

    /// Recompute every registered probe. The returned flags replace the
    /// previous set wholesale.
    pub async fn run_all(&self, dom: &dyn PortalDom, selectors: &SelectorSet) -> LayoutFlags {
        let mut flags = LayoutFlags::default();
        for name in ALL_PROBES {
            let value = self.run_probe(name, dom, selectors).await;
            flags.set(name, value);
        }
        flags.computed_at = Some(Utc::now());
        flags
    }

    /// True when the navigation container's vertical midpoint sits within
    /// `tolerance_px` of the main content's midpoint. Either element
    /// missing → `false`.
    async fn nav_centered(&self, dom: &dyn PortalDom, selectors: &SelectorSet) -> bool {
        let Some(nav_sel) = selectors.get(Role::NavigationContainer) else {
            return false;
        };
        let Some(content_sel) = selectors.get(Role::MainContent) else {
            return false;
        };
        let (Some(nav), Some(content)) =
            (dom.geometry(nav_sel).await, dom.geometry(content_sel).await)
        else {
            return false;
        };
        let delta = (nav.mid_y() - content.mid_y()).abs();
        debug!(
            "nav_centered: midpoint delta {:.1}px (tolerance {}px)",
            delta, self.tolerance_px
        );
        delta <= self.tolerance_px
    }

    /// True when the sidebar exists and occupies a non-zero box.
    async fn sidebar_visible(&self, dom: &dyn PortalDom, selectors: &SelectorSet) -> bool {
        let Some(sel) = selectors.get(Role::Sidebar) else {
            return false;
        };
        if dom.count(sel).await == 0 {
            return false;
        }
        dom.geometry(sel).await.is_some_and(|r| r.is_visible())
    }

    /// True at or above the portal's desktop breakpoint.
    async fn desktop_viewport(&self, dom: &dyn PortalDom) -> bool {
        dom.viewport()
            .await
            .is_some_and(|(w, _)| w >= self.desktop_breakpoint_px)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
