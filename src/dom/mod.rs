//! DOM access seam.
//!
//! Everything above this module (detector, probes, monitor, heal loop) talks
//! to the portal page through [`PortalDom`], never to chromiumoxide directly:
//! * [`cdp::CdpDom`] — the live page, driven over native Chromium CDP.
//! * [`snapshot::SnapshotDom`] — a captured HTML document (`scraper`), used
//!   for offline flavor diagnosis and tests; geometry is unavailable there.
//!
//! The host page's markup is outside this crate's control, so the read side
//! of the trait degrades instead of failing: an invalid or unmatched selector
//! reads as zero elements / no geometry, never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod browser;
pub mod cdp;
pub mod snapshot;

/// DOM id of the single stylesheet element holding the active CSS patch.
/// Every strategy injection replaces this element's full contents.
pub const PATCH_STYLE_ID: &str = "portal-tuner-patch";

#[derive(Debug, Error)]
pub enum DomError {
    #[error("browser evaluation failed: {0}")]
    Eval(String),
    #[error("patch stylesheet write failed: {0}")]
    StyleWrite(String),
}

/// Border-box geometry of an element, in CSS pixels relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn mid_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Zero-area boxes are what `display: none` elements report.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Read/patch access to one portal page.
///
/// Reads never fail: missing elements and invalid selectors degrade to
/// `0` / `None` / `false`. Only patch-stylesheet writes surface errors,
/// and callers treat those as "strategy could not be applied".
#[async_trait]
pub trait PortalDom: Send + Sync {
    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> usize;

    /// Geometry of the first element matching `selector`, when it has a box.
    async fn geometry(&self, selector: &str) -> Option<Rect>;

    /// Viewport size in CSS pixels, when known.
    async fn viewport(&self) -> Option<(u32, u32)>;

    /// Replace the full contents of the patch stylesheet (id
    /// [`PATCH_STYLE_ID`]), creating the element on first use.
    async fn set_patch_style(&self, css: &str) -> Result<(), DomError>;

    /// Remove the patch stylesheet if present.
    async fn clear_patch_style(&self) -> Result<(), DomError>;

    /// Whether the patch stylesheet currently exists with non-empty content.
    async fn patch_style_active(&self) -> bool;

    /// Install the in-page mutation hook scoped to the element matching
    /// `selector`. Returns `false` when the page (or backend) can't host it.
    async fn install_mutation_hook(&self, selector: &str) -> bool;

    /// Monotonic counter bumped by the mutation hook; `None` when the hook
    /// is not installed or the backend has no live page.
    async fn mutation_ticks(&self) -> Option<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_midpoints_and_visibility() {
        let r = Rect {
            x: 10.0,
            y: 100.0,
            width: 200.0,
            height: 40.0,
        };
        assert_eq!(r.mid_y(), 120.0);
        assert_eq!(r.mid_x(), 110.0);
        assert!(r.is_visible());
        assert!(!Rect::default().is_visible());
    }
}
