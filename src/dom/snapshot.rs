//! Offline [`PortalDom`] over a captured HTML document.
//!
//! Powers the `POST /detect` dry-run endpoint and the detector tests:
//! selector matching runs against a `scraper` parse of the snapshot, while
//! geometry, viewport, and the mutation hook report "not applicable" — a
//! static document has no layout, so geometry probes correctly read `false`
//! instead of guessing.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Mutex;

use super::{DomError, PortalDom, Rect};

pub struct SnapshotDom {
    html: String,
    // Recorded rather than rendered; lets callers inspect what a patch
    // cycle would have written against this snapshot.
    patch_css: Mutex<Option<String>>,
}

impl SnapshotDom {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            patch_css: Mutex::new(None),
        }
    }

    /// The CSS last written through `set_patch_style`, if any.
    pub fn recorded_patch(&self) -> Option<String> {
        self.patch_css.lock().expect("patch lock poisoned").clone()
    }
}

#[async_trait]
impl PortalDom for SnapshotDom {
    async fn count(&self, selector: &str) -> usize {
        // `Html` is parsed per call and stays on this stack frame: the
        // parse tree is not Send and must not be held across an await.
        let Ok(parsed) = Selector::parse(selector) else {
            return 0;
        };
        let document = Html::parse_document(&self.html);
        document.select(&parsed).count()
    }

    async fn geometry(&self, _selector: &str) -> Option<Rect> {
        None
    }

    async fn viewport(&self) -> Option<(u32, u32)> {
        None
    }

    async fn set_patch_style(&self, css: &str) -> Result<(), DomError> {
        *self.patch_css.lock().expect("patch lock poisoned") = Some(css.to_string());
        Ok(())
    }

    async fn clear_patch_style(&self) -> Result<(), DomError> {
        *self.patch_css.lock().expect("patch lock poisoned") = None;
        Ok(())
    }

    async fn patch_style_active(&self) -> bool {
        self.patch_css
            .lock()
            .expect("patch lock poisoned")
            .as_deref()
            .is_some_and(|css| !css.trim().is_empty())
    }

    async fn install_mutation_hook(&self, _selector: &str) -> bool {
        false
    }

    async fn mutation_ticks(&self) -> Option<u64> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
