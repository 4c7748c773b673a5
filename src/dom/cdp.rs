//! Live-page [`PortalDom`] backed by a chromiumoxide [`Page`].
//!
//! Every read is a small JS evaluation wrapped in a page-side `try/catch`:
//! the portal's markup can change under us at any time, so an element that
//! vanished or a selector the engine rejects reads as "absent", never as an
//! error that crosses the trait boundary.

use async_trait::async_trait;
use chromiumoxide::Page;
use serde_json::Value;
use tracing::warn;

use super::{DomError, PortalDom, Rect, PATCH_STYLE_ID};

#[derive(Clone)]
pub struct CdpDom {
    page: Page,
}

impl CdpDom {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval_json(&self, script: String) -> Option<Value> {
        self.page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<Value>().ok())
    }

    /// JSON-encode a string for safe embedding inside an eval snippet.
    fn js_str(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
    }
}

#[async_trait]
impl PortalDom for CdpDom {
    async fn count(&self, selector: &str) -> usize {
        let script = format!(
            "(() => {{ try {{ return document.querySelectorAll({sel}).length; }} \
             catch (e) {{ return 0; }} }})()",
            sel = Self::js_str(selector)
        );
        self.eval_json(script)
            .await
            .and_then(|j| j.as_u64())
            .unwrap_or(0) as usize
    }

    async fn geometry(&self, selector: &str) -> Option<Rect> {
        let script = format!(
            "(() => {{ try {{ \
               const el = document.querySelector({sel}); \
               if (!el) return null; \
               const r = el.getBoundingClientRect(); \
               return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; \
             }} catch (e) {{ return null; }} }})()",
            sel = Self::js_str(selector)
        );
        let value = self.eval_json(script).await?;
        serde_json::from_value(value).ok()
    }

    async fn viewport(&self) -> Option<(u32, u32)> {
        let value = self
            .eval_json("[window.innerWidth, window.innerHeight]".to_string())
            .await?;
        let arr = value.as_array()?;
        let w = arr.first()?.as_u64()? as u32;
        let h = arr.get(1)?.as_u64()? as u32;
        Some((w, h))
    }

    async fn set_patch_style(&self, css: &str) -> Result<(), DomError> {
        // Full replace of the single well-known stylesheet, never append:
        // two strategies cascading onto each other is how patches conflict.
        let script = format!(
            "(() => {{ \
               let el = document.getElementById({id}); \
               if (!el) {{ \
                 el = document.createElement('style'); \
                 el.id = {id}; \
                 document.head.appendChild(el); \
               }} \
               el.textContent = {css}; \
               return true; \
             }})()",
            id = Self::js_str(PATCH_STYLE_ID),
            css = Self::js_str(css)
        );
        let Some(value) = self.eval_json(script).await else {
            return Err(DomError::Eval("patch stylesheet injection".to_string()));
        };
        match value.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DomError::StyleWrite(
                "patch stylesheet injection did not confirm".to_string(),
            )),
        }
    }

    async fn clear_patch_style(&self) -> Result<(), DomError> {
        let script = format!(
            "(() => {{ \
               const el = document.getElementById({id}); \
               if (el) el.remove(); \
               return true; \
             }})()",
            id = Self::js_str(PATCH_STYLE_ID)
        );
        let Some(value) = self.eval_json(script).await else {
            return Err(DomError::Eval("patch stylesheet removal".to_string()));
        };
        match value.as_bool() {
            Some(true) => Ok(()),
            _ => Err(DomError::StyleWrite(
                "patch stylesheet removal did not confirm".to_string(),
            )),
        }
    }

    async fn patch_style_active(&self) -> bool {
        let script = format!(
            "(() => {{ \
               const el = document.getElementById({id}); \
               return !!el && el.textContent.trim().length > 0; \
             }})()",
            id = Self::js_str(PATCH_STYLE_ID)
        );
        self.eval_json(script)
            .await
            .and_then(|j| j.as_bool())
            .unwrap_or(false)
    }

    async fn install_mutation_hook(&self, selector: &str) -> bool {
        // Observer scoped to the main-content element, not the whole
        // document, to bound recomputation cost on chatty portal pages.
        let script = format!(
            "(() => {{ try {{ \
               const el = document.querySelector({sel}); \
               if (!el) return false; \
               window.__portalTuner = window.__portalTuner || {{ ticks: 0, observer: null }}; \
               if (window.__portalTuner.observer) window.__portalTuner.observer.disconnect(); \
               const obs = new MutationObserver(() => {{ window.__portalTuner.ticks += 1; }}); \
               obs.observe(el, {{ childList: true, attributes: true, subtree: true }}); \
               window.__portalTuner.observer = obs; \
               return true; \
             }} catch (e) {{ return false; }} }})()",
            sel = Self::js_str(selector)
        );
        let installed = self
            .eval_json(script)
            .await
            .and_then(|j| j.as_bool())
            .unwrap_or(false);
        if !installed {
            warn!(
                "mutation hook not installed (no element for {:?}); monitor \
                 falls back to viewport polling only",
                selector
            );
        }
        installed
    }

    async fn mutation_ticks(&self) -> Option<u64> {
        self.eval_json(
            "window.__portalTuner ? window.__portalTuner.ticks : null".to_string(),
        )
        .await
        .and_then(|j| j.as_u64())
    }
}
