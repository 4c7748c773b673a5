//! Context detection — figures out which portal skin is present.
//!
//! Runs once at attach time (and again after a `destroy`/re-init): matches
//! the live DOM against the flavor registry's key selectors and falls back
//! to the union selector set when nothing is recognized. An unrecognized
//! skin is a degraded mode, not an error — the portal keeps rendering either
//! way.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::registry::{FlavorRegistry, FALLBACK_FLAVOR_ID, FINGERPRINT_DELIMITER};
use crate::core::types::DetectedContext;
use crate::dom::PortalDom;

pub struct Detector {
    registry: Arc<FlavorRegistry>,
}

impl Detector {
    pub fn new(registry: Arc<FlavorRegistry>) -> Self {
        Self { registry }
    }

    /// One full detection pass against `dom`.
    pub async fn detect(&self, dom: &dyn PortalDom) -> DetectedContext {
        let fingerprint = self.fingerprint(dom).await;

        for flavor in self.registry.flavors() {
            let key_count = flavor.key_roles.len();
            let required = self.registry.required_key_matches(key_count);
            let mut matched = 0usize;
            for role in &flavor.key_roles {
                let Some(selector) = flavor.selectors.get(*role) else {
                    continue;
                };
                if dom.count(selector).await > 0 {
                    matched += 1;
                }
            }
            debug!(
                "detect: flavor {} matched {}/{} key selectors (need {})",
                flavor.id, matched, key_count, required
            );
            if key_count > 0 && matched >= required {
                info!(
                    "detect: portal flavor {} (fingerprint: {})",
                    flavor.id,
                    if fingerprint.is_empty() { "-" } else { fingerprint.as_str() }
                );
                return DetectedContext {
                    flavor: flavor.id.clone(),
                    fallback: false,
                    fingerprint,
                    selectors: flavor.selectors.clone(),
                    detected_at: Utc::now(),
                };
            }
        }

        // No flavor reached the bar — synthesize the union selector set so
        // probes still have something to aim at on an unknown skin.
        info!(
            "detect: no registered flavor matched; using generic fallback selectors \
             (fingerprint: {})",
            if fingerprint.is_empty() { "-" } else { fingerprint.as_str() }
        );
        DetectedContext {
            flavor: FALLBACK_FLAVOR_ID.to_string(),
            fallback: true,
            fingerprint,
            selectors: self.registry.fallback_selector_set(),
            detected_at: Utc::now(),
        }
    }

    /// Ordered concatenation of the fingerprint check names that matched.
    /// Diagnostic value only — flavor selection never reads it.
    async fn fingerprint(&self, dom: &dyn PortalDom) -> String {
        let mut matched: Vec<&str> = Vec::new();
        for check in self.registry.checks() {
            if dom.count(&check.selector).await > 0 {
                matched.push(&check.name);
            }
        }
        matched.join(FINGERPRINT_DELIMITER)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::dom::snapshot::SnapshotDom;

    fn detector() -> Detector {
        Detector::new(Arc::new(FlavorRegistry::builtin()))
    }

    const CLASSIC_PAGE: &str = r#"
        <html><body>
            <div id="header"><div class="logo"><img src="logo.png"></div></div>
            <div id="navigation"><ul><li><a href="/users">Users</a></li></ul></div>
            <div id="content"><table><tr><td>row</td></tr></table></div>
        </body></html>
    "#;

    const REACT_PAGE: &str = r#"
        <html><body>
            <div id="root">
                <nav data-testid="primary-nav"></nav>
                <main data-testid="page-content"></main>
            </div>
        </body></html>
    "#;

    #[tokio::test]
    async fn classic_page_detects_classic() {
        let ctx = detector().detect(&SnapshotDom::new(CLASSIC_PAGE)).await;
        assert_eq!(ctx.flavor, "classic");
        assert!(!ctx.fallback);
        assert_eq!(ctx.selectors.get(Role::MainContent), Some("#content"));
    }

    #[tokio::test]
    async fn react_page_detects_react() {
        let ctx = detector().detect(&SnapshotDom::new(REACT_PAGE)).await;
        assert_eq!(ctx.flavor, "react");
        assert!(!ctx.fallback);
    }

    /// One key selector alone is below the two-key bar — the flavor is not
    /// chosen on a partial match of a two-key set.
    #[tokio::test]
    async fn single_key_match_is_not_enough() {
        let html = r#"<html><body><div id="navigation"></div></body></html>"#;
        let ctx = detector().detect(&SnapshotDom::new(html)).await;
        assert!(ctx.fallback);
    }

    #[tokio::test]
    async fn unknown_page_falls_back_to_union_selectors() {
        let html = r#"<html><body><div class="totally-custom"></div></body></html>"#;
        let ctx = detector().detect(&SnapshotDom::new(html)).await;
        assert_eq!(ctx.flavor, FALLBACK_FLAVOR_ID);
        assert!(ctx.fallback);
        let nav = ctx.selectors.get(Role::NavigationContainer).unwrap();
        assert!(nav.contains("#navigation") && nav.contains(".navbar .navbar-nav"));
    }

    /// Fingerprint preserves check-table order and joins with the fixed
    /// delimiter.
    #[tokio::test]
    async fn fingerprint_is_ordered_and_delimited() {
        let ctx = detector().detect(&SnapshotDom::new(CLASSIC_PAGE)).await;
        assert_eq!(ctx.fingerprint, "legacy-shell+jquery-nav");
    }

    /// Detection reads the DOM only; two passes over the same snapshot agree.
    #[tokio::test]
    async fn detection_is_deterministic() {
        let dom = SnapshotDom::new(REACT_PAGE);
        let d = detector();
        let a = d.detect(&dom).await;
        let b = d.detect(&dom).await;
        assert_eq!(a.flavor, b.flavor);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
