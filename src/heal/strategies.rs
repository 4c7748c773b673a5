//! Centering patch strategies.
//!
//! Each strategy is a self-contained stylesheet fragment targeting the same
//! two roles (navigation container + main content). The heal loop writes a
//! strategy's full CSS into the single patch stylesheet — replacing whatever
//! the previous strategy wrote — so at most one strategy is ever live.

use crate::core::types::{Role, SelectorSet};

/// One CSS patch strategy. `render` expands the fragment against the active
/// selector set; a missing role expands to a selector that matches nothing,
/// which keeps the fragment harmless on degraded contexts.
#[derive(Clone, Copy)]
pub struct PatchStrategy {
    pub id: &'static str,
    render: fn(&SelectorSet) -> String,
}

impl PatchStrategy {
    pub fn render(&self, selectors: &SelectorSet) -> String {
        (self.render)(selectors)
    }
}

impl std::fmt::Debug for PatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchStrategy").field("id", &self.id).finish()
    }
}

/// Ordered list tried by the heal loop. Order is part of the contract:
/// flexbox first (least invasive on modern skins), table-cell last (the
/// legacy skin's own layout model).
pub const CENTERING_STRATEGIES: &[PatchStrategy] = &[
    PatchStrategy {
        id: "flexbox",
        render: flexbox_css,
    },
    PatchStrategy {
        id: "grid",
        render: grid_css,
    },
    PatchStrategy {
        id: "transform",
        render: transform_css,
    },
    PatchStrategy {
        id: "table-cell",
        render: table_cell_css,
    },
];

fn nav(selectors: &SelectorSet) -> &str {
    selectors
        .get(Role::NavigationContainer)
        .unwrap_or("#portal-tuner-unmatched")
}

fn content(selectors: &SelectorSet) -> &str {
    selectors
        .get(Role::MainContent)
        .unwrap_or("#portal-tuner-unmatched")
}

fn flexbox_css(selectors: &SelectorSet) -> String {
    format!(
        "{nav} {{ display: flex !important; flex-direction: column; justify-content: center !important; min-height: 100%; }}\n\
         {content} {{ align-self: stretch; }}\n",
        nav = nav(selectors),
        content = content(selectors)
    )
}

fn grid_css(selectors: &SelectorSet) -> String {
    format!(
        "{nav} {{ display: grid !important; align-content: center !important; min-height: 100%; }}\n",
        nav = nav(selectors)
    )
}

fn transform_css(selectors: &SelectorSet) -> String {
    format!(
        "{nav} {{ position: relative !important; top: 50% !important; transform: translateY(-50%) !important; }}\n\
         {content} {{ overflow: visible; }}\n",
        nav = nav(selectors),
        content = content(selectors)
    )
}

fn table_cell_css(selectors: &SelectorSet) -> String {
    format!(
        "{nav} {{ display: table-cell !important; vertical-align: middle !important; height: 100%; }}\n",
        nav = nav(selectors)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_are_ordered_and_distinct() {
        let ids: Vec<&str> = CENTERING_STRATEGIES.iter().map(|s| s.id).collect();
        assert_eq!(ids, ["flexbox", "grid", "transform", "table-cell"]);
    }

    #[test]
    fn rendered_css_targets_the_active_selectors() {
        let selectors = SelectorSet::new()
            .with(Role::NavigationContainer, "#navigation")
            .with(Role::MainContent, "#content");
        for strategy in CENTERING_STRATEGIES {
            let css = strategy.render(&selectors);
            assert!(
                css.contains("#navigation"),
                "{} must target the nav selector",
                strategy.id
            );
        }
    }

    /// A degraded selector set renders harmless CSS instead of panicking.
    #[test]
    fn missing_roles_render_an_unmatched_selector() {
        let css = CENTERING_STRATEGIES[0].render(&SelectorSet::new());
        assert!(css.contains("#portal-tuner-unmatched"));
    }
}
