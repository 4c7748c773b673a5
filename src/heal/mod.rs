//! Self-healing patch loop.
//!
//! A probe failure kicks off one *patch cycle*: inject a CSS strategy, wait
//! for layout to settle, re-run the probe that failed, and either keep the
//! strategy or replace it with the next one — bounded by an attempt ceiling,
//! never wall-clock. The cycle's retry mechanics live in [`try_in_order`],
//! decoupled from the concrete strategies so new ones are added by extending
//! the list, not the state machine.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::{HealOutcome, SelectorSet};
use crate::dom::PortalDom;

pub mod strategies;

pub use strategies::{PatchStrategy, CENTERING_STRATEGIES};

/// Observable position of the patch loop, reported on the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PatchState {
    Idle,
    Trying { strategy: String, attempt: u32 },
    Validating { strategy: String, attempt: u32 },
    Applied { strategy: String },
    Failed,
}

/// Try `strategies` in order until `validate` passes or `max_attempts`
/// strategies have been consumed.
///
/// Each injection *replaces* the patch stylesheet's full contents; on
/// exhaustion the stylesheet is removed so the failure mode is "no visual
/// change", and the caller decides what to log or emit. `on_state` receives
/// every transition, in order.
pub async fn try_in_order<V, VFut>(
    dom: &dyn PortalDom,
    selectors: &SelectorSet,
    strategies: &[PatchStrategy],
    validate: V,
    max_attempts: u32,
    settle: Duration,
    mut on_state: impl FnMut(PatchState),
) -> HealOutcome
where
    V: Fn() -> VFut,
    VFut: std::future::Future<Output = bool>,
{
    let bound = (max_attempts as usize).min(strategies.len());
    let mut attempts = 0u32;

    for strategy in &strategies[..bound] {
        attempts += 1;
        on_state(PatchState::Trying {
            strategy: strategy.id.to_string(),
            attempt: attempts,
        });

        let css = strategy.render(selectors);
        if let Err(e) = dom.set_patch_style(&css).await {
            // Injection itself failed — count the attempt and move on; the
            // next strategy gets a fresh write.
            warn!("heal: strategy {} injection failed: {}", strategy.id, e);
            continue;
        }

        // Let the browser run a layout pass before measuring again; there is
        // no synchronous "layout settled" signal to wait on.
        tokio::time::sleep(settle).await;

        on_state(PatchState::Validating {
            strategy: strategy.id.to_string(),
            attempt: attempts,
        });

        if validate().await {
            info!(
                "heal: strategy {} validated on attempt {}",
                strategy.id, attempts
            );
            on_state(PatchState::Applied {
                strategy: strategy.id.to_string(),
            });
            return HealOutcome::Applied {
                strategy: strategy.id.to_string(),
                attempts,
            };
        }

        info!("heal: strategy {} did not validate", strategy.id);
    }

    // Exhausted: remove the patch so the portal keeps its native layout.
    warn!(
        "heal: all {} strategies exhausted without validating — reverting patch",
        attempts
    );
    if let Err(e) = dom.clear_patch_style().await {
        warn!("heal: patch removal after exhaustion failed: {}", e);
    }
    on_state(PatchState::Failed);
    HealOutcome::Failed { attempts }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::dom::snapshot::SnapshotDom;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn selectors() -> SelectorSet {
        SelectorSet::new()
            .with(Role::NavigationContainer, "#nav")
            .with(Role::MainContent, "#content")
    }

    /// A validation that never passes terminates after exactly
    /// `max_attempts` strategies and reverts the patch.
    #[tokio::test]
    async fn always_false_validation_is_bounded() {
        let dom = SnapshotDom::new("<div></div>");
        let calls = AtomicU32::new(0);
        let outcome = try_in_order(
            &dom,
            &selectors(),
            CENTERING_STRATEGIES,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
            3,
            Duration::from_millis(1),
            |_| {},
        )
        .await;
        assert_eq!(outcome, HealOutcome::Failed { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Exhaustion removes the patch — native layout, no visual change.
        assert!(dom.recorded_patch().is_none());
    }

    /// Validation passing on the second strategy applies exactly two
    /// stylesheets in sequence, the second replacing the first.
    #[tokio::test]
    async fn second_strategy_success_replaces_first() {
        let dom = SnapshotDom::new("<div></div>");
        let calls = AtomicU32::new(0);
        let mut states = Vec::new();
        let outcome = try_in_order(
            &dom,
            &selectors(),
            CENTERING_STRATEGIES,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { n == 1 }
            },
            3,
            Duration::from_millis(1),
            |s| states.push(s),
        )
        .await;
        assert_eq!(
            outcome,
            HealOutcome::Applied {
                strategy: "grid".to_string(),
                attempts: 2
            }
        );
        // The winning strategy's CSS stays applied, alone.
        let css = dom.recorded_patch().unwrap();
        assert!(css.contains("display: grid"));
        assert!(!css.contains("display: flex"));
        assert_eq!(
            states,
            vec![
                PatchState::Trying {
                    strategy: "flexbox".into(),
                    attempt: 1
                },
                PatchState::Validating {
                    strategy: "flexbox".into(),
                    attempt: 1
                },
                PatchState::Trying {
                    strategy: "grid".into(),
                    attempt: 2
                },
                PatchState::Validating {
                    strategy: "grid".into(),
                    attempt: 2
                },
                PatchState::Applied {
                    strategy: "grid".into()
                },
            ]
        );
    }

    /// The ceiling also respects a strategy list shorter than the bound.
    #[tokio::test]
    async fn short_strategy_list_bounds_attempts() {
        let dom = SnapshotDom::new("<div></div>");
        let outcome = try_in_order(
            &dom,
            &selectors(),
            &CENTERING_STRATEGIES[..2],
            || async { false },
            5,
            Duration::from_millis(1),
            |_| {},
        )
        .await;
        assert_eq!(outcome, HealOutcome::Failed { attempts: 2 });
    }
}
