//! Typed event bus.
//!
//! The original integration surface between the portal scripts was a pair of
//! custom DOM events on a shared global namespace; here the same contract is
//! a broadcast channel of typed envelopes. Emission never blocks and never
//! fails — an event with no subscribers is simply dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::types::{HealOutcome, LayoutFlags};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunerEvent {
    /// Detection and the initial probe pass finished; the manager is usable.
    ManagerReady {
        flavor: String,
        fallback: bool,
        fingerprint: String,
    },
    /// The monitor recomputed the layout flags.
    LayoutRevalidated { flags: LayoutFlags },
    /// A patch strategy validated and stays applied.
    PatchApplied {
        probe: String,
        strategy: String,
        attempts: u32,
    },
    /// Every strategy was tried without validating; the patch was removed.
    PatchFailed { probe: String, attempts: u32 },
}

impl TunerEvent {
    pub fn from_outcome(probe: &str, outcome: &HealOutcome) -> Option<Self> {
        match outcome {
            HealOutcome::Applied { strategy, attempts } => Some(TunerEvent::PatchApplied {
                probe: probe.to_string(),
                strategy: strategy.clone(),
                attempts: *attempts,
            }),
            HealOutcome::Failed { attempts } => Some(TunerEvent::PatchFailed {
                probe: probe.to_string(),
                attempts: *attempts,
            }),
            HealOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TunerEvent,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Fire-and-forget emission; send errors (no receivers) are ignored.
    pub fn emit(&self, event: TunerEvent) {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            at: Utc::now(),
            event,
        };
        let _ = self.tx.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(TunerEvent::ManagerReady {
            flavor: "classic".into(),
            fallback: false,
            fingerprint: "legacy-shell".into(),
        });
        let envelope = rx.recv().await.expect("event should arrive");
        match envelope.event {
            TunerEvent::ManagerReady { flavor, .. } => assert_eq!(flavor, "classic"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emission_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        // Must not panic or error.
        bus.emit(TunerEvent::PatchFailed {
            probe: "nav_centered".into(),
            attempts: 3,
        });
    }

    #[test]
    fn cancelled_outcomes_produce_no_event() {
        assert!(TunerEvent::from_outcome("nav_centered", &HealOutcome::Cancelled).is_none());
    }
}
