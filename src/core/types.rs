use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// Roles & selector sets
// ─────────────────────────────────────────────────────────────────────────────

/// Logical UI roles the tuner locates inside a portal skin. A [`SelectorSet`]
/// maps each role to the CSS selector that finds it in one concrete skin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    NavigationContainer,
    MainContent,
    Sidebar,
    HeaderLogo,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::NavigationContainer,
        Role::MainContent,
        Role::Sidebar,
        Role::HeaderLogo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::NavigationContainer => "navigation_container",
            Role::MainContent => "main_content",
            Role::Sidebar => "sidebar",
            Role::HeaderLogo => "header_logo",
        }
    }
}

/// Mapping from logical role to CSS selector for one portal flavor.
/// Immutable once registered; the detector hands out clones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet {
    selectors: BTreeMap<Role, String>,
}

impl SelectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: Role, selector: impl Into<String>) -> Self {
        self.selectors.insert(role, selector.into());
        self
    }

    pub fn get(&self, role: Role) -> Option<&str> {
        self.selectors.get(&role).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &str)> {
        self.selectors.iter().map(|(r, s)| (*r, s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flavor & fingerprint registry entries
// ─────────────────────────────────────────────────────────────────────────────

/// One recognized variant of the hosted portal's DOM structure.
///
/// `key_roles` are the roles whose selectors decide whether this flavor is
/// present; the remaining selectors are only used once the flavor is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorSpec {
    pub id: String,
    #[serde(default = "default_key_roles")]
    pub key_roles: Vec<Role>,
    pub selectors: SelectorSet,
}

fn default_key_roles() -> Vec<Role> {
    vec![Role::NavigationContainer, Role::MainContent]
}

/// One structural signal tested during fingerprinting. Matching check names
/// are concatenated (in table order) into the diagnostic fingerprint string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintCheck {
    pub name: String,
    pub selector: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection output
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one detection pass. `fallback` is set when no registered flavor
/// reached the key-selector bar and the union selector set was synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedContext {
    pub flavor: String,
    pub fallback: bool,
    /// Diagnostic only — never drives control flow.
    pub fingerprint: String,
    pub selectors: SelectorSet,
    pub detected_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout flags
// ─────────────────────────────────────────────────────────────────────────────

/// Probe results keyed by probe name, recomputed on every monitoring tick.
/// Written only by the probe engine's `run_all`; a probe that has never run
/// reads as `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutFlags {
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

impl LayoutFlags {
    pub fn get(&self, probe: &str) -> bool {
        self.flags.get(probe).copied().unwrap_or(false)
    }

    pub fn set(&mut self, probe: impl Into<String>, value: bool) {
        self.flags.insert(probe.into(), value);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Heal outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal result of one patch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HealOutcome {
    /// A strategy validated; its CSS stays applied.
    Applied { strategy: String, attempts: u32 },
    /// Every strategy was tried without validating; the patch stylesheet was
    /// removed so the portal keeps its native layout.
    Failed { attempts: u32 },
    /// The cycle was cancelled by `force_reapply` or `destroy` before it
    /// reached a verdict.
    Cancelled,
}

/// One entry in the bounded heal history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealRecord {
    pub probe: String,
    pub outcome: HealOutcome,
    pub timestamp: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectSnapshotRequest {
    /// Raw HTML of a captured portal page; detection runs offline against it.
    pub html: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReapplyResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
