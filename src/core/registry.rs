use crate::core::types::{FingerprintCheck, FlavorSpec, Role, SelectorSet};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Share of a flavor's key selectors that must match before the flavor is
/// chosen. The requirement is `round(threshold × key_count)`, never less
/// than one: with the shipped two-key flavors this demands both keys, while
/// a flavor registering three key roles matches on two of three.
pub const DEFAULT_KEY_MATCH_THRESHOLD: f64 = 0.8;

/// Joins matched check names into the diagnostic fingerprint string.
pub const FINGERPRINT_DELIMITER: &str = "+";

/// Flavor id reported when no registered flavor reached the key-selector bar.
pub const FALLBACK_FLAVOR_ID: &str = "generic";

// ─────────────────────────────────────────────────────────────────────────────
// Registry — static flavor table + fingerprint check table
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only table of known portal flavors and fingerprint checks.
///
/// Table order matters twice: fingerprint checks are concatenated in order,
/// and the first flavor to reach the key-selector bar wins. The tables are
/// immutable after load; adding a flavor means adding a row (built-in or via
/// `portal-flavors.json`), no code change elsewhere.
#[derive(Clone, Debug)]
pub struct FlavorRegistry {
    flavors: Vec<FlavorSpec>,
    checks: Vec<FingerprintCheck>,
    key_match_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct FlavorFile {
    flavors: Vec<FlavorSpec>,
    #[serde(default)]
    fingerprint_checks: Vec<FingerprintCheck>,
    #[serde(default)]
    key_match_threshold: Option<f64>,
}

impl FlavorRegistry {
    /// Load the registry from `portal-flavors.json` when one is present.
    ///
    /// Search order (first found wins):
    /// 1. `explicit_path` (from config)
    /// 2. `PORTAL_TUNER_FLAVORS_PATH` env var
    /// 3. `./portal-flavors.json`
    /// 4. `../portal-flavors.json`
    ///
    /// Missing file → built-in tables (silent). Parse error → built-in
    /// tables with a logged warning, never a startup failure.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(p) = explicit_path {
            candidates.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("PORTAL_TUNER_FLAVORS_PATH") {
            if !p.trim().is_empty() {
                candidates.push(PathBuf::from(p));
            }
        }
        candidates.push(PathBuf::from("portal-flavors.json"));
        candidates.push(PathBuf::from("../portal-flavors.json"));

        for path in &candidates {
            let raw = match std::fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            match serde_json::from_str::<FlavorFile>(&raw) {
                Ok(file) if file.flavors.is_empty() => {
                    warn!(
                        "portal-flavors: {} declares no flavors — using built-ins",
                        path.display()
                    );
                    return Self::builtin();
                }
                Ok(file) => {
                    info!(
                        "portal-flavors: loaded {} flavors / {} checks from {}",
                        file.flavors.len(),
                        file.fingerprint_checks.len(),
                        path.display()
                    );
                    let checks = if file.fingerprint_checks.is_empty() {
                        builtin_checks()
                    } else {
                        file.fingerprint_checks
                    };
                    return Self {
                        flavors: file.flavors,
                        checks,
                        key_match_threshold: file
                            .key_match_threshold
                            .unwrap_or(DEFAULT_KEY_MATCH_THRESHOLD),
                    };
                }
                Err(e) => {
                    warn!(
                        "portal-flavors: parse error at {}: {} — using built-ins",
                        path.display(),
                        e
                    );
                    return Self::builtin();
                }
            }
        }

        Self::builtin()
    }

    /// The built-in flavor and check tables, no file lookup.
    pub fn builtin() -> Self {
        Self {
            flavors: builtin_flavors(),
            checks: builtin_checks(),
            key_match_threshold: DEFAULT_KEY_MATCH_THRESHOLD,
        }
    }

    pub fn flavors(&self) -> &[FlavorSpec] {
        &self.flavors
    }

    pub fn checks(&self) -> &[FingerprintCheck] {
        &self.checks
    }

    /// Number of key selectors that must match for a flavor to be chosen.
    /// Half-up rounding, clamped to `1..=key_count`.
    pub fn required_key_matches(&self, key_count: usize) -> usize {
        if key_count == 0 {
            return 0;
        }
        let required = (self.key_match_threshold * key_count as f64).round() as usize;
        required.clamp(1, key_count)
    }

    /// Synthesize the generic fallback selector set: per role, the
    /// comma-joined union of every registered flavor's selector for that
    /// role, maximizing the chance something matches on an unknown skin.
    pub fn fallback_selector_set(&self) -> SelectorSet {
        let mut set = SelectorSet::new();
        for role in Role::ALL {
            let mut union: Vec<&str> = Vec::new();
            for flavor in &self.flavors {
                if let Some(sel) = flavor.selectors.get(role) {
                    if !union.contains(&sel) {
                        union.push(sel);
                    }
                }
            }
            if !union.is_empty() {
                set = set.with(role, union.join(", "));
            }
        }
        set
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in tables
// ─────────────────────────────────────────────────────────────────────────────

fn builtin_flavors() -> Vec<FlavorSpec> {
    vec![
        // Legacy jQuery-era skin: id-addressed containers, table-heavy shell.
        FlavorSpec {
            id: "classic".to_string(),
            key_roles: vec![Role::NavigationContainer, Role::MainContent],
            selectors: SelectorSet::new()
                .with(Role::NavigationContainer, "#navigation")
                .with(Role::MainContent, "#content")
                .with(Role::Sidebar, "#sidebar")
                .with(Role::HeaderLogo, "#header .logo img"),
        },
        // Bootstrap-based refresh of the same portal.
        FlavorSpec {
            id: "bootstrap".to_string(),
            key_roles: vec![Role::NavigationContainer, Role::MainContent],
            selectors: SelectorSet::new()
                .with(Role::NavigationContainer, ".navbar .navbar-nav")
                .with(Role::MainContent, "#main-content")
                .with(Role::Sidebar, ".sidebar-nav")
                .with(Role::HeaderLogo, ".navbar-brand img"),
        },
        // SPA rewrite: everything hangs off #root with data-testid hooks.
        FlavorSpec {
            id: "react".to_string(),
            key_roles: vec![Role::NavigationContainer, Role::MainContent],
            selectors: SelectorSet::new()
                .with(Role::NavigationContainer, "#root [data-testid=\"primary-nav\"]")
                .with(Role::MainContent, "#root [data-testid=\"page-content\"]")
                .with(Role::Sidebar, "#root [data-testid=\"side-rail\"]")
                .with(Role::HeaderLogo, "#root [data-testid=\"brand-logo\"]"),
        },
    ]
}

fn builtin_checks() -> Vec<FingerprintCheck> {
    let check = |name: &str, selector: &str| FingerprintCheck {
        name: name.to_string(),
        selector: selector.to_string(),
    };
    vec![
        check("legacy-shell", "#header, #navigation"),
        check("jquery-nav", "#navigation ul li a"),
        check("bootstrap-grid", ".container-fluid .row"),
        check("navbar-brand", ".navbar .navbar-brand"),
        check("react-root", "#root"),
        check("spa-content", "[data-testid=\"page-content\"]"),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
