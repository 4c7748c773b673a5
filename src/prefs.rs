//! Preference persistence — theme and feature-flag toggles.
//!
//! The tuner remembers the operator's theme choice and per-feature on/off
//! switches across restarts in `~/.portal-tuner/prefs.json`. A missing or
//! corrupt file degrades to defaults with a logged warning; preference I/O
//! must never take the tuner down.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prefs {
    /// Theme name applied by the skin layer, e.g. `"dark"`. `None` keeps the
    /// portal's native theme.
    #[serde(default)]
    pub theme: Option<String>,
    /// Per-feature toggles, keyed by feature name. Absent keys mean the
    /// feature's built-in default applies.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl Prefs {
    /// Whether `feature` is enabled, with `default` applying when the
    /// operator never toggled it.
    pub fn feature_enabled(&self, feature: &str, default: bool) -> bool {
        self.features.get(feature).copied().unwrap_or(default)
    }
}

/// Full path of the preference file.
///
/// `PORTAL_TUNER_PREFS_PATH` overrides the default
/// `~/.portal-tuner/prefs.json`; returns `None` when neither resolves
/// (no home directory — preferences are then in-memory only).
pub fn prefs_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PORTAL_TUNER_PREFS_PATH") {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let home = dirs::home_dir()?;
    Some(home.join(".portal-tuner").join("prefs.json"))
}

/// Load preferences from `path`. Missing file → defaults (silent).
/// Parse error → defaults with a logged warning.
pub fn load_from(path: &Path) -> Prefs {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Prefs::default(),
    };
    match serde_json::from_str::<Prefs>(&raw) {
        Ok(prefs) => prefs,
        Err(e) => {
            warn!(
                "prefs: parse error at {}: {} — using defaults",
                path.display(),
                e
            );
            Prefs::default()
        }
    }
}

/// Persist preferences to `path`, creating parent directories as needed.
pub fn save_to(path: &Path, prefs: &Prefs) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(prefs)?;
    std::fs::write(path, raw)?;
    Ok(())
}

/// Load from the standard location; defaults when there is none.
pub fn load() -> Prefs {
    match prefs_path() {
        Some(path) => load_from(&path),
        None => Prefs::default(),
    }
}

/// Save to the standard location. A missing home directory is reported as a
/// warning, not an error — the in-memory copy stays authoritative.
pub fn save(prefs: &Prefs) {
    let Some(path) = prefs_path() else {
        warn!("prefs: no home directory — preferences not persisted");
        return;
    };
    if let Err(e) = save_to(&path, prefs) {
        warn!("prefs: save to {} failed: {}", path.display(), e);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
