use std::path::Path;

// ---------------------------------------------------------------------------
// TunerConfig — file-based config loader (portal-tuner.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Top-level config loaded from `portal-tuner.json`.
///
/// Every field is optional in the file; `resolve_*` applies the env-var
/// fallback and the default, so a missing file degrades to a fully usable
/// configuration.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct TunerConfig {
    /// Portal page the tuner attaches to, e.g. `https://portal.example.com/admin`.
    pub portal_url: Option<String>,
    /// Vertical-centering tolerance in CSS pixels. Default: 3.
    pub tolerance_px: Option<f64>,
    /// Debounce window for resize/mutation bursts, in ms. Default: 250.
    pub debounce_ms: Option<u64>,
    /// Delay between injecting a patch strategy and re-validating, in ms.
    /// Gives the browser one layout pass to settle. Default: 400.
    pub settle_ms: Option<u64>,
    /// Upper bound on patch strategies tried per heal cycle. Default: 3.
    pub max_patch_attempts: Option<u32>,
    /// Monitor poll interval for viewport/mutation changes, in ms. Default: 250.
    pub poll_ms: Option<u64>,
    /// Viewport width at or above which the `desktop_viewport` probe is true.
    /// Default: 992 (the portal's desktop breakpoint).
    pub desktop_breakpoint_px: Option<u32>,
    /// HTTP surface port. Default: 5870.
    pub port: Option<u16>,
    /// Explicit path to `portal-flavors.json`.
    pub flavors_path: Option<String>,
}

impl TunerConfig {
    /// Portal URL: JSON field → `PORTAL_TUNER_URL` env var → `None`.
    /// No default — without a URL the tuner runs in offline (snapshot) mode.
    pub fn resolve_portal_url(&self) -> Option<String> {
        if let Some(u) = &self.portal_url {
            if !u.trim().is_empty() {
                return Some(u.clone());
            }
        }
        std::env::var("PORTAL_TUNER_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Centering tolerance: JSON field → `PORTAL_TUNER_TOLERANCE_PX` → 3.0.
    pub fn resolve_tolerance_px(&self) -> f64 {
        if let Some(t) = self.tolerance_px {
            return t;
        }
        std::env::var("PORTAL_TUNER_TOLERANCE_PX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3.0)
    }

    /// Debounce window: JSON field → `PORTAL_TUNER_DEBOUNCE_MS` → 250.
    pub fn resolve_debounce_ms(&self) -> u64 {
        if let Some(n) = self.debounce_ms {
            return n;
        }
        std::env::var("PORTAL_TUNER_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250)
    }

    /// Settle delay: JSON field → `PORTAL_TUNER_SETTLE_MS` → 400.
    pub fn resolve_settle_ms(&self) -> u64 {
        if let Some(n) = self.settle_ms {
            return n;
        }
        std::env::var("PORTAL_TUNER_SETTLE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(400)
    }

    /// Patch attempt ceiling: JSON field → `PORTAL_TUNER_MAX_ATTEMPTS` → 3.
    pub fn resolve_max_patch_attempts(&self) -> u32 {
        if let Some(n) = self.max_patch_attempts {
            return n;
        }
        std::env::var("PORTAL_TUNER_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    }

    /// Monitor poll interval: JSON field → `PORTAL_TUNER_POLL_MS` → 250.
    pub fn resolve_poll_ms(&self) -> u64 {
        if let Some(n) = self.poll_ms {
            return n;
        }
        std::env::var("PORTAL_TUNER_POLL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(250)
    }

    /// Desktop breakpoint: JSON field → `PORTAL_TUNER_BREAKPOINT_PX` → 992.
    pub fn resolve_desktop_breakpoint_px(&self) -> u32 {
        if let Some(n) = self.desktop_breakpoint_px {
            return n;
        }
        std::env::var("PORTAL_TUNER_BREAKPOINT_PX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(992)
    }

    /// HTTP port: JSON field → `PORTAL_TUNER_PORT` / `PORT` → 5870.
    pub fn resolve_port(&self) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        for k in ["PORTAL_TUNER_PORT", "PORT"] {
            if let Ok(v) = std::env::var(k) {
                if let Ok(p) = v.trim().parse::<u16>() {
                    return p;
                }
            }
        }
        5870
    }
}

/// Load `portal-tuner.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `PORTAL_TUNER_CONFIG` env var path
/// 2. `./portal-tuner.json`
/// 3. `../portal-tuner.json`
///
/// Missing file → `TunerConfig::default()` (silent, all env-var fallbacks
/// apply). Parse error → log a warning, return defaults.
pub fn load_tuner_config() -> TunerConfig {
    let mut candidates = vec![
        std::path::PathBuf::from("portal-tuner.json"),
        std::path::PathBuf::from("../portal-tuner.json"),
    ];
    if let Ok(env_path) = std::env::var("PORTAL_TUNER_CONFIG") {
        candidates.insert(0, std::path::PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<TunerConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("portal-tuner.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "portal-tuner.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return TunerConfig::default();
                }
            },
            Err(_) => continue, // file not found at this path — try next
        }
    }

    TunerConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `dom::browser::find_chrome_executable`).
/// This function only returns a value when `CHROME_EXECUTABLE` is set to an
/// existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
