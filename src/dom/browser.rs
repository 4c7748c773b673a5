//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable Chromium-family executable (env override → PATH scan
//!   → well-known install paths).
//! * [`PortalSession`] — one long-lived headless browser attached to the
//!   portal page, relaunched with exponential backoff when startup flakes.
//! * `wait_until_stable` — lets the portal's scripts and lazy widgets settle
//!   before the first detection pass.
//!
//! Detection, probing, and healing never touch chromiumoxide directly; they
//! go through [`super::cdp::CdpDom`] built from a session's page.

use anyhow::{anyhow, Result};
use backoff::ExponentialBackoffBuilder;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Returns `true` when a usable browser binary is present on this machine.
/// The HTTP surface still runs without one (offline snapshot mode).
pub fn native_browser_available() -> bool {
    find_chrome_executable().is_some()
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for headless operation.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`); the tuner has no stealth
/// requirements — it attaches to a portal the operator administers.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Portal session ───────────────────────────────────────────────────────────

/// One long-lived headless browser holding the portal page open.
///
/// Unlike a scrape-per-request pool, the tuner keeps a single page alive for
/// its whole lifetime: the monitor and heal loop re-read the same DOM the
/// patch stylesheet lives in. `launch` retries with exponential backoff since
/// a cold Chromium start under CI load flakes occasionally.
pub struct PortalSession {
    exe: String,
    browser: Mutex<Option<Browser>>,
    page: Mutex<Option<Page>>,
}

impl PortalSession {
    /// Launch a headless browser and navigate it to `portal_url`.
    pub async fn launch(exe: impl Into<String>, portal_url: &str) -> Result<Self> {
        let exe = exe.into();

        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(Some(Duration::from_secs(30)))
            .build();

        let browser = backoff::future::retry(backoff, || async {
            launch_browser(&exe).await.map_err(|e| {
                warn!("Browser launch failed, retrying: {}", e);
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| anyhow!("Browser launch exhausted retries ({}): {}", exe, e))?;

        info!("Portal session: browser up ({})", exe);

        let page = browser
            .new_page(portal_url)
            .await
            .map_err(|e| anyhow!("Failed to open portal page {}: {}", portal_url, e))?;

        info!("Portal session: attached to {}", portal_url);

        Ok(Self {
            exe,
            browser: Mutex::new(Some(browser)),
            page: Mutex::new(Some(page)),
        })
    }

    /// Launch using the auto-discovered executable.
    /// Returns an error if no browser is installed on this machine.
    pub async fn launch_auto(portal_url: &str) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE \
                 if installed in a non-standard location."
            )
        })?;
        Self::launch(exe, portal_url).await
    }

    pub fn executable(&self) -> &str {
        &self.exe
    }

    /// Clone of the attached page handle. `None` after `shutdown`.
    pub async fn page(&self) -> Option<Page> {
        self.page.lock().await.clone()
    }

    /// Gracefully close the browser. Idempotent.
    pub async fn shutdown(&self) {
        self.page.lock().await.take();
        let mut guard = self.browser.lock().await;
        if let Some(mut b) = guard.take() {
            let _ = b.close().await;
            info!("Portal session shut down");
        }
    }
}

async fn launch_browser(exe: &str) -> Result<Browser> {
    let config = build_headless_config(exe, 1280, 900)?;
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    Ok(browser)
}

impl Drop for PortalSession {
    fn drop(&mut self) {
        // Best-effort cleanup. Drop cannot await; if we're inside a tokio
        // runtime, spawn a task to close the browser to avoid zombie
        // Chromium processes.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if let Ok(mut guard) = self.browser.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}

// ── Smart wait / settle ──────────────────────────────────────────────────────

/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout_ms` has elapsed.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms —
/// the portal loads a long tail of widgets, and detecting against a
/// half-built DOM picks the wrong flavor.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) -> Result<()> {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            info!("wait_until_stable: timeout after {}ms", timeout_ms);
            break;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete {
            // DOM not fully loaded; keep waiting and do not allow "idle" to trigger.
            stable_since = std::time::Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            info!(
                "wait_until_stable: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            break;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
    Ok(())
}
