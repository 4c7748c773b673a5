use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use portal_tuner::core::config::{self, TunerConfig};
use portal_tuner::core::registry::FlavorRegistry;
use portal_tuner::detect::Detector;
use portal_tuner::dom::browser::{self, PortalSession};
use portal_tuner::dom::cdp::CdpDom;
use portal_tuner::dom::snapshot::SnapshotDom;
use portal_tuner::events::EventBus;
use portal_tuner::manager::{ManagerSettings, PortalContextManager};
use portal_tuner::prefs::Prefs;
use portal_tuner::types::*;
use portal_tuner::AppState;

fn parse_flag_from_args(flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == flag {
            if let Some(v) = args.next() {
                return Some(v);
            }
        } else if let Some(rest) = a.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

fn settings_from_config(cfg: &TunerConfig) -> ManagerSettings {
    ManagerSettings {
        tolerance_px: cfg.resolve_tolerance_px(),
        desktop_breakpoint_px: cfg.resolve_desktop_breakpoint_px(),
        debounce: std::time::Duration::from_millis(cfg.resolve_debounce_ms()),
        poll: std::time::Duration::from_millis(cfg.resolve_poll_ms()),
        settle: std::time::Duration::from_millis(cfg.resolve_settle_ms()),
        max_patch_attempts: cfg.resolve_max_patch_attempts(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting portal-tuner");

    let config = config::load_tuner_config();
    let registry = FlavorRegistry::load(
        config
            .flavors_path
            .as_deref()
            .map(std::path::Path::new),
    );
    let bus = EventBus::default();

    // Mirror every bus event into the log so independently-running tooling
    // can follow the tuner without subscribing in-process.
    let mut event_rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => info!("event: {}", json),
                    Err(e) => warn!("event serialization failed: {}", e),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event log lagged by {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut state = AppState::new(config, registry, bus.clone());

    // Attach to the live portal when a URL is configured and a browser is
    // installed; otherwise stay up in offline (snapshot) mode.
    let portal_url = parse_flag_from_args("--url")
        .or_else(|| state.config.resolve_portal_url())
        .filter(|u| match url::Url::parse(u) {
            Ok(_) => true,
            Err(e) => {
                warn!("Ignoring invalid portal URL {:?}: {}", u, e);
                false
            }
        });
    match portal_url {
        Some(url) if browser::native_browser_available() => {
            info!("Attaching to portal: {}", url);
            match PortalSession::launch_auto(&url).await {
                Ok(session) => {
                    let session = Arc::new(session);
                    if let Some(page) = session.page().await {
                        // Let the portal's widget tail finish before the
                        // first detection pass.
                        browser::wait_until_stable(&page, 1500, 10_000).await.ok();
                        let dom = Arc::new(CdpDom::new(page));
                        let manager = PortalContextManager::start(
                            dom,
                            Arc::clone(&state.registry),
                            bus.clone(),
                            settings_from_config(&state.config),
                        )
                        .await;
                        state = state.with_manager(manager).with_session(session);
                    }
                }
                Err(e) => {
                    warn!(
                        "Portal attach failed: {}. Continuing in offline mode.",
                        e
                    );
                }
            }
        }
        Some(_) => {
            warn!(
                "No browser found (install Chrome/Chromium or set CHROME_EXECUTABLE). \
                 Continuing in offline mode."
            );
        }
        None => {
            info!("No portal URL configured (portal_url / PORTAL_TUNER_URL / --url). Offline mode.");
        }
    }

    let port: u16 = parse_flag_from_args("--port")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| state.config.resolve_port());

    let state = Arc::new(state);

    // Build router
    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/context", get(context_handler))
        .route("/flags", get(flags_handler))
        .route("/reapply", post(reapply_handler))
        .route("/detect", post(detect_snapshot_handler))
        .route("/prefs", get(get_prefs_handler).post(set_prefs_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT/PORTAL_TUNER_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("portal-tuner listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let mut sigint = signal(SignalKind::interrupt()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
            _ = async {
                if let Some(ref mut s) = sigint {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    if let Some(manager) = state.manager.as_ref() {
        manager.destroy().await;
    }
    if let Some(session) = state.session.as_ref() {
        session.shutdown().await;
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "portal-tuner",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn manager_or_unavailable(
    state: &AppState,
) -> Result<&Arc<PortalContextManager>, (StatusCode, Json<ErrorResponse>)> {
    state.manager.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "not attached to a portal (offline mode)".to_string(),
        }),
    ))
}

async fn context_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let manager = manager_or_unavailable(&state)?;
    let Some(ctx) = manager.context() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "manager destroyed; POST /reapply after re-init".to_string(),
            }),
        ));
    };
    Ok(Json(serde_json::json!({
        "flavor": ctx.flavor,
        "fallback": ctx.fallback,
        "fingerprint": ctx.fingerprint,
        "selectors": ctx.selectors,
        "detected_at": ctx.detected_at,
        "flags": manager.flags(),
        "patch_state": manager.patch_state(),
        "heal_history": manager.heal_history(),
    })))
}

async fn flags_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LayoutFlags>, (StatusCode, Json<ErrorResponse>)> {
    let manager = manager_or_unavailable(&state)?;
    Ok(Json(manager.flags()))
}

async fn reapply_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReapplyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let manager = manager_or_unavailable(&state)?;
    manager.force_reapply();
    Ok(Json(ReapplyResponse {
        status: "reapplying".to_string(),
    }))
}

/// Offline flavor diagnosis: run detection against a captured HTML document.
/// Geometry probes are not applicable to a snapshot, so the response carries
/// detection output only.
async fn detect_snapshot_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectSnapshotRequest>,
) -> Json<DetectedContext> {
    let detector = Detector::new(Arc::clone(&state.registry));
    let dom = SnapshotDom::new(request.html);
    Json(detector.detect(&dom).await)
}

async fn get_prefs_handler(State(state): State<Arc<AppState>>) -> Json<Prefs> {
    Json(state.prefs.read().unwrap().clone())
}

async fn set_prefs_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Prefs>,
) -> Json<Prefs> {
    {
        let mut prefs = state.prefs.write().unwrap();
        *prefs = request;
    }
    let snapshot = state.prefs.read().unwrap().clone();
    portal_tuner::prefs::save(&snapshot);
    Json(snapshot)
}
