//! HTTP surface.
//!
//! | Method | Path       | Auth | Action                                  |
//! |--------|------------|------|-----------------------------------------|
//! | GET    | `/`        | no   | Service info                            |
//! | GET    | `/health`  | no   | Probe every device                      |
//! | POST   | `/prime`   | yes  | Discover and prime every device         |
//! | POST   | `/capture` | yes  | Discover, prime where needed, capture   |
//!
//! Auth is a bearer token, enabled only when one is configured.

mod auth;
pub mod dto;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, MutexGuard};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bridge::BridgeClient;
use crate::config::{CaptureProfile, ConfigFile, Settings};
use crate::device::DeviceManager;
use crate::error::{McError, Result};
use crate::session::{CaptureSession, SessionCache, SessionOptions};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub config_path: Option<Arc<PathBuf>>,
    pub bridge: Arc<dyn BridgeClient>,
    pub cache: Arc<SessionCache>,
    pub devices: DeviceManager,
    api_token: Option<Arc<str>>,
    profile: Arc<CaptureProfile>,
    request_lock: Option<Arc<Mutex<()>>>,
}

impl AppState {
    pub fn new(
        config: &ConfigFile,
        config_path: Option<PathBuf>,
        bridge: Arc<dyn BridgeClient>,
    ) -> Self {
        let settings = config.settings.clone();
        Self {
            devices: DeviceManager::from_settings(Arc::clone(&bridge), &settings),
            profile: Arc::new(settings.camera_defaults.clone()),
            settings: Arc::new(settings),
            config_path: config_path.map(Arc::new),
            bridge,
            cache: Arc::new(SessionCache::new()),
            api_token: config.server.api_token.as_deref().map(Arc::from),
            request_lock: config
                .server
                .serialize_requests
                .then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// Override the configured token (e.g. from `--api-token`).
    #[must_use]
    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(Arc::from(token));
        }
        self
    }

    pub const fn auth_enabled(&self) -> bool {
        self.api_token.is_some()
    }

    /// A fresh session over the shared cache.
    pub fn session(&self) -> CaptureSession {
        CaptureSession::new(
            Arc::clone(&self.bridge),
            Arc::clone(&self.cache),
            Arc::clone(&self.profile),
            SessionOptions::from_settings(&self.settings),
        )
    }

    /// Hold the request lock when requests are serialized.
    async fn exclusive(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.request_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }
}

/// Build the router with tracing and auth layers applied.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/prime", post(handlers::prime))
        .route("/capture", post(handlers::capture))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns [`McError::ServerFailed`] if the address cannot be bound or the
/// server stops with an error.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await.map_err(|e| McError::ServerFailed {
        addr: bind.to_string(),
        reason: e.to_string(),
    })?;
    let local = listener.local_addr()?;
    info!(
        addr = %local,
        auth = state.auth_enabled(),
        serialized = state.request_lock.is_some(),
        "Server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| McError::ServerFailed {
            addr: local.to_string(),
            reason: e.to_string(),
        })?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not install Ctrl-C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
