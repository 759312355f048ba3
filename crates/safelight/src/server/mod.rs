//! HTTP boundary of the build server
//!
//! - `POST /build?functionName=&pathToGen=&target=` builds or reuses a
//!   bundle and answers with its signature
//! - `GET /safelight_<sig>_<target>.<ext>` returns cached artifact bytes,
//!   or an empty body when the artifact is not cached
//! - `GET /buildlog` and `GET /buildlog/{id}` return per-build log text
//! - `GET /nacl_sniffer.nmf` and `GET /visualizers.nmf` describe prebuilt
//!   binaries
//! - `GET /health` is a liveness probe

mod handlers;
mod logs;

pub use handlers::ensure_buildable_target;
pub use logs::BuildLogRegistry;

use crate::config::ServerConfig;
use crate::{Error, Result};
use axum::Router;
use axum::routing::{get, post};
use regex::Regex;
use safelight_builder::BuildCoordinator;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Response header carrying the id of the build log for a request
pub const BUILD_ID_HEADER: &str = "x-safelight-build-id";

const ARTIFACT_PATH: &str =
    r"^safelight_([0-9a-f]+)_(arm-32[^.]*|x86-32[^.]*|x86-64[^.]*)\.(nexe|s|stmt|html|nmf)$";

/// Shared state of all request handlers
#[derive(Debug, Clone)]
pub struct AppState {
    coordinator: Arc<BuildCoordinator>,
    logs: Arc<BuildLogRegistry>,
    prebuilt_nexe_dir: Arc<str>,
    artifact_path: Regex,
}

impl AppState {
    /// State serving builds from `coordinator`
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact path pattern cannot be compiled
    pub fn new(
        coordinator: Arc<BuildCoordinator>,
        log_history: NonZeroUsize,
        prebuilt_nexe_dir: impl Into<Arc<str>>,
    ) -> Result<Self> {
        let artifact_path = Regex::new(ARTIFACT_PATH)
            .map_err(|e| Error::server(format!("Invalid artifact route pattern: {e}")))?;
        Ok(Self {
            coordinator,
            logs: Arc::new(BuildLogRegistry::new(log_history)),
            prebuilt_nexe_dir: prebuilt_nexe_dir.into(),
            artifact_path,
        })
    }

    /// State built from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let coordinator = Arc::new(config.coordinator()?);
        let history = NonZeroUsize::new(config.log_history)
            .ok_or_else(|| Error::config("log_history must be greater than zero"))?;
        Self::new(
            coordinator,
            history,
            config.prebuilt_nexe_dir.to_string_lossy().into_owned(),
        )
    }

    /// The coordinator behind `/build`
    #[must_use]
    pub fn coordinator(&self) -> &Arc<BuildCoordinator> {
        &self.coordinator
    }

    /// Registry behind `/buildlog`
    #[must_use]
    pub fn logs(&self) -> &BuildLogRegistry {
        &self.logs
    }
}

/// All routes of the build server
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/build", post(handlers::build))
        .route("/buildlog", get(handlers::latest_log))
        .route("/buildlog/{id}", get(handlers::log_by_id))
        .route("/nacl_sniffer.nmf", get(handlers::nacl_sniffer_manifest))
        .route("/visualizers.nmf", get(handlers::visualizers_manifest))
        .route("/health", get(handlers::health))
        .route("/{file}", get(handlers::artifact))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener fails
pub async fn serve(config: &ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let state = AppState::from_config(config)?;
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::server(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(
        %addr,
        cache_size = config.cache_size,
        timeout_secs = config.timeout_secs,
        generator = %config.generator.display(),
        "Safelight is running"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}
