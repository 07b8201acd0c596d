//! HTTP request handlers for the KeyRouter hook server

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::hard_apply::HostFiles;
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::PinCache;
use crate::shared::Workflow;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod hooks;
pub mod metrics;
pub mod retry;
pub mod route;
pub mod usage;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    workflow: Arc<Workflow>,
    pins: Arc<PinCache>,
    host: Arc<HostFiles>,
}

impl AppState {
    /// Create state around an already wired workflow
    ///
    /// The session pin cache expires entries after `hard_apply.pin_ttl_seconds`.
    /// Pin mode edits the host files named in `config.paths`.
    pub fn new(config: Arc<Config>, workflow: Workflow) -> Self {
        let pins = Arc::new(PinCache::new(config.hard_apply.pin_ttl()));
        let host = Arc::new(HostFiles::from_paths(&config.paths));
        Self {
            config,
            workflow: Arc::new(workflow),
            pins,
            host,
        }
    }

    /// Create state from configuration, loading the catalog and state file
    ///
    /// # Errors
    /// Returns an error if the provider catalog cannot be parsed or metrics
    /// registration fails.
    pub fn from_config(config: Arc<Config>) -> AppResult<Self> {
        let workflow = Workflow::from_config(&config)?;
        Ok(Self::new(config, workflow))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn pins(&self) -> &PinCache {
        &self.pins
    }

    pub fn host(&self) -> &HostFiles {
        &self.host
    }

    pub fn metrics(&self) -> &Metrics {
        self.workflow.metrics()
    }

    /// Run file-touching work on the blocking pool
    ///
    /// Workflow calls load and save the state file and may re-read the
    /// catalog; none of that belongs on a runtime worker thread.
    pub async fn run_blocking<T, F>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce(AppState) -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || work(state))
            .await
            .map_err(|e| AppError::Internal(format!("Blocking task failed: {e}")))
    }
}

/// Build the axum router with every endpoint, tracing and request ids
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .route("/route", post(route::handler))
        .route("/retry", post(retry::handler))
        .route("/usage", get(usage::usage_handler))
        .route(
            "/quota",
            get(usage::quota_handler).put(usage::set_quota_handler),
        )
        .route(
            "/hooks/before_model_resolve",
            post(hooks::before_model_resolve),
        )
        .route("/hooks/before_agent_start", post(hooks::before_agent_start))
        .route("/hooks/agent_end", post(hooks::agent_end))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
