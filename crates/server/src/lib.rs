//! Fathom Server: the network front end of the query broker.
//!
//! Exposes one shared [`QueryBroker`] via:
//! - **WebSocket (`/ws`)**: `query` / `cancel` events in, `query-response` events out.
//! - **REST (`/api/v1`)**: broker stats and the global query log.
//! - **Observability**: `/health`, `/ready` and Prometheus `/metrics`.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::{error, info};

use fathom_common::config::{load_env_file, AppConfig};
use fathom_common::telemetry::{init_tracing, ERRORS_TARGET, METRICS_TARGET};
use fathom_runtime::{bootstrap, metrics, BrokerSettings, QueryBroker};

pub mod api;
pub mod transport;

pub const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<QueryBroker>,
    pub server_name: String,
}

impl AppState {
    pub fn new(broker: Arc<QueryBroker>, server_name: impl Into<String>) -> Self {
        Self {
            broker,
            server_name: server_name.into(),
        }
    }
}

/// All routes served on the listen address.
pub fn app(state: AppState) -> Router {
    app_with_extensions(state, Router::new())
}

fn app_with_extensions(state: AppState, extra_api: Router) -> Router {
    let api_router = api::create_api_router(state.clone()).merge(extra_api);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(transport::ws_handler))
        .with_state(state)
        .nest("/api/v1", api_router)
}

pub struct FathomServer {
    app_config_path: String,
    api_router: Router,
}

impl Default for FathomServer {
    fn default() -> Self {
        Self {
            app_config_path: "config/fathom.yaml".to_string(),
            api_router: Router::new(),
        }
    }
}

impl FathomServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_config(mut self, app_config_path: &str) -> Self {
        self.app_config_path = app_config_path.to_string();
        self
    }

    /// Extra routes merged under `/api/v1`.
    pub fn with_api_router(mut self, router: Router) -> Self {
        self.api_router = router;
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        load_env_file();
        let app_config = AppConfig::from_file(&self.app_config_path)?;
        init_tracing(&app_config.logging)?;
        metrics::register_all();

        // No dataset, no server.
        let executor = match bootstrap::bootstrap(&app_config.dataset).await {
            Ok(executor) => executor,
            Err(e) => {
                error!(target: ERRORS_TARGET, code = %e.code, error = %e, "Dataset bootstrap failed");
                return Err(anyhow::anyhow!(e)).context("Dataset bootstrap failed");
            }
        };

        let broker = Arc::new(QueryBroker::new(
            Arc::new(executor),
            BrokerSettings::from(&app_config.broker),
        ));
        let state = AppState::new(broker.clone(), app_config.server.name.clone());
        let router = app_with_extensions(state, self.api_router);

        spawn_metrics_task(broker);

        let addr: SocketAddr = app_config
            .server
            .listen_addr
            .parse()
            .context("Invalid listen address")?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("{} listening on http://{}", app_config.server.name, addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

fn spawn_metrics_task(broker: Arc<QueryBroker>) {
    let start_time = Instant::now();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(METRICS_REFRESH_INTERVAL).await;
            let stats = broker.stats().await;
            info!(
                target: METRICS_TARGET,
                active_sessions = stats.active_sessions,
                cached_entries = stats.cached_entries,
                log_length = stats.log_length,
                uptime_seconds = start_time.elapsed().as_secs(),
            );
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// The broker only exists once the dataset is loaded, so serving means ready.
async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({ "status": "ready", "server": state.server_name }))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = metrics::REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
