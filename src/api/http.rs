//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::websocket::ws_handler;
use crate::config::HubConfig;
use crate::error::HubResult;
use crate::hub::{Hub, HubStats};
use crate::models::StateModel;

/// Body of `GET /api/state`
#[derive(Debug, Serialize)]
pub struct StateResponse<S> {
    pub version: u64,
    pub state: Arc<S>,
}

/// Create the Axum router with all endpoints
pub fn create_router<M: StateModel>(hub: Arc<Hub<M>>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // WebSocket endpoints
        .route("/", get(ws_handler::<M>))
        .route("/ws", get(ws_handler::<M>))
        // Health check
        .route("/health", get(health_check))
        // Read-only views of the hub
        .route("/api/state", get(get_state::<M>))
        .route("/api/stats", get(get_stats::<M>))
        .layer(cors)
        .with_state(hub)
}

/// Bind the listener and serve until Ctrl-C
pub async fn serve<M: StateModel>(model: M, config: HubConfig) -> HubResult<()> {
    let addrs = config.listen_addrs().await?;
    let hub = Arc::new(Hub::new(model, config));

    let listener = TcpListener::bind(addrs.as_slice()).await?;
    let addr = listener.local_addr()?;
    let broadcaster = hub.spawn_interval_broadcaster();
    let stats = hub.stats();
    info!(%addr, model = stats.model, mode = %stats.mode, "sync hub listening");

    axum::serve(listener, create_router(Arc::clone(&hub)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = broadcaster {
        task.abort();
    }
    info!(sessions = hub.registry().len(), "sync hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn get_state<M: StateModel>(State(hub): State<Arc<Hub<M>>>) -> Json<StateResponse<M::State>> {
    let snapshot = hub.snapshot();
    Json(StateResponse {
        version: snapshot.version,
        state: snapshot.state,
    })
}

async fn get_stats<M: StateModel>(State(hub): State<Arc<Hub<M>>>) -> Json<HubStats> {
    Json(hub.stats())
}
