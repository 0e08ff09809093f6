//! Health check endpoints

use crate::broadcast::RedisBroadcaster;
use crate::metrics::GatewayMetrics;
use crate::shard::ShardState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub pool_id: u64,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub pool_id: u64,
    pub shards_total: usize,
    pub shards_ready: usize,
    pub broadcast_connected: bool,
    pub guilds_total: u64,
    pub events_received: u64,
    pub events_dispatched: u64,
    pub dispatch_failures: u64,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub shard_state: ShardState,
    pub broadcaster: Option<Arc<RedisBroadcaster>>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Local mode (no broadcaster) counts as connected
    fn broadcast_connected(&self) -> bool {
        self.broadcaster.as_ref().map_or(true, |b| b.is_connected())
    }
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Ready when at least one shard is ready and the broadcaster is up
pub fn is_ready(shards_ready: usize, broadcast_connected: bool) -> bool {
    shards_ready > 0 && broadcast_connected
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        pool_id: state.shard_state.pool_id(),
    })
}

/// Readiness endpoint
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shards = &state.shard_state;
    let shards_ready = shards.ready_shards();
    let broadcast_connected = state.broadcast_connected();
    let ready = is_ready(shards_ready, broadcast_connected);

    let response = ReadyResponse {
        ready,
        pool_id: shards.pool_id(),
        shards_total: shards.shard_count(),
        shards_ready,
        broadcast_connected,
        guilds_total: shards.total_guilds(),
        events_received: shards.total_events_received(),
        events_dispatched: shards.total_events_dispatched(),
        dispatch_failures: shards.total_dispatch_failures(),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_shards_ready(
        state.shard_state.pool_id(),
        state.shard_state.ready_shards(),
    );
    state.metrics.set_broadcast_connected(state.broadcast_connected());

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
