//! Liveness and relay status.

use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{db, AppState};

/// Longest the health check waits on the database.
const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database did not answer.
    pub status: &'static str,
    pub version: &'static str,
    /// Stores holding a snapshot; absent while the database is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stores: Option<i64>,
    /// Live WebSocket subscriptions across all stores.
    pub connections: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stores = match tokio::time::timeout(DB_CHECK_TIMEOUT, db::count_stores(&state.pool)).await {
        Ok(Ok(count)) => Some(count),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "health check could not count stores");
            None
        }
        Err(_) => {
            tracing::warn!("health check timed out waiting for the database");
            None
        }
    };

    Json(HealthResponse {
        status: if stores.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        stores,
        connections: state.conn_manager.connection_count(),
    })
}

async fn root() -> &'static str {
    "Lounge Relay"
}
