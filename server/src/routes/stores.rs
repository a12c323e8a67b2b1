//! Realtime store routes.

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::error::Result;
use crate::handlers::{
    handle_get_data, handle_put_data, handle_websocket_connection, validate_store_id,
    SessionQuery,
};
use crate::websocket::PresenceEntry;
use crate::AppState;

/// Create store routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stores/{store}/data", get(get_data).put(put_data))
        .route("/stores/{store}/users", get(list_users))
        .route("/stores/{store}/ws", get(subscribe))
}

/// GET /stores/{store}/data - Current snapshot, `null` when empty.
async fn get_data(State(state): State<AppState>, Path(store): Path<String>) -> Result<Json<Value>> {
    let data = handle_get_data(&state.pool, &store).await?;
    Ok(Json(data))
}

/// PUT /stores/{store}/data?session= - Replace the snapshot.
async fn put_data(
    State(state): State<AppState>,
    Path(store): Path<String>,
    Query(query): Query<SessionQuery>,
    Json(data): Json<Value>,
) -> Result<StatusCode> {
    handle_put_data(
        &state.pool,
        &state.conn_manager,
        &store,
        query.session.as_deref(),
        data,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /stores/{store}/users - Sessions currently present.
async fn list_users(
    State(state): State<AppState>,
    Path(store): Path<String>,
) -> Result<Json<Vec<PresenceEntry>>> {
    validate_store_id(&store)?;
    Ok(Json(state.conn_manager.presence(&store)))
}

/// GET /stores/{store}/ws?session= - Subscribe to snapshot changes.
async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(store): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Response> {
    validate_store_id(&store)?;
    let session = query
        .session
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let conn_manager = state.conn_manager.clone();

    Ok(ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, conn_manager, store, session)
    }))
}
