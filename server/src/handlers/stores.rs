//! Store handlers - whole-snapshot reads and writes for the realtime store.

use crate::db;
use crate::error::{AppError, Result};
use crate::websocket::{ConnectionManager, ServerMessage};
use lounge_engine::Snapshot;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

/// Longest accepted store id.
const MAX_STORE_ID_LEN: usize = 128;

/// Query parameters identifying the writing session.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}

/// Reject empty or oversized store ids.
pub fn validate_store_id(store_id: &str) -> Result<()> {
    if store_id.trim().is_empty() {
        return Err(AppError::BadRequest("store id must not be empty".into()));
    }
    if store_id.len() > MAX_STORE_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "store id longer than {MAX_STORE_ID_LEN} bytes"
        )));
    }
    Ok(())
}

/// Current snapshot of a store, `null` when nothing was written yet.
pub async fn handle_get_data(pool: &PgPool, store_id: &str) -> Result<Value> {
    validate_store_id(store_id)?;
    Ok(db::get_store_data(pool, store_id).await?.unwrap_or(Value::Null))
}

/// Replace a store's snapshot and notify every other subscribed session.
///
/// The body must parse as a snapshot; it is stored as sent so keys this
/// build does not know survive.
pub async fn handle_put_data(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    store_id: &str,
    session: Option<&str>,
    data: Value,
) -> Result<()> {
    validate_store_id(store_id)?;
    let snapshot = Snapshot::from_value(data.clone())?;

    db::put_store_data(pool, store_id, &data).await?;

    let sent = conn_manager.broadcast_to_store(store_id, session, ServerMessage::Snapshot { data });
    tracing::debug!(
        store = %store_id,
        records = snapshot.record_count(),
        notified = sent,
        "Stored snapshot"
    );

    Ok(())
}
