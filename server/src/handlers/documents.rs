//! Document handlers - versioned snapshot documents behind a bearer token.

use crate::db::{self, StoredDocument};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use lounge_engine::Snapshot;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Request body for create and update.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    #[serde(default)]
    pub content: String,
}

/// A document as returned to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub version: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredDocument> for DocumentResponse {
    fn from(doc: StoredDocument) -> Self {
        Self {
            id: doc.id,
            version: doc.version,
            content: doc.content,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// Content must be empty or a snapshot.
fn validate_content(content: &str) -> Result<()> {
    if !content.trim().is_empty() {
        Snapshot::from_json(content)?;
    }
    Ok(())
}

pub async fn handle_create_document(
    pool: &PgPool,
    request: DocumentRequest,
) -> Result<DocumentResponse> {
    validate_content(&request.content)?;
    let id = uuid::Uuid::new_v4().simple().to_string();
    let doc = db::create_document(pool, &id, &request.content).await?;
    tracing::info!(id = %doc.id, "Created document");
    Ok(doc.into())
}

pub async fn handle_get_document(pool: &PgPool, id: &str) -> Result<DocumentResponse> {
    db::get_document(pool, id)
        .await?
        .map(DocumentResponse::from)
        .ok_or_else(|| AppError::NotFound(format!("document {id}")))
}

pub async fn handle_update_document(
    pool: &PgPool,
    id: &str,
    request: DocumentRequest,
) -> Result<DocumentResponse> {
    validate_content(&request.content)?;
    let doc = db::update_document(pool, id, &request.content)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("document {id}")))?;
    tracing::debug!(id = %doc.id, version = doc.version, "Updated document");
    Ok(doc.into())
}
