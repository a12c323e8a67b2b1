//! Database operations for the documents table.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

/// A stored document row from the database.
#[derive(Debug)]
pub struct StoredDocument {
    pub id: String,
    pub version: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Insert a new document at version 1.
pub async fn create_document(
    pool: &PgPool,
    id: &str,
    content: &str,
) -> Result<StoredDocument, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        INSERT INTO documents (id, version, content)
        VALUES ($1, 1, $2)
        RETURNING id, version, content, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(content)
    .fetch_one(pool)
    .await
}

/// Get a document by ID.
pub async fn get_document(pool: &PgPool, id: &str) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT id, version, content, created_at, updated_at
        FROM documents
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Replace a document's content, bumping its version.
///
/// Returns `None` when the document does not exist.
pub async fn update_document(
    pool: &PgPool,
    id: &str,
    content: &str,
) -> Result<Option<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        UPDATE documents
        SET content = $2, version = version + 1, updated_at = NOW()
        WHERE id = $1
        RETURNING id, version, content, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(content)
    .fetch_optional(pool)
    .await
}
