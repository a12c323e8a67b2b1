//! Database operations for the store_data table.

use serde_json::Value;
use sqlx::{PgPool, Row};

/// Current snapshot of a store, if anything was ever written.
pub async fn get_store_data(pool: &PgPool, store_id: &str) -> Result<Option<Value>, sqlx::Error> {
    let row = sqlx::query("SELECT data FROM store_data WHERE store_id = $1")
        .bind(store_id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| row.try_get("data")).transpose()
}

/// Number of stores that hold a snapshot.
pub async fn count_stores(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS stores FROM store_data")
        .fetch_one(pool)
        .await?;
    row.try_get("stores")
}

/// Replace the snapshot of a store.
pub async fn put_store_data(pool: &PgPool, store_id: &str, data: &Value) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO store_data (store_id, data, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (store_id) DO UPDATE SET
            data = EXCLUDED.data,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(store_id)
    .bind(data)
    .execute(pool)
    .await?;

    Ok(())
}
