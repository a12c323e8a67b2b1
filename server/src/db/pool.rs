//! Postgres pool shared by the realtime stores and the document store.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

pub type Pool = PgPool;

/// How long a request waits for a free connection before failing.
///
/// Agents retry on their next poll, so failing fast beats queueing.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Connections idle this long are closed; stores are written in bursts.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Pool settings for the relay.
pub fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(Some(IDLE_TIMEOUT))
}

pub async fn create_pool(config: &Config) -> Result<Pool, sqlx::Error> {
    let pool = pool_options(config).connect(&config.database_url).await?;
    tracing::info!(max = config.max_db_connections, "database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
