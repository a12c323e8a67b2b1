//! Lounge Sync - headless sync agent.
//!
//! Loads local state, connects to the configured remotes and applies
//! mutations read from stdin, one JSON object per line. Notices and
//! connection changes are logged.
//!
//! `lounge-sync create-document` creates a document holding the local state
//! and prints its id, for use as `LOUNGE_DOCUMENT_ID`.

use lounge_engine::{Mutation, Snapshot};
use lounge_sync::{
    AgentBuilder, AgentUpdate, Config, DocumentTransport, FilePersistence, LocalPersistence,
    RealtimeTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lounge_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    if std::env::args().nth(1).as_deref() == Some("create-document") {
        return create_document().await;
    }
    let config = Config::from_env()?;
    let persistence = FilePersistence::new(&config.data_dir);

    tracing::info!(
        store = %config.store_id,
        data = %persistence.path().display(),
        "Starting Lounge Sync"
    );

    let mut builder = AgentBuilder::new(persistence)
        .touch_device(config.touch_device)
        .poll_interval(config.poll_interval);
    if let Some(url) = &config.relay_url {
        builder = builder.transport(RealtimeTransport::new(url, config.store_id.clone())?);
    }
    if let Some(document) = &config.document {
        builder = builder.transport(DocumentTransport::new(
            &document.base_url,
            document.document_id.clone(),
            document.token.clone(),
        )?);
    }
    let agent = builder.spawn()?;

    let mut updates = agent.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(AgentUpdate::Notice(notice)) => {
                    tracing::info!(level = ?notice.level, "{}", notice.message)
                }
                Ok(AgentUpdate::Status(status)) => tracing::info!(
                    realtime = status.realtime_online,
                    document = status.document_online,
                    presence = status.presence,
                    "connection status"
                ),
                Ok(AgentUpdate::Refresh { .. }) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "updates lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let mutation: Mutation = match serde_json::from_str(&line) {
                    Ok(mutation) => mutation,
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring unreadable mutation");
                        continue;
                    }
                };
                match agent.apply(mutation).await {
                    Ok(applied) => println!("{}", serde_json::to_string(&applied)?),
                    Err(err) => tracing::warn!(error = %err, "mutation rejected"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    agent.shutdown().await?;
    Ok(())
}

/// Runs before `Config::from_env`, which would reject a token without an id.
async fn create_document() -> Result<(), Box<dyn std::error::Error>> {
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    let token = var("LOUNGE_DOCUMENT_TOKEN")
        .ok_or("LOUNGE_DOCUMENT_TOKEN environment variable is required")?;
    let base_url = var("LOUNGE_DOCUMENT_URL")
        .unwrap_or_else(|| lounge_sync::config::DEFAULT_DOCUMENT_URL.to_string());
    let persistence = FilePersistence::new(var("LOUNGE_DATA_DIR").unwrap_or_else(|| ".".into()));

    let snapshot = persistence.load(&Snapshot::new())?;
    let id = DocumentTransport::create(&base_url, &token, &snapshot).await?;
    println!("{id}");
    Ok(())
}
