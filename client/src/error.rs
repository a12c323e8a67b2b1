//! Error types for the sync agent.

use crate::config::ConfigError;
use thiserror::Error;

/// Failure talking to a remote store.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote rejected the credential")]
    Unauthorized,

    #[error("invalid remote URL: {0}")]
    InvalidUrl(String),

    #[error("undecodable remote payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(#[from] lounge_engine::Error),

    #[error("remote unavailable")]
    Unavailable,
}

/// Failure reading or writing local state.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(#[from] lounge_engine::Error),
}

/// All errors surfaced by the agent.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Engine(#[from] lounge_engine::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sync agent has shut down")]
    AgentClosed,
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, SyncError>;
