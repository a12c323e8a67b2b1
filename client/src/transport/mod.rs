//! Remote stores the agent syncs with.
//!
//! Every transport moves whole snapshots. Pulls and pushes are plain
//! request/response calls; a transport that can notify about remote
//! changes returns an event stream from [`RemoteTransport::subscribe`].

mod document;
mod memory;
mod realtime;

pub use document::{Document, DocumentTransport};
pub use memory::{MemoryHub, MemoryTransport};
pub use realtime::RealtimeTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use lounge_engine::{Snapshot, Source};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Capacity of subscription channels.
pub(crate) const EVENT_BUFFER: usize = 64;

/// Something a subscribed transport observed on the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote snapshot changed. Not validated yet.
    Snapshot(Value),
    /// Number of sessions present.
    Presence(usize),
}

/// A remote snapshot store.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Which source this transport feeds.
    fn source(&self) -> Source;

    /// Current remote snapshot. `None` when the remote holds nothing yet.
    async fn pull(&self) -> Result<Option<Value>, TransportError>;

    /// Replace the remote snapshot.
    async fn push(&self, snapshot: &Snapshot) -> Result<(), TransportError>;

    /// Start receiving change notifications.
    ///
    /// `None` means the transport cannot notify and must be polled. The
    /// returned stream ends when the connection drops.
    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<TransportEvent>>, TransportError> {
        Ok(None)
    }
}

/// Message sent by the relay over a subscription socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    Snapshot { data: Value },
    Presence { count: usize },
}

impl From<RelayMessage> for TransportEvent {
    fn from(message: RelayMessage) -> Self {
        match message {
            RelayMessage::Snapshot { data } => TransportEvent::Snapshot(data),
            RelayMessage::Presence { count } => TransportEvent::Presence(count),
        }
    }
}

/// Map a non-success response to an error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(TransportError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}
