//! Realtime store on the relay: REST for reads and writes, a WebSocket for
//! change notifications and presence.
//!
//! Each transport instance holds one session id. The relay counts the
//! session as present for as long as its socket stays open.

use super::{check_status, RelayMessage, RemoteTransport, TransportEvent, EVENT_BUFFER};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::StreamExt;
use lounge_engine::{Snapshot, Source};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

pub struct RealtimeTransport {
    client: Client,
    base_url: Url,
    store_id: String,
    session: Uuid,
}

impl RealtimeTransport {
    pub fn new(base_url: &str, store_id: impl Into<String>) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            store_id: store_id.into(),
            session: Uuid::new_v4(),
        })
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// `<base>/stores/<store>/<leaf>`, with the store id escaped.
    fn store_url(&self, leaf: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["stores", self.store_id.as_str(), leaf]);
        Ok(url)
    }

    fn socket_url(&self) -> Result<Url, TransportError> {
        let mut url = self.store_url("ws")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        url.query_pairs_mut()
            .append_pair("session", &self.session.to_string());
        Ok(url)
    }

    /// Number of sessions the relay currently sees.
    pub async fn presence(&self) -> Result<usize, TransportError> {
        let response = self.client.get(self.store_url("users")?).send().await?;
        let users: Vec<Value> = check_status(response).await?.json().await?;
        Ok(users.len())
    }
}

#[async_trait]
impl RemoteTransport for RealtimeTransport {
    fn source(&self) -> Source {
        Source::Realtime
    }

    async fn pull(&self) -> Result<Option<Value>, TransportError> {
        let response = self.client.get(self.store_url("data")?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = check_status(response).await?.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn push(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        let response = self
            .client
            .put(self.store_url("data")?)
            .query(&[("session", self.session.to_string())])
            .json(snapshot)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<TransportEvent>>, TransportError> {
        let url = self.socket_url()?;
        let (mut ws, _) = connect_async(url.as_str()).await?;
        tracing::info!(session = %self.session, store = %self.store_id, "realtime subscription open");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = self.session;
        tokio::spawn(async move {
            while let Some(message) = ws.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        tracing::warn!(%session, error = %err, "realtime socket error");
                        break;
                    }
                };
                let event = match serde_json::from_str::<RelayMessage>(&text) {
                    Ok(message) => TransportEvent::from(message),
                    Err(err) => {
                        tracing::warn!(%session, error = %err, "ignoring unknown relay message");
                        continue;
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::info!(%session, "realtime subscription closed");
        });

        Ok(Some(rx))
    }
}
