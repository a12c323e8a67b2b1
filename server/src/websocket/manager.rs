//! WebSocket connection manager.
//!
//! Tracks live connections per store and fans snapshots and presence
//! counts out to them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Store the connection subscribed to
    pub store_id: String,
    /// Client-chosen session id
    pub session: String,
    pub connected_at: DateTime<Utc>,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// One present session, as listed by `GET /stores/{store}/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub session: String,
    pub connected_at: DateTime<Utc>,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Index of connections by store for fan-out.
    by_store: DashMap<String, Vec<String>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection and announce the new presence count.
    ///
    /// Returns the connection ID.
    pub fn register(&self, store_id: &str, session: &str, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                store_id: store_id.to_string(),
                session: session.to_string(),
                connected_at: Utc::now(),
                sender,
            },
        );
        self.by_store
            .entry(store_id.to_string())
            .or_default()
            .push(conn_id.clone());

        tracing::info!(conn_id = %conn_id, store = %store_id, session = %session, "WebSocket connection registered");
        self.announce_presence(store_id);

        conn_id
    }

    /// Unregister a connection and announce the new presence count.
    pub fn unregister(&self, conn_id: &str) {
        let Some((_, conn)) = self.connections.remove(conn_id) else {
            return;
        };
        if let Some(mut conn_ids) = self.by_store.get_mut(&conn.store_id) {
            conn_ids.retain(|id| id != conn_id);
            // Clean up empty entries
            if conn_ids.is_empty() {
                drop(conn_ids);
                self.by_store.remove(&conn.store_id);
            }
        }

        tracing::info!(conn_id = %conn_id, store = %conn.store_id, "WebSocket connection unregistered");
        self.announce_presence(&conn.store_id);
    }

    /// Send a message to every connection of a store, skipping the writer's
    /// session.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast_to_store(
        &self,
        store_id: &str,
        except_session: Option<&str>,
        message: ServerMessage,
    ) -> usize {
        let mut sent_count = 0;

        for conn_id in self.store_connections(store_id) {
            let Some(conn) = self.connections.get(&conn_id) else {
                continue;
            };
            if Some(conn.session.as_str()) == except_session {
                continue;
            }
            if conn.sender.send(message.clone()).is_ok() {
                sent_count += 1;
            }
        }

        tracing::debug!(store = %store_id, recipients = sent_count, "Broadcast message to store");

        sent_count
    }

    /// Sessions currently connected to a store.
    pub fn presence(&self, store_id: &str) -> Vec<PresenceEntry> {
        let mut entries: Vec<PresenceEntry> = self
            .store_connections(store_id)
            .iter()
            .filter_map(|id| self.connections.get(id))
            .map(|conn| PresenceEntry {
                session: conn.session.clone(),
                connected_at: conn.connected_at,
            })
            .collect();
        entries.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        entries
    }

    pub fn presence_count(&self, store_id: &str) -> usize {
        self.by_store.get(store_id).map_or(0, |ids| ids.len())
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn announce_presence(&self, store_id: &str) {
        let count = self.presence_count(store_id);
        self.broadcast_to_store(store_id, None, ServerMessage::Presence { count });
    }

    /// Snapshot of a store's connection ids, so no index lock is held while
    /// sending.
    fn store_connections(&self, store_id: &str) -> Vec<String> {
        self.by_store
            .get(store_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_and_unregister_update_presence() {
        let manager = ConnectionManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let conn1 = manager.register("Rush Lounge", "s1", tx1);
        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerMessage::Presence { count: 1 }
        );

        let conn2 = manager.register("Rush Lounge", "s2", tx2);
        assert_eq!(manager.presence_count("Rush Lounge"), 2);
        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerMessage::Presence { count: 2 }
        );

        manager.unregister(&conn2);
        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerMessage::Presence { count: 1 }
        );

        manager.unregister(&conn1);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.presence_count("Rush Lounge"), 0);
    }

    #[test]
    fn broadcast_skips_writer_and_other_stores() {
        let manager = ConnectionManager::new();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel();
        let (peer_tx, mut peer_rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();

        manager.register("bar", "writer", writer_tx);
        manager.register("bar", "peer", peer_tx);
        manager.register("cafe", "other", other_tx);
        while writer_rx.try_recv().is_ok() {}
        while peer_rx.try_recv().is_ok() {}
        while other_rx.try_recv().is_ok() {}

        let message = ServerMessage::Snapshot {
            data: json!({"pendingSavings": 1}),
        };
        let sent = manager.broadcast_to_store("bar", Some("writer"), message.clone());

        assert_eq!(sent, 1);
        assert_eq!(peer_rx.try_recv().unwrap(), message);
        assert!(writer_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn presence_lists_sessions() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.register("bar", "s1", tx);

        let entries = manager.presence("bar");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session, "s1");
        assert!(manager.presence("cafe").is_empty());
    }
}
