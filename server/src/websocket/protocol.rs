//! WebSocket message protocol definitions.
//!
//! All messages are JSON-encoded with a `type` tag. The relay only talks;
//! anything a client sends is ignored.

use serde::Serialize;
use serde_json::Value;

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The store's snapshot changed.
    Snapshot { data: Value },

    /// Number of sessions connected to the store.
    Presence { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_are_type_tagged() {
        let snapshot = ServerMessage::Snapshot {
            data: json!({"pendingSavings": 10}),
        };
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({"type": "snapshot", "data": {"pendingSavings": 10}})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Presence { count: 2 }).unwrap(),
            json!({"type": "presence", "count": 2})
        );
    }
}
