//! Unit tests for the subscription socket protocol.
//!
//! Frames are written here exactly as the relay serializes them and parsed
//! with the client's decoder.

use lounge_engine::{Category, RecordId, Snapshot};
use lounge_sync::transport::{RelayMessage, TransportEvent};
use serde_json::json;

#[cfg(test)]
mod websocket_protocol_tests {
    use super::*;

    #[test]
    fn test_snapshot_frame_deserialization() {
        let frame = r#"{
            "type": "snapshot",
            "data": {"employees": [{"id": 5, "name": "Mika", "active": true}]}
        }"#;

        let message: RelayMessage = serde_json::from_str(frame).unwrap();

        match TransportEvent::from(message) {
            TransportEvent::Snapshot(data) => {
                let snapshot = Snapshot::from_value(data).unwrap();
                assert!(snapshot.contains(Category::Employees, RecordId::Int(5)));
            }
            other => panic!("Expected snapshot event, got {other:?}"),
        }
    }

    #[test]
    fn test_presence_frame_deserialization() {
        let frame = r#"{"type": "presence", "count": 3}"#;

        let message: RelayMessage = serde_json::from_str(frame).unwrap();

        assert_eq!(message, RelayMessage::Presence { count: 3 });
    }

    #[test]
    fn test_frames_serialize_with_type_tag() {
        let message = RelayMessage::Snapshot {
            data: json!({"pendingSavings": 0}),
        };

        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["data"]["pendingSavings"], 0);
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        let frame = r#"{"type": "ping"}"#;

        assert!(serde_json::from_str::<RelayMessage>(frame).is_err());
    }

    #[test]
    fn test_presence_list_shape() {
        // GET /stores/{store}/users
        let body = r#"[
            {"session": "a", "connectedAt": "2024-01-01T00:00:00Z"},
            {"session": "b", "connectedAt": "2024-01-01T00:00:05Z"}
        ]"#;

        let users: Vec<serde_json::Value> = serde_json::from_str(body).unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[1]["session"], "b");
    }
}
