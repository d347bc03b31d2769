//! WebSocket Message Types
//!
//! Defines the event envelopes pushed to viewers and the few control
//! messages a viewer may send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::telemetry::ZoneActivation;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// An occupancy sensor reported, with the zones derived after the update
    Occupancy {
        device_id: String,
        state: bool,
        zones: ZoneActivation,
        /// Receive time in milliseconds
        timestamp: i64,
    },
    /// Instantaneous environment sensor value
    EnvironmentReading {
        device_id: String,
        property: String,
        value: Value,
        timestamp: i64,
    },
    /// Appliance field, or the whole bundle when the field is absent
    ApplianceState {
        device_id: String,
        property: String,
        value: Value,
        timestamp: i64,
    },
    /// Connection established
    Connected {
        /// Unique connection identifier
        connection_id: String,
    },
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
}

impl ServerMessage {
    /// Device the event is about, for pipeline envelopes
    pub fn device_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Occupancy { device_id, .. }
            | ServerMessage::EnvironmentReading { device_id, .. }
            | ServerMessage::ApplianceState { device_id, .. } => Some(device_id),
            _ => None,
        }
    }

    /// Wire name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Occupancy { .. } => "occupancy",
            ServerMessage::EnvironmentReading { .. } => "environment-reading",
            ServerMessage::ApplianceState { .. } => "appliance-state",
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Pong => "pong",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::GridZone;
    use serde_json::json;

    #[test]
    fn test_client_message_deserialize_ping() {
        let json = r#"{"type": "ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_client_message_rejects_unknown() {
        let json = r#"{"type": "subscribe", "topics": []}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_serialize_occupancy() {
        let mut zones = ZoneActivation::default();
        zones.rooms.insert("living".to_string());
        zones.grid.insert(GridZone::NorthEast);

        let msg = ServerMessage::Occupancy {
            device_id: "PIR1".to_string(),
            state: true,
            zones,
            timestamp: 1700000000000,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "occupancy",
                "deviceId": "PIR1",
                "state": true,
                "zones": {"rooms": ["living"], "grid": ["north-east"]},
                "timestamp": 1700000000000i64
            })
        );
        assert_eq!(msg.kind(), "occupancy");
    }

    #[test]
    fn test_serialize_environment_reading() {
        let msg = ServerMessage::EnvironmentReading {
            device_id: "M5Stack2".to_string(),
            property: "scd40_co2".to_string(),
            value: json!(612),
            timestamp: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"environment-reading\""));
        assert_eq!(msg.kind(), "environment-reading");
        assert!(json.contains("\"deviceId\":\"M5Stack2\""));
        assert!(json.contains("\"value\":612"));
        assert_eq!(msg.device_id(), Some("M5Stack2"));
    }

    #[test]
    fn test_serialize_appliance_state() {
        let msg = ServerMessage::ApplianceState {
            device_id: "C0A8033B-013501".to_string(),
            property: "customF1".to_string(),
            value: json!({"pm25": 3}),
            timestamp: 1,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "appliance-state");
        assert_eq!(msg.kind(), "appliance-state");
        assert_eq!(value["value"]["pm25"], 3);
    }

    #[test]
    fn test_serialize_connected() {
        let msg = ServerMessage::Connected {
            connection_id: "abc-123".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connectionId\":\"abc-123\""));
        assert_eq!(msg.device_id(), None);
    }

    #[test]
    fn test_serialize_pong() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
