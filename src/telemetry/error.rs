//! Reasons a message leaves the pipeline without producing an event
//!
//! None of these are failures of the process. The ingestion loop logs them at
//! trace level and moves on to the next message.

use thiserror::Error;

/// Why a message was discarded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Topic has too few segments or an empty device/property segment
    #[error("Malformed topic: {0}")]
    MalformedTopic(String),

    /// Topic does not start with the configured root
    #[error("Unexpected topic root in {0}")]
    UnexpectedRoot(String),

    /// Segment where the properties keyword should be holds something else
    #[error("Unexpected keyword segment: {0}")]
    UnexpectedKeyword(String),

    /// Device id is not on the allow-list
    #[error("Device not allowed: {0}")]
    NotAllowed(String),

    /// Payload is not a JSON object
    #[error("Undecodable payload: {0}")]
    UndecodablePayload(String),

    /// Device is allowed but no classification rule matched
    #[error("Unknown device category: {0}")]
    UnknownCategory(String),

    /// Property is not one the device's category handles
    #[error("Ignored property {property} on {device_id}")]
    IgnoredProperty { device_id: String, property: String },

    /// Payload has no usable value for the property
    #[error("No value for {property} on {device_id}")]
    MissingValue { device_id: String, property: String },
}

impl RejectReason {
    /// Short machine-readable label, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::MalformedTopic(_) => "malformed_topic",
            RejectReason::UnexpectedRoot(_) => "unexpected_root",
            RejectReason::UnexpectedKeyword(_) => "unexpected_keyword",
            RejectReason::NotAllowed(_) => "not_allowed",
            RejectReason::UndecodablePayload(_) => "undecodable_payload",
            RejectReason::UnknownCategory(_) => "unknown_category",
            RejectReason::IgnoredProperty { .. } => "ignored_property",
            RejectReason::MissingValue { .. } => "missing_value",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_display() {
        let reason = RejectReason::NotAllowed("PIR99".to_string());
        assert_eq!(reason.to_string(), "Device not allowed: PIR99");

        let reason = RejectReason::IgnoredProperty {
            device_id: "PIR1".to_string(),
            property: "battery".to_string(),
        };
        assert_eq!(reason.to_string(), "Ignored property battery on PIR1");
        assert_eq!(reason.kind(), "ignored_property");
    }
}
