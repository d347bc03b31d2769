//! Topic Classifier
//!
//! Turns `<root>/<tenant>/<deviceId>/<keyword>/<propertyName>` topics into a
//! classified `(device, property, payload)` triple, or a `RejectReason`.
//!
//! Classification is a pure function of the topic string and the static
//! configuration, so re-parsing a topic always yields the same result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::error::RejectReason;
use super::types::{Device, DeviceCategory, PropertyMap, PropertyValue, RawMessage};

/// Expected shape of an ingress topic
#[derive(Debug, Clone)]
pub struct TopicLayout {
    root_segments: Vec<String>,
    keyword: String,
}

/// The addressed parts of a parsed topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicParts<'a> {
    pub tenant: &'a str,
    pub device_id: &'a str,
    pub property: &'a str,
}

impl TopicLayout {
    /// Create a layout from a root (e.g. `/server`) and the properties keyword
    pub fn new(root: &str, keyword: impl Into<String>) -> Self {
        Self {
            root_segments: root.split('/').map(str::to_string).collect(),
            keyword: keyword.into(),
        }
    }

    /// Split a topic into its addressed parts
    ///
    /// Segments beyond the property name are ignored.
    pub fn parse<'a>(&self, topic: &'a str) -> Result<TopicParts<'a>, RejectReason> {
        let segments: Vec<&str> = topic.split('/').collect();
        let root_len = self.root_segments.len();

        if segments.len() < root_len + 4 {
            return Err(RejectReason::MalformedTopic(topic.to_string()));
        }

        if segments[..root_len]
            .iter()
            .zip(&self.root_segments)
            .any(|(seg, expected)| seg != expected)
        {
            return Err(RejectReason::UnexpectedRoot(topic.to_string()));
        }

        let tenant = segments[root_len];
        let device_id = segments[root_len + 1];
        let keyword = segments[root_len + 2];
        let property = segments[root_len + 3];

        if keyword != self.keyword {
            return Err(RejectReason::UnexpectedKeyword(keyword.to_string()));
        }

        if device_id.is_empty() || property.is_empty() {
            return Err(RejectReason::MalformedTopic(topic.to_string()));
        }

        Ok(TopicParts {
            tenant,
            device_id,
            property,
        })
    }

    /// Catch-all subscription filter for this layout (e.g. `/server/#`)
    pub fn catch_all(&self) -> String {
        let mut filter = self.root_segments.join("/");
        filter.push_str("/#");
        filter
    }
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::new("/server", "properties")
    }
}

/// How a rule matches a device id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DevicePattern {
    /// Id starts with the string (sensor families)
    Prefix(String),
    /// Id contains the string anywhere (appliance class codes)
    Contains(String),
}

impl DevicePattern {
    pub fn matches(&self, device_id: &str) -> bool {
        match self {
            DevicePattern::Prefix(p) => device_id.starts_with(p.as_str()),
            DevicePattern::Contains(c) => device_id.contains(c.as_str()),
        }
    }
}

/// One entry of the ordered classification rule list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationRule {
    pub pattern: DevicePattern,
    pub category: DeviceCategory,
    pub family: String,
}

impl ClassificationRule {
    pub fn prefix(prefix: &str, category: DeviceCategory, family: &str) -> Self {
        Self {
            pattern: DevicePattern::Prefix(prefix.to_string()),
            category,
            family: family.to_string(),
        }
    }

    pub fn contains(code: &str, category: DeviceCategory, family: &str) -> Self {
        Self {
            pattern: DevicePattern::Contains(code.to_string()),
            category,
            family: family.to_string(),
        }
    }
}

/// Family label given to devices no rule matches
pub const UNKNOWN_FAMILY: &str = "other";

/// Rules for the reference deployment, in evaluation order
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::prefix("PIR", DeviceCategory::OccupancySensor, "pir"),
        ClassificationRule::prefix("M5Stack", DeviceCategory::EnvironmentSensor, "m5stack"),
        // ECHONET Lite class codes embedded in the id
        ClassificationRule::contains("013501", DeviceCategory::Appliance, "air_purifier"),
        ClassificationRule::contains("013001", DeviceCategory::Appliance, "aircon"),
    ]
}

/// Order-sensitive device categorizer; the first matching rule wins
#[derive(Debug, Clone)]
pub struct DeviceClassifier {
    rules: Vec<ClassificationRule>,
}

impl DeviceClassifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Derive a device's identity from its id
    pub fn classify(&self, device_id: &str) -> Device {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(device_id))
            .map(|rule| Device::new(device_id, rule.category, rule.family.as_str()))
            .unwrap_or_else(|| Device::new(device_id, DeviceCategory::Unknown, UNKNOWN_FAMILY))
    }
}

impl Default for DeviceClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// A message that passed topic, allow-list and payload checks
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedMessage {
    pub device: Device,
    pub property: String,
    pub payload: PropertyMap,
    pub received_at: i64,
}

impl ClassifiedMessage {
    /// The field named by the topic's property segment, if the payload has it
    pub fn property_value(&self) -> Option<PropertyValue> {
        self.payload.get(&self.property).map(|value| PropertyValue {
            device_id: self.device.id.clone(),
            property_name: self.property.clone(),
            value: value.clone(),
            received_at: self.received_at,
        })
    }
}

/// Decode a payload as a JSON object
pub fn decode_payload(payload: &[u8]) -> Result<PropertyMap, RejectReason> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RejectReason::UndecodablePayload(format!(
            "expected JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(RejectReason::UndecodablePayload(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Topic parsing, allow-list filtering and device classification in one place
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    layout: TopicLayout,
    devices: DeviceClassifier,
    allow_list: HashSet<String>,
}

impl TopicClassifier {
    pub fn new(
        layout: TopicLayout,
        devices: DeviceClassifier,
        allow_list: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            layout,
            devices,
            allow_list: allow_list.into_iter().collect(),
        }
    }

    pub fn layout(&self) -> &TopicLayout {
        &self.layout
    }

    pub fn is_allowed(&self, device_id: &str) -> bool {
        self.allow_list.contains(device_id)
    }

    /// Classify a device id without a message (used by queries)
    pub fn device(&self, device_id: &str) -> Device {
        self.devices.classify(device_id)
    }

    /// Resolve `(device, property)` from a topic alone
    pub fn classify_topic(&self, topic: &str) -> Result<(Device, String), RejectReason> {
        let parts = self.layout.parse(topic)?;

        if !self.is_allowed(parts.device_id) {
            return Err(RejectReason::NotAllowed(parts.device_id.to_string()));
        }

        Ok((
            self.devices.classify(parts.device_id),
            parts.property.to_string(),
        ))
    }

    /// Run every check on a raw message
    ///
    /// Unknown-category devices are rejected here even when allow-listed.
    pub fn classify(&self, msg: &RawMessage) -> Result<ClassifiedMessage, RejectReason> {
        let (device, property) = self.classify_topic(&msg.topic)?;

        if device.category == DeviceCategory::Unknown {
            return Err(RejectReason::UnknownCategory(device.id));
        }

        let payload = decode_payload(&msg.payload)?;

        Ok(ClassifiedMessage {
            device,
            property,
            payload,
            received_at: msg.received_at,
        })
    }
}
