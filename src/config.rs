//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides. Every
//! section has defaults, so an empty file (or no file at all) describes the
//! reference deployment.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::telemetry::{
    default_occupancy_properties, default_rules, AggregationConfig, ClassificationRule,
    DeviceClassifier, GridLayout, RoomDefinition, TopicClassifier, TopicLayout, ZoneEngine,
};
use crate::transport::TransportConfig;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub zones: ZonesConfig,

    #[serde(default)]
    pub aggregation: AggregationSettings,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Broker connection and topic layout
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_topic_root")]
    pub topic_root: String,

    #[serde(default = "default_properties_keyword")]
    pub properties_keyword: String,

    /// Topic filters; empty means `<topic_root>/#`
    #[serde(default)]
    pub subscriptions: Vec<String>,

    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sensorcast".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_topic_root() -> String {
    "/server".to_string()
}

fn default_properties_keyword() -> String {
    "properties".to_string()
}

fn default_queue_size() -> usize {
    1024
}

fn default_reconnect_initial() -> u64 {
    500
}

fn default_reconnect_max() -> u64 {
    30_000
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            topic_root: default_topic_root(),
            properties_keyword: default_properties_keyword(),
            subscriptions: Vec::new(),
            queue_size: default_queue_size(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_ms: default_reconnect_max(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ApiConfig {
    /// `host:port` for binding the listener
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which devices are processed and how they are categorized
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_allow_list")]
    pub allow: Vec<String>,

    #[serde(default = "default_rules")]
    pub rules: Vec<ClassificationRule>,

    #[serde(default = "default_occupancy_properties")]
    pub occupancy_properties: Vec<String>,
}

/// Devices of the reference deployment
fn default_allow_list() -> Vec<String> {
    let pirs = [
        1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 13, 15, 17, 18, 19, 20, 21, 22, 24,
    ]
    .into_iter()
    .map(|n| format!("PIR{}", n));
    let m5stacks = [1, 2, 3, 4, 5, 6, 8, 10]
        .into_iter()
        .map(|n| format!("M5Stack{}", n));
    let appliances = [
        // Air purifiers
        "C0A8033B-013501",
        "C0A8033E-013501",
        "C0A80341-013501",
        "C0A8033D-013501",
        "C0A8033C-013501",
        "C0A80342-013501",
        "C0A80343-013501",
        "C0A80344-013501",
        // Air conditioners
        "C0A80367-013001",
        "C0A80368-013001",
    ]
    .into_iter()
    .map(String::from);

    pirs.chain(m5stacks).chain(appliances).collect()
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            allow: default_allow_list(),
            rules: default_rules(),
            occupancy_properties: default_occupancy_properties(),
        }
    }
}

/// Room and grid definitions
#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    #[serde(default = "default_rooms")]
    pub rooms: Vec<RoomDefinition>,

    /// Corner layout; omitted means the reference living-room grid
    #[serde(default = "default_grid")]
    pub grid: Option<GridLayout>,

    /// `false` turns grid inference off
    #[serde(default = "default_grid_enabled")]
    pub grid_enabled: bool,
}

fn default_rooms() -> Vec<RoomDefinition> {
    vec![RoomDefinition {
        name: "living".to_string(),
        sensors: ["PIR1", "PIR2", "PIR3", "PIR4"]
            .into_iter()
            .map(String::from)
            .collect(),
        env_sensor: Some("M5Stack2".to_string()),
    }]
}

fn default_grid() -> Option<GridLayout> {
    Some(GridLayout {
        room: "living".to_string(),
        north_east: "PIR1".to_string(),
        north_west: "PIR2".to_string(),
        south_east: "PIR3".to_string(),
        south_west: "PIR4".to_string(),
    })
}

fn default_grid_enabled() -> bool {
    true
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            rooms: default_rooms(),
            grid: default_grid(),
            grid_enabled: default_grid_enabled(),
        }
    }
}

impl ZonesConfig {
    /// Grid used for inference, if any
    pub fn active_grid(&self) -> Option<&GridLayout> {
        self.grid.as_ref().filter(|_| self.grid_enabled)
    }
}

/// Aggregation period and series length
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationSettings {
    #[serde(default = "default_period")]
    pub period_secs: u64,

    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_period() -> u64 {
    60
}

fn default_capacity() -> usize {
    720
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            capacity: default_capacity(),
        }
    }
}

/// Viewer connection limits
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    1000
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Analytics sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_sink_url")]
    pub url: String,

    #[serde(default = "default_sink_index")]
    pub index: String,

    /// Also index devices no classification rule matches
    #[serde(default)]
    pub persist_unknown: bool,

    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_sink_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_sink_index() -> String {
    "smart-home-events".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_sink_url(),
            index: default_sink_index(),
            persist_unknown: false,
            queue_size: default_queue_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// Falls back to the built-in defaults only when no candidate file
    /// exists. A file that exists but cannot be read, parsed or validated is
    /// an error.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("sensorcast").join("config.toml")),
            Some(PathBuf::from("/etc/sensorcast/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file of `paths`, or the defaults if none exists
    pub fn load_first(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::from_env()),
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // MQTT overrides
        if let Ok(host) = std::env::var("SENSORCAST_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("SENSORCAST_MQTT_PORT") {
            if let Ok(p) = port.parse() {
                self.mqtt.port = p;
            }
        }

        // API overrides
        if let Ok(host) = std::env::var("SENSORCAST_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("SENSORCAST_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Sink overrides
        if let Ok(url) = std::env::var("SENSORCAST_SINK_URL") {
            self.sink.url = url;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("SENSORCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SENSORCAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation.capacity == 0 {
            return Err(ConfigError::Invalid(
                "aggregation.capacity must be greater than 0".to_string(),
            ));
        }
        if self.aggregation.period_secs == 0 {
            return Err(ConfigError::Invalid(
                "aggregation.period_secs must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.queue_size == 0 || self.sink.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "queue sizes must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.reconnect_initial_ms > self.mqtt.reconnect_max_ms {
            return Err(ConfigError::Invalid(
                "mqtt.reconnect_initial_ms exceeds mqtt.reconnect_max_ms".to_string(),
            ));
        }
        if let Some(grid) = self.zones.active_grid() {
            let distinct: HashSet<&str> = grid.sensors().into_iter().collect();
            if distinct.len() != 4 {
                return Err(ConfigError::Invalid(
                    "zones.grid corners must name four distinct sensors".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn topic_layout(&self) -> TopicLayout {
        TopicLayout::new(&self.mqtt.topic_root, self.mqtt.properties_keyword.as_str())
    }

    pub fn topic_classifier(&self) -> TopicClassifier {
        TopicClassifier::new(
            self.topic_layout(),
            DeviceClassifier::new(self.devices.rules.clone()),
            self.devices.allow.iter().cloned(),
        )
    }

    pub fn zone_engine(&self) -> ZoneEngine {
        ZoneEngine::new(self.zones.rooms.clone(), self.zones.active_grid().cloned())
    }

    pub fn aggregation_config(&self) -> AggregationConfig {
        AggregationConfig {
            period: Duration::from_secs(self.aggregation.period_secs),
            capacity: self.aggregation.capacity,
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.hub.max_connections,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        let subscriptions = if self.mqtt.subscriptions.is_empty() {
            vec![self.topic_layout().catch_all()]
        } else {
            self.mqtt.subscriptions.clone()
        };

        TransportConfig {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            client_id: self.mqtt.client_id.clone(),
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            subscriptions,
            reconnect_initial: Duration::from_millis(self.mqtt.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.mqtt.reconnect_max_ms),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Sensorcast Configuration
#
# Environment variables override these settings:
# - SENSORCAST_MQTT_HOST
# - SENSORCAST_MQTT_PORT
# - SENSORCAST_API_HOST
# - SENSORCAST_API_PORT
# - SENSORCAST_SINK_URL
# - SENSORCAST_LOG_LEVEL
# - SENSORCAST_LOG_FORMAT

[mqtt]
host = "localhost"
port = 1883
client_id = "sensorcast"
keep_alive_secs = 30

# Topics look like <topic_root>/<tenant>/<deviceId>/<properties_keyword>/<property>
topic_root = "/server"
properties_keyword = "properties"

# Topic filters; empty subscribes to <topic_root>/#
subscriptions = []

# Messages buffered between the broker and the pipeline
queue_size = 1024

# Reconnect backoff (doubles from initial up to max)
reconnect_initial_ms = 500
reconnect_max_ms = 30000

[api]
# HTTP and WebSocket listener
host = "0.0.0.0"
port = 3001

[devices]
# Devices that are processed; everything else is dropped.
# Omit to use the built-in reference list.
# allow = ["PIR1", "PIR2", "M5Stack2", "C0A8033B-013501"]

# Properties an occupancy sensor reports its state under
occupancy_properties = ["motion", "motion_raw"]

# Classification rules, first match wins.
# Omit to use the built-in rules (PIR, M5Stack, 013501, 013001).
# [[devices.rules]]
# pattern = { prefix = "PIR" }
# category = "occupancy-sensor"
# family = "pir"

[zones]
# Set to false for deployments without a tracked grid room
grid_enabled = true

[[zones.rooms]]
name = "living"
sensors = ["PIR1", "PIR2", "PIR3", "PIR4"]
envSensor = "M5Stack2"

[zones.grid]
room = "living"
north_east = "PIR1"
north_west = "PIR2"
south_east = "PIR3"
south_west = "PIR4"

[aggregation]
# Averaging period (seconds)
period_secs = 60

# Points kept per series (720 = 12 hours at one per minute)
capacity = 720

[hub]
# Maximum concurrent WebSocket viewers
max_connections = 1000

[sink]
# Index every raw message into Elasticsearch
enabled = false
url = "http://localhost:9200"
index = "smart-home-events"
persist_unknown = false
queue_size = 1024

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_describe_reference_deployment() {
        let config = Config::default();

        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.queue_size, 1024);
        assert_eq!(config.api.addr(), "0.0.0.0:3001");
        assert_eq!(config.aggregation.period_secs, 60);
        assert_eq!(config.aggregation.capacity, 720);
        assert_eq!(config.hub.max_connections, 1000);
        assert!(!config.sink.enabled);

        let allow = &config.devices.allow;
        assert_eq!(allow.iter().filter(|d| d.starts_with("PIR")).count(), 19);
        assert_eq!(allow.iter().filter(|d| d.starts_with("M5Stack")).count(), 8);
        assert_eq!(allow.iter().filter(|d| d.ends_with("-013501")).count(), 8);
        assert_eq!(allow.iter().filter(|d| d.ends_with("-013001")).count(), 2);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_text_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();

        assert_eq!(config.mqtt.topic_root, "/server");
        assert_eq!(config.zones.rooms.len(), 1);
        assert_eq!(config.zones.rooms[0].env_sensor.as_deref(), Some("M5Stack2"));
        assert_eq!(config.zones.grid.as_ref().unwrap().north_east, "PIR1");
        assert_eq!(config.devices.rules.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
[mqtt]
host = "broker.local"

[devices]
allow = ["PIR1", "M5Stack2"]

[aggregation]
capacity = 10
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.devices.allow, vec!["PIR1", "M5Stack2"]);
        assert_eq!(config.aggregation.capacity, 10);
        assert_eq!(config.aggregation.period_secs, 60);

        let classifier = config.topic_classifier();
        assert!(classifier.is_allowed("PIR1"));
        assert!(!classifier.is_allowed("PIR2"));
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let file = write_config("[aggregation]\ncapacity = 0\n");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_duplicate_grid_sensor() {
        let file = write_config(
            r#"
[zones.grid]
room = "living"
north_east = "PIR1"
north_west = "PIR1"
south_east = "PIR3"
south_west = "PIR4"
"#,
        );
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_parse_error() {
        let file = write_config("[mqtt\nhost = ");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/sensorcast.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_first_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mqtt]\nhost = \"broker.lan\"\n\n[aggregation]\ncapacity = 0\n")
            .unwrap();

        let result = Config::load_first(&[dir.path().join("missing.toml"), path]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_first_rejects_unparsable_file() {
        let file = write_config("[mqtt\nhost = ");
        let result = Config::load_first(&[file.path().to_path_buf()]);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_first_uses_first_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, "[api]\nport = 4001\n").unwrap();
        std::fs::write(&second, "[api]\nport = 5001\n").unwrap();

        let config = Config::load_first(&[dir.path().join("missing.toml"), first, second]).unwrap();
        assert_eq!(config.api.port, 4001);
    }

    #[test]
    fn test_load_first_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_first(&[dir.path().join("missing.toml")]).unwrap();

        assert_eq!(config.aggregation.capacity, 720);
        assert!(config.zones.active_grid().is_some());
    }

    #[test]
    fn test_grid_can_be_disabled() {
        let file = write_config("[zones]\ngrid_enabled = false\n");

        let config = Config::load(file.path()).unwrap();
        assert!(config.zones.grid.is_some());
        assert!(config.zones.active_grid().is_none());
        assert!(config.zone_engine().grid().is_none());
        assert_eq!(config.zones.rooms.len(), 1);
    }

    #[test]
    fn test_disabled_grid_skips_corner_validation() {
        let file = write_config(
            r#"
[zones]
grid_enabled = false

[zones.grid]
room = "living"
north_east = "PIR1"
north_west = "PIR1"
south_east = "PIR3"
south_west = "PIR4"
"#,
        );
        assert!(Config::load(file.path()).is_ok());
    }

    #[test]
    fn test_transport_config_defaults_to_catch_all() {
        let config = Config::default();
        let transport = config.transport_config();

        assert_eq!(transport.subscriptions, vec!["/server/#"]);
        assert_eq!(transport.reconnect_initial, Duration::from_millis(500));
        assert_eq!(transport.reconnect_max, Duration::from_secs(30));
    }

    #[test]
    fn test_custom_rules_from_toml() {
        let file = write_config(
            r#"
[devices]
allow = ["Lepton1"]

[[devices.rules]]
pattern = { prefix = "Lepton" }
category = "environment-sensor"
family = "thermal"
"#,
        );

        let config = Config::load(file.path()).unwrap();
        let device = config.topic_classifier().device("Lepton1");
        assert_eq!(device.family, "thermal");
    }
}
