//! ServiceBlueprint - Config Loader output
//!
//! Describes the complete deployment: HTTP binding, accepted keys, validation
//! policy, delivery policy, warehouse location and the ordered list of sinks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete service configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Accepted API keys
    pub auth: AuthConfig,

    /// Validation policy
    #[serde(default)]
    pub validation: ValidationConfig,

    /// How sink failures are reported to clients
    #[serde(default)]
    pub delivery: DeliveryPolicy,

    /// Feedback warehouse location
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Sinks, in write order
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:2222".to_string()
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// API key settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Keys accepted in the `key` form field
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Validation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Base for URLs synthesized when the client sends none
    #[serde(default = "default_placeholder_url_base")]
    pub placeholder_url_base: String,

    /// What to do with an unusable offset
    #[serde(default)]
    pub offset_policy: OffsetPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            placeholder_url_base: default_placeholder_url_base(),
            offset_policy: OffsetPolicy::default(),
        }
    }
}

fn default_placeholder_url_base() -> String {
    "http://spotlight.dbpedia.org/id/".to_string()
}

/// Handling of non-numeric, negative or out-of-range offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetPolicy {
    /// Fail validation with `InvalidOffset`
    #[default]
    Reject,
    /// Treat as unspecified
    Unspecified,
}

/// Client-visible outcome policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    #[serde(default)]
    pub partial_failure: PartialFailurePolicy,
}

/// Response when some sinks fail while others succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Succeed with warnings as long as every record reached one sink
    #[default]
    Accept,
    /// Any sink failure fails the request
    Reject,
}

/// Feedback warehouse location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Root directory; relative sink paths resolve against it
    #[serde(default = "default_warehouse_root")]
    pub root: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            root: default_warehouse_root(),
        }
    }
}

fn default_warehouse_root() -> PathBuf {
    PathBuf::from("./feedback-warehouse")
}

impl WarehouseConfig {
    /// Resolve a sink path against the warehouse root
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Command queue capacity of the sink worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

impl SinkConfig {
    /// Non-blank parameter value
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Parse a delimiter parameter: `tab`, `comma`, or a single ASCII character
pub fn parse_delimiter(value: &str) -> Option<u8> {
    match value {
        "tab" | "\\t" | "\t" => Some(b'\t'),
        "comma" | "," => Some(b','),
        other if other.len() == 1 && other.is_ascii() => Some(other.as_bytes()[0]),
        _ => None,
    }
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log summary via tracing
    Log,
    /// Delimited text file (TSV / CSV)
    Delimited,
    /// Search index
    Index,
}

impl SinkType {
    /// Whether this sink type requires a `path` parameter
    pub fn requires_path(self) -> bool {
        matches!(self, Self::Delimited | Self::Index)
    }
}
