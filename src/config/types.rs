// Configuration types module
// Defines all configuration-related data structures

use crate::delivery::ThrottleConfig;
use crate::http::disposition::DispositionKind;
use crate::logger::LogLevel;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `error`, `warn` or `info`
    pub level: LogLevel,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Seconds allowed for the client to send request headers
    pub header_read_timeout: u64,
    pub max_connections: Option<u64>,
}

/// How files are handed to clients
#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Bytes read from the source per chunk
    pub buffer_size: usize,
    /// Per-download bandwidth ceiling, 0 means unlimited
    pub max_bytes_per_second: u64,
    /// Send `Cache-Control: public`
    pub public: bool,
    /// Send the source validator as `ETag`
    pub auto_etag: bool,
    /// Send the source modification time as `Last-Modified`
    pub auto_last_modified: bool,
    /// `inline` or `attachment`; no `Content-Disposition` when unset
    #[serde(default)]
    pub disposition: Option<DispositionKind>,
}

impl DeliveryConfig {
    pub const fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig::new(self.buffer_size, self.max_bytes_per_second)
    }
}

/// Routes configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RoutesConfig {
    /// Path (exact, or prefix for directories) to handler
    #[serde(default)]
    pub custom_routes: HashMap<String, RouteHandler>,
}

/// Route handler types
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteHandler {
    /// Serve files below a directory
    Dir { path: String },
    /// Serve one specific file
    File { path: String },
}

impl fmt::Display for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir { path } => write!(f, "dir {path}"),
            Self::File { path } => write!(f, "file {path}"),
        }
    }
}
