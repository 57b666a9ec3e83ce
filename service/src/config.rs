use std::{net::Ipv6Addr, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::http::RequestIdOptions;

/// Configuration for the demo service, loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with HTTPKIT_ prefix (always wins)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub request_id: RequestIdConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in seconds. Requests exceeding it are answered
    /// through the error handler.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log filter directive (debug, info, warn, error, or `target=level` lists).
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestIdConfig {
    /// Keep a client-supplied `x-request-id` header instead of generating one.
    #[serde(default = "default_true")]
    pub accept_client_id: bool,

    /// Client-supplied identifiers longer than this many bytes are truncated.
    /// 0 disables the limit.
    #[serde(default = "default_max_header_length")]
    pub max_header_length: usize,
}

impl From<&RequestIdConfig> for RequestIdOptions {
    fn from(config: &RequestIdConfig) -> Self {
        Self::new()
            .accept_client_id(config.accept_client_id)
            .max_header_length(config.max_header_length)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShutdownConfig {
    /// Upper bound on the graceful drain, in seconds.
    /// Unset waits for in-flight requests indefinitely.
    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,
}

impl ShutdownConfig {
    #[must_use]
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    8080
}

#[allow(clippy::missing_const_for_fn)]
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_header_length() -> usize {
    128
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            accept_client_id: default_true(),
            max_header_length: default_max_header_length(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("HTTPKIT_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Address string in `host:port` form. IPv6 literals are bracketed.
    #[must_use]
    pub fn bind(&self) -> String {
        let host = &self.server.host;
        if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]:{}", self.server.port)
        } else {
            format!("{host}:{}", self.server.port)
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs cannot be 0".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.level is required. Set HTTPKIT_LOGGING__LEVEL or configure in config.yaml."
                    .into(),
            ));
        }

        if let Err(err) = EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigError::Validation(format!(
                "logging.level '{}' is not a valid filter: {err}",
                self.logging.level
            )));
        }

        if self.shutdown.drain_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "shutdown.drain_timeout_secs cannot be 0; leave it unset to wait indefinitely"
                    .into(),
            ));
        }

        Ok(())
    }
}
