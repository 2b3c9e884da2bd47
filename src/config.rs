// Server Configuration Module
// YAML configuration for the `openai-api-mock serve` binary.

use crate::latency::DEFAULT_CHUNK_INTERVAL_MS;
use crate::session::{MockOptions, Seed};
use crate::router::DEFAULT_ORIGIN;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mock: MockConfig,
    /// Origin that unmatched requests are forwarded to
    #[serde(default)]
    pub passthrough_upstream: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.mock.error_rate) {
            return Err(ConfigError::Validation(format!(
                "mock.error_rate must be between 0 and 1, got {}",
                self.mock.error_rate
            )));
        }
        self.socket_addr().map(|_| ())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigError::Validation(format!(
                    "invalid listen address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    /// Session options for the served mock
    pub fn mock_options(&self) -> MockOptions {
        MockOptions {
            include_errors: self.mock.include_errors,
            error_rate: self.mock.error_rate,
            latency_ms: self.mock.latency_ms,
            stream_interval_ms: self.mock.stream_interval_ms,
            log_requests: self.mock.log_requests,
            seed: self.mock.seed.clone(),
            use_fixed_responses: self.mock.use_fixed_responses,
            origin: DEFAULT_ORIGIN.to_string(),
            passthrough_upstream: self.passthrough_upstream.clone(),
        }
    }
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Mock behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub include_errors: bool,
    /// Probability of an injected error (0.0-1.0)
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default = "default_stream_interval")]
    pub stream_interval_ms: u64,
    #[serde(default)]
    pub log_requests: bool,
    #[serde(default)]
    pub seed: Option<Seed>,
    #[serde(default)]
    pub use_fixed_responses: bool,
}

fn default_error_rate() -> f64 {
    crate::errors::DEFAULT_ERROR_RATE
}

fn default_stream_interval() -> u64 {
    DEFAULT_CHUNK_INTERVAL_MS
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            include_errors: false,
            error_rate: default_error_rate(),
            latency_ms: 0,
            stream_interval_ms: default_stream_interval(),
            log_requests: false,
            seed: None,
            use_fixed_responses: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}
