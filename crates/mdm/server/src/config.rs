//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdm_push::ConnectionSettings;
use mdm_service::CheckinConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub checkin: CheckinConfig,
    pub identity: IdentityConfig,
    pub push: PushConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Program that verifies `Mdm-Signature` and prints the signer certificate.
    #[serde(default = "default_verifier")]
    pub verifier: PathBuf,
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,
    /// PEM CA that must have issued device identities.
    #[serde(default)]
    pub ca_certificate: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_database_url() -> String {
    "mdm.db".to_string()
}

fn default_verifier() -> PathBuf {
    PathBuf::from("mdm-verify")
}

fn default_verify_timeout() -> u64 {
    3
}

fn default_keepalive() -> u64 {
    60 * 60
}

fn default_retry_backoff() -> u64 {
    2
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            verifier: default_verifier(),
            verify_timeout_secs: default_verify_timeout(),
            ca_certificate: None,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            keepalive_secs: default_keepalive(),
            retry_backoff_secs: default_retry_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl PushConfig {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            keepalive: Duration::from_secs(self.keepalive_secs),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl Config {
    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
