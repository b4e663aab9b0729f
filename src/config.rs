//! Server configuration.
//!
//! Loaded from YAML (`WARDEN_CONFIG`, default `warden.yaml`) with built-in
//! defaults for every field. The `LISTEN` environment variable overrides the
//! bind address.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "warden.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub resources: ResourceConfig,
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address and port, e.g. `127.0.0.1:8080`.
    pub listen_addr: String,
    pub backlog: u32,
    /// Worker capacity. Connections beyond it are shed with a 503.
    pub max_connections: usize,
    pub keep_alive_timeout_secs: u64,
    pub keep_alive_max_requests: u32,
    pub buffer_size: usize,
    pub max_request_bytes: usize,
    pub shutdown_grace_ms: u64,
    pub server_name: String,
    /// Include diagnostic text in error pages.
    pub expose_error_details: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub forbidden: Vec<String>,
    /// Idle time after which a cached file handle is dropped. 0 disables.
    pub idle_ttl_secs: u64,
    /// Largest body served from a file. 0 means unlimited.
    pub content_length_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub uri: String,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            resources: ResourceConfig::default(),
            mounts: vec![MountConfig {
                uri: "/".to_string(),
                path: PathBuf::from("."),
            }],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            backlog: 1024,
            max_connections: 512,
            keep_alive_timeout_secs: 60,
            keep_alive_max_requests: 1000,
            buffer_size: 4096,
            max_request_bytes: 64 * 1024,
            shutdown_grace_ms: 500,
            server_name: "warden".to_string(),
            expose_error_details: true,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            forbidden: crate::resource::DEFAULT_FORBIDDEN
                .iter()
                .map(|s| s.to_string())
                .collect(),
            idle_ttl_secs: 0,
            content_length_limit: 0,
        }
    }
}

impl ServerConfig {
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Config {
    /// Loads the configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("WARDEN_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}
