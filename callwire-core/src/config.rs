//! # Server Configuration
//!
//! JSON configuration of the `callwire` server. Every field is optional in the file and falls
//! back to its default, so an empty object (`{}`) is a valid configuration.
use crate::services::greet::GreetSettings;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Invalid config file '{0}': {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub tls: Option<TlsConfig>,
    /// Registers the gRPC reflection service.
    pub reflection: bool,
    pub list_pacing_ms: u64,
    pub greet_pacing_ms: u64,
    pub greet_repeat: u32,
    pub deadline_work_steps: u32,
    pub deadline_step_ms: u64,
}

/// PEM files of the server identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            tls: None,
            reflection: true,
            list_pacing_ms: 500,
            greet_pacing_ms: 1000,
            greet_repeat: 10,
            deadline_work_steps: 3,
            deadline_step_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_json(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn list_pacing(&self) -> Duration {
        Duration::from_millis(self.list_pacing_ms)
    }

    pub fn greet_settings(&self) -> GreetSettings {
        GreetSettings {
            repeat: self.greet_repeat,
            pacing: Duration::from_millis(self.greet_pacing_ms),
            deadline_steps: self.deadline_work_steps,
            deadline_step: Duration::from_millis(self.deadline_step_ms),
        }
    }
}
