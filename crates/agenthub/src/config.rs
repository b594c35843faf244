//! Application configuration sections.
//!
//! Loaded by the binary from defaults, the TOML config file and `AGENTHUB__*`
//! environment variables, in that order.

use serde::{Deserialize, Serialize};

use crate::hub::HubConfig;
use crate::scripts::ScriptConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub scripts: ScriptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix of the agent and host-spec endpoints.
    pub base_path: String,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// `base_path` with a leading slash and no trailing slash; empty for root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            base_path: "/medfl".to_string(),
            cors_origins: Vec::new(),
        }
    }
}
