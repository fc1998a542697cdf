//! Client configuration.

use crate::platform;
use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Overrides `server_url` when set.
pub const SERVER_URL_ENV: &str = "KEEPER_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub database_path: PathBuf,
    pub envelope_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8743".to_string(),
            database_path: platform::default_database_path(),
            envelope_path: platform::default_envelope_path(),
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| KeeperError::InvalidInput(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path` (or the default location), falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(platform::default_config_path);

        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            debug!(path = %path.display(), "No client config, using defaults");
            Self::default()
        };

        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.server_url = url;
            }
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
