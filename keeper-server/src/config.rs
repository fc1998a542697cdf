//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    /// Upper bound for any request body, in bytes.
    pub max_payload_size: usize,
    /// HS256 signing secret. A random one is generated per process when unset,
    /// which invalidates all tokens on restart.
    pub jwt_secret: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_hours: i64,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("keeper-server.db"),
            max_payload_size: 16 * 1024 * 1024,
            jwt_secret: None,
            jwt_issuer: "keeper-server".to_string(),
            jwt_audience: "keeper".to_string(),
            access_token_minutes: 15,
            refresh_token_hours: 720,
            cleanup_interval_secs: 3600,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ServerConfig =
            toml::from_str("listen_addr = \"0.0.0.0:9000\"\naccess_token_minutes = 5\n").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.access_token_minutes, 5);
        assert_eq!(config.refresh_token_hours, 720);
        assert!(config.jwt_secret.is_none());
    }
}
