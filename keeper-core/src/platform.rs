//! Platform-specific default locations

use std::path::PathBuf;

const APP_DIR: &str = "keeper";

/// Per-user configuration directory
///
/// Returns:
/// - Windows: %APPDATA%\keeper
/// - macOS: ~/Library/Application Support/keeper
/// - Linux/Other: ~/.config/keeper
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Per-user, per-machine data directory
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\keeper
/// - macOS: ~/Library/Application Support/keeper
/// - Linux/Other: ~/.local/share/keeper
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// The key envelope lives with the user's configuration, never in the data
/// directory that might be backed up or shared.
pub fn default_envelope_path() -> PathBuf {
    get_config_dir().join("keystore.json")
}

pub fn default_database_path() -> PathBuf {
    get_data_dir().join("vault.db")
}
