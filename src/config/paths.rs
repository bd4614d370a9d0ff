//! Configuration paths
//!
//! `CLAWBRIDGE_CONFIG` names the file outright; otherwise the file lives in
//! `CLAWBRIDGE_CONFIG_DIR` or the platform config directory.

use std::path::{Path, PathBuf};

/// File names searched in the config directory, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["config.json", "config.json5", "config.toml"];

/// Directory holding the configuration file
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CLAWBRIDGE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|d| d.join("clawbridge"))
        .unwrap_or_else(|| PathBuf::from(".clawbridge"))
}

/// Configuration file to load or save
pub fn config_path() -> PathBuf {
    match std::env::var("CLAWBRIDGE_CONFIG") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => find_config_in(&config_dir()),
    }
}

/// First existing config file in `dir`, or `dir/config.json` when none exists
pub fn find_config_in(dir: &Path) -> PathBuf {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .unwrap_or_else(|| dir.join(CONFIG_FILE_NAMES[0]))
}
