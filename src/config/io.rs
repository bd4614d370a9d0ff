//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use secrecy::SecretString;
use std::path::Path;
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.json5 / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = if path.extension().map_or(false, |ext| ext == "json" || ext == "json5") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first. Env vars have the highest precedence short of
/// command-line flags: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    // Gateway overrides
    if let Ok(url) = std::env::var("CLAWBRIDGE_GATEWAY_URL") {
        config.gateway.url = url;
    }
    if let Ok(token) = std::env::var("CLAWBRIDGE_GATEWAY_TOKEN") {
        config.gateway.token = SecretString::from(token);
    }
    if let Ok(password) = std::env::var("CLAWBRIDGE_GATEWAY_PASSWORD") {
        config.gateway.password = Some(SecretString::from(password));
    }
    if let Ok(key) = std::env::var("CLAWBRIDGE_SESSION_KEY") {
        config.gateway.session_key = key;
    }
    if let Some(timeout) = env_millis("CLAWBRIDGE_TIMEOUT_MS") {
        config.gateway.timeout = timeout;
    }
    if let Some(timeout) = env_millis("CLAWBRIDGE_CALL_TIMEOUT_MS") {
        config.gateway.call_timeout = timeout;
    }

    // CLI overrides
    if let Ok(command) = std::env::var("CLAWBRIDGE_CLI_COMMAND") {
        let command = command.trim().to_string();
        config.cli.command = if command.is_empty() { None } else { Some(command) };
    }
    if let Ok(binary) = std::env::var("CLAWBRIDGE_CLI_BIN") {
        config.cli.binary = binary;
    }
    if let Ok(dir) = std::env::var("CLAWBRIDGE_CLI_CWD") {
        config.cli.working_dir = Some(std::path::PathBuf::from(dir));
    }
    if let Some(timeout) = env_millis("CLAWBRIDGE_CLI_TIMEOUT_MS") {
        config.cli.timeout = timeout;
    }
    if let Ok(v) = std::env::var("CLAWBRIDGE_CLI_ENABLED") {
        config.cli.enabled = v != "false" && v != "0";
    }

    // Logging overrides
    if let Ok(level) = std::env::var("RUST_LOG") {
        config.log.level = level;
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        if let Ok(format) = format.parse() {
            config.log.format = format;
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.gateway.url = "https://gw.example.com".to_string();
        config.gateway.token = SecretString::from("never-written".to_string());
        save_config(&config, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("never-written"));

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.gateway.url, "https://gw.example.com");
        assert_eq!(loaded.gateway.timeout, config.gateway.timeout);
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[gateway]\nurl = \"wss://gw\"\ncall_timeout = \"2s\"\n\n[cli]\nenabled = false\n",
        )
        .unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.gateway.url, "wss://gw");
        assert_eq!(loaded.gateway.call_timeout, Duration::from_secs(2));
        assert!(!loaded.cli.enabled);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ gateway: ").unwrap();
        assert!(matches!(load_config_from_path(&path), Err(Error::Config(_))));
    }
}
