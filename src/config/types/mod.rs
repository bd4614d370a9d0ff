//! Configuration types module
//!
//! - gateway.rs: gateway address, credentials and timeouts
//! - cli.rs: local binary fallback

pub mod cli;
pub mod gateway;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway connection settings
    #[serde(default)]
    pub gateway: gateway::GatewayConfig,

    /// CLI fallback settings
    #[serde(default)]
    pub cli: cli::CliConfig,

    /// Diagnostic runner settings
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from defaults, config file and environment
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Diagnostic runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Hard upper bound for a full diagnostic run
    #[serde(with = "humantime_serde", default = "default_diagnostics_timeout")]
    pub timeout: Duration,
    /// Longest received-frame excerpt kept in a trace line
    #[serde(default = "default_excerpt")]
    pub max_excerpt_chars: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            timeout: default_diagnostics_timeout(),
            max_excerpt_chars: default_excerpt(),
        }
    }
}

fn default_diagnostics_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_excerpt() -> usize {
    400
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info,clawbridge=info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid log format: {}. Valid options: pretty, json",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.gateway.url, "http://127.0.0.1:18789");
        assert_eq!(config.gateway.session_key, "main");
        assert_eq!(config.cli.binary, "openclaw");
        assert_eq!(config.diagnostics.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_partial_json5_config() {
        let config: Config = json5::from_str(
            r#"{ gateway: { url: "ws://10.0.0.5:18789", timeout: "3s" }, cli: { binary: "gw" } }"#,
        )
        .unwrap();
        assert_eq!(config.gateway.url, "ws://10.0.0.5:18789");
        assert_eq!(config.gateway.timeout, Duration::from_secs(3));
        assert_eq!(config.gateway.call_timeout, Duration::from_secs(8));
        assert_eq!(config.cli.binary, "gw");
        assert!(config.cli.enabled);
    }
}
