//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, LogConfig, DiagnosticsConfig)
//! - types/gateway.rs: Gateway address, credentials, timeouts
//! - types/cli.rs: Local binary fallback
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, DiagnosticsConfig, LogConfig, LogFormat};
pub use types::cli::CliConfig;
pub use types::gateway::{ConnectionConfig, GatewayConfig};

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, find_config_in};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
