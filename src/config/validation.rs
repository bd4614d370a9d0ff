//! Configuration validation
//!
//! Validates configuration and reports issues.

use secrecy::ExposeSecret;
use url::Url;

use super::types::Config;
use crate::normalize::normalize_http_url;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_gateway_config(config, result);
    result = validate_cli_config(config, result);

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let base = normalize_http_url(&config.gateway.url);
    match Url::parse(&base) {
        Ok(url) if url.host_str().is_some() => {}
        _ => {
            result = result.with_error(
                ValidationIssue::new("gateway.url", format!("Not a usable gateway address: {:?}", config.gateway.url))
                    .with_suggestion("Use a form like http://127.0.0.1:18789 or wss://gateway.example.com"),
            );
        }
    }

    if config.gateway.token.expose_secret().trim().is_empty() {
        result = result.with_warning(
            ValidationIssue::new("gateway.token", "No gateway token configured; authenticated calls will fail")
                .with_suggestion("Set CLAWBRIDGE_GATEWAY_TOKEN or pass --token"),
        );
    }

    if config.gateway.timeout.is_zero() || config.gateway.call_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "gateway.timeout",
            "Timeouts must be greater than zero",
        ));
    }

    if config.gateway.call_timeout > config.gateway.timeout {
        result = result.with_warning(ValidationIssue::new(
            "gateway.call_timeout",
            "Per-call timeout exceeds the connection timeout",
        ));
    }

    result
}

fn validate_cli_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if !config.cli.enabled {
        return result;
    }

    let has_command = config.cli.command.as_deref().map_or(false, |c| !c.trim().is_empty());
    if !has_command && config.cli.binary.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("cli.binary", "CLI fallback enabled but no binary or command configured")
                .with_suggestion("Set cli.binary, cli.command, or disable the CLI fallback"),
        );
    }

    if let Some(ref dir) = config.cli.working_dir {
        if !dir.exists() {
            result = result.with_warning(ValidationIssue::new(
                "cli.working_dir",
                format!("CLI working directory does not exist: {}", dir.display()),
            ));
        }
    }

    if config.cli.timeout.is_zero() || config.cli.max_output_bytes == 0 {
        result = result.with_error(ValidationIssue::new(
            "cli.timeout",
            "CLI timeout and output cap must be greater than zero",
        ));
    }

    result
}
