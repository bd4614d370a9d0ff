//! CLI adapter configuration types
//!
//! Where the gateway's local binary lives and how hard to bound it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Local command-line fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Use the CLI as the last fallback stage
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Full command line to use instead of the bare binary
    /// (e.g. `node /opt/gateway/dist/index.js`)
    #[serde(default)]
    pub command: Option<String>,
    /// Binary name looked up on `PATH`
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Working directory for every invocation
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Per-invocation timeout
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Maximum bytes read from stdout before the call is abandoned
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Also try the login-shell and `npx` wrappers
    #[serde(default = "default_true")]
    pub fallback_wrappers: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        CliConfig {
            enabled: true,
            command: None,
            binary: default_binary(),
            working_dir: None,
            timeout: default_timeout(),
            max_output_bytes: default_max_output(),
            fallback_wrappers: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_binary() -> String {
    "openclaw".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_output() -> usize {
    4 * 1024 * 1024 // 4MB
}
