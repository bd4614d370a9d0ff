//! Gateway connection configuration types
//!
//! `GatewayConfig` is the file/env form; `ConnectionConfig` is the value that
//! every logical call receives fresh.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::normalize::{clean_token, convert_http_to_ws, normalize_http_url};

/// Gateway section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway address (`http(s)://`, `ws(s)://` or a bare host)
    #[serde(default = "default_url")]
    pub url: String,
    /// Bearer token
    #[serde(skip_serializing, default = "default_secret")]
    pub token: SecretString,
    /// Optional shared password sent alongside the token
    #[serde(skip_serializing, default)]
    pub password: Option<SecretString>,
    /// Session key passed to tool invocations
    #[serde(default = "default_session_key")]
    pub session_key: String,
    /// Connection-level timeout (socket handshake, HTTP request)
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Timeout for each individual socket call
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            url: default_url(),
            token: default_secret(),
            password: None,
            session_key: default_session_key(),
            timeout: default_timeout(),
            call_timeout: default_call_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Build the per-call connection value
    pub fn connection(&self) -> ConnectionConfig {
        let mut conn = ConnectionConfig::new(&self.url, self.token.expose_secret())
            .with_session_key(self.session_key.clone())
            .with_timeout(self.timeout)
            .with_call_timeout(self.call_timeout);
        if let Some(ref password) = self.password {
            conn = conn.with_password(password.expose_secret());
        }
        conn
    }
}

fn default_url() -> String {
    "http://127.0.0.1:18789".to_string()
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_session_key() -> String {
    "main".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Connection parameters for one logical call.
///
/// Never mutated once built and never cached; each orchestrator call takes
/// its own copy.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway address as given by the user
    pub server_url: String,
    /// Bearer token, already stripped of any `Bearer ` prefix
    pub token: SecretString,
    /// Optional password
    pub password: Option<SecretString>,
    /// Session key for tool invocations
    pub session_key: String,
    /// Connection-level timeout
    pub timeout: Duration,
    /// Per-call timeout on an open socket
    pub call_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a connection config with default timeouts
    pub fn new(server_url: impl Into<String>, token: &str) -> Self {
        ConnectionConfig {
            server_url: server_url.into(),
            token: SecretString::from(clean_token(token)),
            password: None,
            session_key: default_session_key(),
            timeout: default_timeout(),
            call_timeout: default_call_timeout(),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        let password = password.trim();
        self.password = if password.is_empty() {
            None
        } else {
            Some(SecretString::from(password.to_string()))
        };
        self
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = session_key.into();
        self
    }

    /// Set the connection-level timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The token in plain text
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }

    pub fn has_token(&self) -> bool {
        !self.token().is_empty()
    }

    /// Normalized HTTP base URL (no trailing slash)
    pub fn http_base(&self) -> String {
        normalize_http_url(&self.server_url)
    }

    /// WebSocket URL derived from the HTTP base
    pub fn ws_url(&self) -> String {
        convert_http_to_ws(&self.http_base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_cleans_token() {
        let conn = ConnectionConfig::new("gw.local:18789/", "Bearer  secret ");
        assert_eq!(conn.token(), "secret");
        assert_eq!(conn.http_base(), "https://gw.local:18789");
        assert_eq!(conn.ws_url(), "wss://gw.local:18789");
    }

    #[test]
    fn test_ws_url_from_ws_input() {
        let conn = ConnectionConfig::new("ws://127.0.0.1:18789", "t");
        assert_eq!(conn.http_base(), "http://127.0.0.1:18789");
        assert_eq!(conn.ws_url(), "ws://127.0.0.1:18789");
    }

    #[test]
    fn test_blank_password_is_none() {
        let conn = ConnectionConfig::new("http://x", "t").with_password("  ");
        assert!(conn.password().is_none());
        let conn = conn.with_password("pw");
        assert_eq!(conn.password(), Some("pw"));
    }

    #[test]
    fn test_gateway_config_connection() {
        let config = GatewayConfig {
            token: SecretString::from("bearer abc".to_string()),
            session_key: "ops".to_string(),
            ..GatewayConfig::default()
        };
        let conn = config.connection();
        assert_eq!(conn.token(), "abc");
        assert_eq!(conn.session_key, "ops");
        assert_eq!(conn.timeout, Duration::from_secs(10));
    }
}
