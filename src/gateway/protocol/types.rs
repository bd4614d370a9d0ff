//! Gateway protocol types
//!
//! Parameters of the `connect` handshake request.

use serde::{Deserialize, Serialize};

use super::schema::{MAX_PROTOCOL, MIN_PROTOCOL};
use crate::config::ConnectionConfig;

/// Scopes requested by an operator client
pub const OPERATOR_SCOPES: &[&str] = &["operator.read", "operator.write", "operator.admin"];

/// `params` of the `connect` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub role: String,
    pub scopes: Vec<String>,
    pub auth: AuthParams,
    pub locale: String,
    pub user_agent: String,
}

/// Who is connecting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        ClientInfo {
            id: "clawbridge".to_string(),
            display_name: "clawbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: "backend".to_string(),
        }
    }
}

/// Credentials; the password is only sent when configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectParams {
    /// Operator handshake for a connection config
    pub fn operator(config: &ConnectionConfig) -> Self {
        let client = ClientInfo::default();
        ConnectParams {
            min_protocol: MIN_PROTOCOL,
            max_protocol: MAX_PROTOCOL,
            user_agent: format!("{}/{}", client.id, client.version),
            client,
            role: "operator".to_string(),
            scopes: OPERATOR_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth: AuthParams {
                token: config.token().to_string(),
                password: config.password().map(String::from),
            },
            locale: "en-US".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_wire_shape() {
        let config = ConnectionConfig::new("http://gw", "Bearer abc");
        let value = serde_json::to_value(ConnectParams::operator(&config)).unwrap();
        assert_eq!(value["minProtocol"], 3);
        assert_eq!(value["maxProtocol"], 3);
        assert_eq!(value["role"], "operator");
        assert_eq!(value["auth"]["token"], "abc");
        assert!(value["auth"].get("password").is_none());
        assert!(value["userAgent"].as_str().unwrap().starts_with("clawbridge/"));
    }

    #[test]
    fn test_password_included_when_set() {
        let config = ConnectionConfig::new("http://gw", "abc").with_password("pw");
        let value = serde_json::to_value(ConnectParams::operator(&config)).unwrap();
        assert_eq!(value["auth"]["password"], "pw");
    }
}
