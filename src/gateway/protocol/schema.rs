//! Gateway protocol schema
//!
//! Wire format for socket frames. Incoming frames are parsed leniently: every
//! field is optional and the frame kind is inferred when `type` is missing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{is_scope_denial, Error};

/// Protocol version range this client speaks
pub const MIN_PROTOCOL: u32 = 3;
pub const MAX_PROTOCOL: u32 = 3;

/// Method name of the handshake request
pub const CONNECT_METHOD: &str = "connect";

/// Well-known events
pub mod events {
    /// Server asks the client to authenticate
    pub const CONNECT_CHALLENGE: &str = "connect.challenge";
    /// Server declares the connection ready without a response frame
    pub const CONNECT_READY: &str = "connect.ready";
}

/// Error codes some gateways attach to rejections
pub mod error_codes {
    /// Method not found
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Authentication required
    pub const AUTH_REQUIRED: i64 = -32000;
    /// Authentication failed
    pub const AUTH_FAILED: i64 = -32001;

    /// String codes used instead of numbers
    pub const AUTH_STRINGS: &[&str] = &["UNAUTHORIZED", "AUTH_FAILED", "AUTH_REQUIRED", "INVALID_TOKEN"];
    pub const NOT_FOUND_STRINGS: &[&str] = &["METHOD_NOT_FOUND", "UNKNOWN_METHOD", "NOT_FOUND"];
    pub const POLICY_STRINGS: &[&str] = &["FORBIDDEN", "POLICY_DENIED", "NOT_ALLOWED"];
}

/// Frame kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    Event,
    Unknown,
}

/// Any frame received from the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Frame {
    /// Parse one text message
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::MalformedResponse(format!("unparseable socket frame: {}", e)))
    }

    pub fn kind(&self) -> FrameKind {
        match self.frame_type.as_deref() {
            Some("req") => FrameKind::Request,
            Some("res") => FrameKind::Response,
            Some("event") => FrameKind::Event,
            Some(_) => FrameKind::Unknown,
            None if self.event.is_some() => FrameKind::Event,
            None if self.id.is_some() && (self.ok.is_some() || self.result.is_some() || self.error.is_some()) => {
                FrameKind::Response
            }
            None => FrameKind::Unknown,
        }
    }

    /// Event name if this is an event frame
    pub fn event_name(&self) -> Option<&str> {
        if self.kind() == FrameKind::Event {
            self.event.as_deref()
        } else {
            None
        }
    }

    /// Response id as a string, whether sent as a number or a string
    pub fn id_str(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether the response reports failure
    pub fn is_failure(&self) -> bool {
        self.ok == Some(false) || (self.ok.is_none() && self.error.is_some())
    }

    /// Response body: `payload`, then `result`, then null
    pub fn into_body(self) -> Value {
        self.payload.or(self.result).unwrap_or(Value::Null)
    }

    /// Classified error of a failed response
    pub fn rejection(&self) -> Error {
        match &self.error {
            Some(error) => ProtocolError::from_value(error).classify(),
            None => Error::Gateway("request rejected without detail".to_string()),
        }
    }
}

/// Outgoing request
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame<'a> {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub id: String,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> RequestFrame<'a> {
    pub fn new(id: String, method: &'a str, params: &'a Value) -> Self {
        RequestFrame {
            frame_type: "req",
            id,
            method,
            params,
        }
    }

    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error detail of a rejected request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolError {
    pub code: Option<Value>,
    pub message: String,
}

impl ProtocolError {
    /// Read `"text"` or `{code, message}`
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => ProtocolError {
                code: None,
                message: s.clone(),
            },
            Value::Object(obj) => ProtocolError {
                code: obj.get("code").cloned(),
                message: obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| value.to_string()),
            },
            other => ProtocolError {
                code: None,
                message: other.to_string(),
            },
        }
    }

    /// Map to the crate error taxonomy; a recognised code beats the message,
    /// except that a missing scope is always a policy denial
    pub fn classify(&self) -> Error {
        let text = self.to_string();
        if is_scope_denial(&self.message) {
            return Error::PolicyDenied(text);
        }
        match &self.code {
            Some(Value::Number(n)) => match n.as_i64() {
                Some(error_codes::AUTH_REQUIRED) | Some(error_codes::AUTH_FAILED) => Error::Authentication(text),
                Some(error_codes::METHOD_NOT_FOUND) => Error::EndpointNotFound(text),
                _ => Error::from_gateway_message(text),
            },
            Some(Value::String(code)) => {
                let code = code.to_uppercase();
                if error_codes::AUTH_STRINGS.contains(&code.as_str()) {
                    Error::Authentication(text)
                } else if error_codes::NOT_FOUND_STRINGS.contains(&code.as_str()) {
                    Error::EndpointNotFound(text)
                } else if error_codes::POLICY_STRINGS.contains(&code.as_str()) {
                    Error::PolicyDenied(text)
                } else {
                    Error::from_gateway_message(text)
                }
            }
            _ => Error::from_gateway_message(text),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(Value::String(code)) => write!(f, "{} ({})", self.message, code),
            Some(Value::Number(code)) => write!(f, "{} ({})", self.message, code),
            _ => write!(f, "{}", self.message),
        }
    }
}
