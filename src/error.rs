//! Error types for clawbridge
//!
//! The variants follow the failure taxonomy every transport reports into.
//! Only [`Error::Authentication`] is terminal: a bad credential is bad on
//! every transport, so the orchestrators stop as soon as one surfaces.
//! Everything else is caught at its stage, written to the diagnostics trail
//! and used to decide whether to try the next candidate.

use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// Result type alias using clawbridge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clawbridge
#[derive(Error, Debug)]
pub enum Error {
    /// The gateway rejected the credential (401-equivalent)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection refused, DNS failure, socket closed early
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Tool, method or REST path does not exist on this gateway
    #[error("Not found: {0}")]
    EndpointNotFound(String),

    /// Gateway configuration blocks the call
    #[error("Blocked by gateway policy: {0}")]
    PolicyDenied(String),

    /// Response was not JSON or had an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every transport and candidate failed
    #[error("{message}")]
    ExhaustedFallback {
        message: String,
        diagnostics: Diagnostics,
    },

    /// A stage exceeded its own timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Gateway answered with a generic rejection
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Non-2xx HTTP status without a more specific mapping
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must halt every remaining transport
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }

    /// Check if error is an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }

    /// Check if error was a policy block
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, Error::PolicyDenied(_))
    }

    /// Whether something on the other end answered before the failure.
    ///
    /// Used to tell "nothing ever responded" apart from "something responded
    /// but no known tool or endpoint matched".
    pub fn indicates_response(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_)
                | Error::EndpointNotFound(_)
                | Error::PolicyDenied(_)
                | Error::MalformedResponse(_)
                | Error::Gateway(_)
                | Error::HttpStatus { .. }
        )
    }

    /// Build an exhausted-fallback error carrying the diagnostics trail
    pub fn exhausted(message: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Error::ExhaustedFallback {
            message: message.into(),
            diagnostics,
        }
    }

    /// Classify a free-form rejection message from the gateway.
    ///
    /// A missing scope is a policy decision even when worded as
    /// "unauthorized": the credential itself was accepted.
    pub fn from_gateway_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if is_origin_rejection(&lower) || is_scope_denial(&lower) {
            Error::PolicyDenied(message)
        } else if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
            Error::Authentication(message)
        } else if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
            Error::EndpointNotFound(message)
        } else if is_policy_message(&lower) {
            Error::PolicyDenied(message)
        } else {
            Error::Gateway(message)
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Error::TransportUnavailable(err.to_string())
        } else if err.is_decode() {
            Error::MalformedResponse(err.to_string())
        } else {
            Error::TransportUnavailable(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Http(response) if response.status().as_u16() == 401 => {
                Error::Authentication("socket upgrade rejected with 401".to_string())
            }
            WsError::Http(response) if response.status().as_u16() == 403 => Error::PolicyDenied(
                format!("socket upgrade rejected with {}", response.status()),
            ),
            other => Error::TransportUnavailable(other.to_string()),
        }
    }
}

const AUTH_PATTERNS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "invalid token",
    "invalid password",
    "token mismatch",
    "auth failed",
    "authentication failed",
];

const NOT_FOUND_PATTERNS: &[&str] = &[
    "unknown method",
    "method not found",
    "unknown tool",
    "tool not found",
    "unknown command",
    "not available",
    "tool unavailable",
    "method unavailable",
];

const POLICY_PATTERNS: &[&str] = &[
    "blocked by policy",
    "denied by policy",
    "not allowed",
    "forbidden",
    "disabled by config",
];

/// Best-effort substring check for policy denials.
///
/// Gateways report these as free text, so this is a hint for clearer
/// aggregate messages rather than a reliable classifier.
pub fn is_policy_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    POLICY_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Whether a rejection names a missing operator scope
pub fn is_scope_denial(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "scope" || word == "scopes")
}

/// Whether a socket rejection was caused by the gateway's origin allowlist
pub fn is_origin_rejection(text: &str) -> bool {
    text.to_lowercase().contains("origin not allowed")
}
