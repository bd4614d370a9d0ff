//! Socket authentication state machine
//!
//! Pure and synchronous: the reader task feeds it frames and lifecycle
//! signals and performs whatever [`AuthAction`] comes back. Keeping it free
//! of I/O lets the client and the diagnostic runner share one handshake.
//!
//! ```text
//! Connecting ──opened──▶ AwaitingChallengeOrReady ──res ok / connect.ready──▶ Authenticated
//!                                  │                                              │
//!                          res !ok / close / error                              close
//!                                  ▼                                              ▼
//!                             ClosedError                                      ClosedOk
//! ```

use std::fmt;

use super::protocol::{events, Frame, FrameKind};
use crate::error::Error;

/// Handshake state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Connecting,
    AwaitingChallengeOrReady,
    Authenticated,
    ClosedError,
    ClosedOk,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Connecting => "connecting",
            AuthState::AwaitingChallengeOrReady => "awaiting challenge or ready",
            AuthState::Authenticated => "authenticated",
            AuthState::ClosedError => "closed (error)",
            AuthState::ClosedOk => "closed",
        };
        f.write_str(name)
    }
}

/// What the connection must do after a transition
#[derive(Debug)]
pub enum AuthAction {
    None,
    /// Send the `connect` request, then call [`AuthMachine::bind_connect_id`]
    SendConnect,
    /// Handshake finished; fires once per connection
    Authenticated,
    /// Handshake failed; the connection is finished
    Failed(Error),
}

/// Handshake driver
#[derive(Debug)]
pub struct AuthMachine {
    state: AuthState,
    connect_sent: bool,
    connect_id: Option<String>,
}

impl Default for AuthMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMachine {
    pub fn new() -> Self {
        AuthMachine {
            state: AuthState::Connecting,
            connect_sent: false,
            connect_id: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Whether the connection is closed, either way
    pub fn is_closed(&self) -> bool {
        matches!(self.state, AuthState::ClosedError | AuthState::ClosedOk)
    }

    /// The socket upgrade completed
    pub fn opened(&mut self) {
        if self.state == AuthState::Connecting {
            self.state = AuthState::AwaitingChallengeOrReady;
        }
    }

    /// Remember the id of the `connect` request just sent
    pub fn bind_connect_id(&mut self, id: impl Into<String>) {
        self.connect_id = Some(id.into());
    }

    /// No challenge arrived in time; connect unprompted
    pub fn grace_expired(&mut self) -> AuthAction {
        if self.state == AuthState::AwaitingChallengeOrReady {
            self.request_connect()
        } else {
            AuthAction::None
        }
    }

    /// Feed one received frame
    pub fn on_frame(&mut self, frame: &Frame) -> AuthAction {
        if self.state != AuthState::AwaitingChallengeOrReady {
            return AuthAction::None;
        }

        match frame.kind() {
            FrameKind::Event => match frame.event.as_deref() {
                Some(events::CONNECT_CHALLENGE) => self.request_connect(),
                Some(events::CONNECT_READY) => self.authenticate(),
                _ => AuthAction::None,
            },
            FrameKind::Response if self.is_connect_response(frame) => {
                if frame.is_failure() {
                    self.state = AuthState::ClosedError;
                    AuthAction::Failed(frame.rejection())
                } else {
                    self.authenticate()
                }
            }
            _ => AuthAction::None,
        }
    }

    /// The socket closed; `reason` is the close frame text if any
    pub fn on_closed(&mut self, reason: Option<&str>) -> AuthAction {
        match self.state {
            AuthState::Authenticated => {
                self.state = AuthState::ClosedOk;
                AuthAction::None
            }
            AuthState::ClosedError | AuthState::ClosedOk => AuthAction::None,
            AuthState::Connecting | AuthState::AwaitingChallengeOrReady => {
                self.state = AuthState::ClosedError;
                let reason = reason.map(str::trim).filter(|r| !r.is_empty());
                AuthAction::Failed(match reason {
                    Some(reason) => closed_with(reason),
                    None => Error::TransportUnavailable("socket closed before authentication".to_string()),
                })
            }
        }
    }

    /// A socket error occurred
    pub fn on_error(&mut self, error: Error) -> AuthAction {
        if self.is_closed() {
            return AuthAction::None;
        }
        let was_authenticated = self.is_authenticated();
        self.state = AuthState::ClosedError;
        if was_authenticated {
            AuthAction::None
        } else {
            AuthAction::Failed(error)
        }
    }

    fn request_connect(&mut self) -> AuthAction {
        if self.connect_sent {
            return AuthAction::None;
        }
        self.connect_sent = true;
        AuthAction::SendConnect
    }

    fn authenticate(&mut self) -> AuthAction {
        self.state = AuthState::Authenticated;
        AuthAction::Authenticated
    }

    fn is_connect_response(&self, frame: &Frame) -> bool {
        match (&self.connect_id, frame.id_str()) {
            (Some(expected), Some(id)) => *expected == id,
            _ => false,
        }
    }
}

/// Classify a close reason; unrecognised text means the transport went away
fn closed_with(reason: &str) -> Error {
    match Error::from_gateway_message(format!("socket closed before authentication: {}", reason)) {
        Error::Gateway(message) => Error::TransportUnavailable(message),
        other => other,
    }
}
