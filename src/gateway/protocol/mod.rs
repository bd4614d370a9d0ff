//! Gateway socket protocol
//!
//! ## Message Types
//!
//! - `req`: client-initiated requests, `{type, id, method, params}`
//! - `res`: responses matched by `id`, `{type, id, ok, payload | error}`
//! - `event`: server pushes such as `connect.challenge`
//!
//! Every connection starts with a `connect` request carrying the credentials.

pub mod schema;
pub mod types;

pub use schema::{events, Frame, FrameKind, ProtocolError, RequestFrame, CONNECT_METHOD};
pub use types::{AuthParams, ClientInfo, ConnectParams};
