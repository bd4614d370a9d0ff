//! Gateway socket transport
//!
//! ## Architecture
//!
//! ```text
//! GatewayClient::connect
//!        │
//!        ▼
//! ┌──────────────┐   Outgoing    ┌──────────────┐
//! │GatewaySession│──────────────▶│ writer task  │──▶ ws sink
//! │  call(..)    │               └──────────────┘
//! │  pending map │◀── responses ─┌──────────────┐
//! └──────────────┘               │ reader task  │◀── ws stream
//!                                │ AuthMachine  │
//!                                └──────────────┘
//! ```

pub mod auth;
pub mod client;
pub mod protocol;

pub use auth::{AuthAction, AuthMachine, AuthState};
pub use client::{GatewayClient, GatewaySession, DEFAULT_CHALLENGE_GRACE, ORIGIN_HINT};
pub use protocol::{events, ConnectParams, Frame, FrameKind, ProtocolError, RequestFrame};
