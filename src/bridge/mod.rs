//! Bridge - multi-transport fallback orchestration
//!
//! - transport.rs: the `Transport` trait and its four stages
//! - orchestrator.rs: `Bridge`, which runs the stages in priority order

pub mod orchestrator;
pub mod transport;

pub use orchestrator::Bridge;
pub use transport::{CliTransport, RestTransport, SocketTransport, ToolTransport, Transport};
