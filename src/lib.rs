//! # clawbridge
//!
//! Connectivity layer for agent gateways whose capabilities are not known in
//! advance.
//!
//! ## Features
//!
//! - **Three transports:** WebSocket protocol, HTTP tool invocation, local CLI
//! - **Ordered fallback:** socket → HTTP tools → HTTP REST → CLI, stopping early on bad credentials
//! - **Shape-tolerant extraction:** one list of strategies for every response layout
//! - **Diagnostics everywhere:** every attempt leaves a human-readable line
//!
//! ## Example
//!
//! ```no_run
//! use clawbridge::{Bridge, ConnectionConfig};
//!
//! # async fn run() -> clawbridge::Result<()> {
//! let conn = ConnectionConfig::new("http://127.0.0.1:18789", "Bearer my-token");
//! let agents = Bridge::new(&conn, None)?.probe_agents().await;
//! println!("{} agents via {}", agents.count, agents.source);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod diagnose;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod http;
pub mod normalize;
pub mod types;

pub use bridge::Bridge;
pub use cli::CliAdapter;
pub use config::{Config, ConnectionConfig};
pub use dataset::{DatasetKind, DatasetSpec};
pub use diagnose::{run_diagnostics, DiagnosticReport};
pub use diagnostics::Diagnostics;
pub use discovery::discover;
pub use error::{Error, Result};
pub use types::{ConnectionCheck, CreateAgentRequest, CreateAgentResult, DatasetResult, DatasetSource, GatewayInfo};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
