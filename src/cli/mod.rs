//! CLI transport
//!
//! - adapter.rs: invocation candidates and bounded subprocess runs
//! - output.rs: JSON / NDJSON stdout parsing

pub mod adapter;
pub mod output;

pub use adapter::{CliAdapter, Invocation};
pub use output::parse_cli_output;
