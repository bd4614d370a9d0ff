//! HTTP tool transport
//!
//! - client.rs: `POST /tools/invoke` and legacy REST calls
//! - extract.rs: result unwrapping and dataset extraction
//! - aggregate.rs: four-query discovery over the tool endpoint

pub mod aggregate;
pub mod client;
pub mod extract;

pub use aggregate::aggregate_discovery;
pub use client::{RawResponse, ToolsClient};
pub use extract::{extract_dataset, extract_dataset_with, looks_like_dataset, unwrap_tool_result};
