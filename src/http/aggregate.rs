//! Aggregate discovery over the HTTP tool endpoint
//!
//! Four independent queries (status, agents, channels, config). Each one is
//! caught on its own; whatever succeeded is merged.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::ToolsClient;
use super::extract::extract_dataset_with;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::types::GatewayInfo;

/// Tool synonyms for each aggregate query
pub const STATUS_TOOLS: &[&str] = &["status", "gateway.status", "gateway_status"];
pub const AGENT_TOOLS: &[&str] = &["agents.list", "agents_list"];
pub const CHANNEL_TOOLS: &[&str] = &["channels.status", "channels_status", "channels.list"];
pub const CONFIG_TOOLS: &[&str] = &["config.get", "config_get"];

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    policy_blocked: usize,
    responded: usize,
}

impl Tally {
    fn record<T>(&mut self, outcome: &Result<T>) {
        match outcome {
            Ok(_) => {
                self.succeeded += 1;
                self.responded += 1;
            }
            Err(err) => {
                if err.is_policy_denied() {
                    self.policy_blocked += 1;
                }
                if err.indicates_response() {
                    self.responded += 1;
                }
            }
        }
    }
}

/// Run the four queries and merge what came back.
///
/// An authentication failure on any query is returned immediately. When no
/// query succeeded the error says whether the gateway was reachable but
/// policy-blocked, reachable without matching tools, or silent.
pub async fn aggregate_discovery(client: &ToolsClient, diagnostics: &mut Diagnostics) -> Result<GatewayInfo> {
    let mut info = GatewayInfo::default();
    let mut tally = Tally::default();
    let args = json!({});

    let status = client.invoke_tool_any(STATUS_TOOLS, &args, diagnostics).await;
    tally.record(&status);
    match status {
        Ok((_, value)) => info.merge_status(&value),
        Err(err) if err.is_auth_failure() => return Err(err),
        Err(_) => {}
    }

    let agents = client.invoke_tool_any(AGENT_TOOLS, &args, diagnostics).await;
    tally.record(&agents);
    match agents {
        Ok((_, value)) => info.merge_agents(extract_dataset_with(&value, Some("agents"))),
        Err(err) if err.is_auth_failure() => return Err(err),
        Err(_) => {}
    }

    let channels = client.invoke_tool_any(CHANNEL_TOOLS, &args, diagnostics).await;
    tally.record(&channels);
    match channels {
        Ok((_, value)) => info.merge_channels(extract_dataset_with(&value, Some("channels"))),
        Err(err) if err.is_auth_failure() => return Err(err),
        Err(_) => {}
    }

    let config = client.invoke_tool_any(CONFIG_TOOLS, &args, diagnostics).await;
    tally.record(&config);
    match config {
        Ok((_, value)) => info.merge_config(unwrap_config(value)),
        Err(err) if err.is_auth_failure() => return Err(err),
        Err(_) => {}
    }

    debug!(?tally, "HTTP aggregate finished");

    if tally.succeeded == 0 && !info.has_signal() {
        let message = if tally.policy_blocked > 0 {
            format!(
                "gateway reachable but policy-blocked ({} of 4 queries denied)",
                tally.policy_blocked
            )
        } else if tally.responded > 0 {
            "gateway responded but no known tool matched".to_string()
        } else {
            "no tools responded over HTTP".to_string()
        };
        diagnostics.push(format!("http aggregate: {}", message));
        return Err(Error::exhausted(message, diagnostics.clone()));
    }

    info!(
        "HTTP aggregate: {} of 4 queries succeeded (version {})",
        tally.succeeded, info.version
    );
    Ok(info)
}

/// `config.get` answers either with the document or `{config: {...}}`
fn unwrap_config(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() <= 3 && map.get("config").map_or(false, Value::is_object) => {
            map.remove("config").unwrap_or(Value::Null)
        }
        other => other,
    }
}
