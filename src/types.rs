//! Result types handed to callers of the orchestrators
//!
//! These are plain serializable values. Failures travel inside them as
//! `error` strings plus the diagnostics trail instead of as `Err`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::diagnostics::Diagnostics;

/// Which transport produced a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSource {
    /// A tool call, over the socket or `POST /tools/invoke`
    Tool,
    /// A plain REST path
    Http,
    /// The local binary
    Cli,
    /// Nothing produced data
    #[default]
    None,
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Tool => write!(f, "tool"),
            DatasetSource::Http => write!(f, "http"),
            DatasetSource::Cli => write!(f, "cli"),
            DatasetSource::None => write!(f, "none"),
        }
    }
}

/// Outcome of a "list X" query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResult {
    pub success: bool,
    pub source: DatasetSource,
    pub items: Vec<Value>,
    pub count: usize,
    pub diagnostics: Diagnostics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl DatasetResult {
    /// Successful result from `source`
    pub fn found(source: DatasetSource, items: Vec<Value>, diagnostics: Diagnostics) -> Self {
        DatasetResult {
            success: true,
            source,
            count: items.len(),
            items,
            diagnostics,
            error_details: None,
        }
    }

    /// Failed result; source is always `none`
    pub fn failed(error: impl Into<String>, diagnostics: Diagnostics) -> Self {
        DatasetResult {
            success: false,
            source: DatasetSource::None,
            items: Vec::new(),
            count: 0,
            diagnostics,
            error_details: Some(error.into()),
        }
    }
}

/// What the discovery orchestrator learned about a gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub agents: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_count: Option<usize>,
    #[serde(default)]
    pub channels: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Placeholder version when nothing reported one
pub const UNKNOWN_VERSION: &str = "unknown";

impl Default for GatewayInfo {
    fn default() -> Self {
        GatewayInfo {
            version: UNKNOWN_VERSION.to_string(),
            uptime: None,
            model: None,
            provider: None,
            agents: Vec::new(),
            agent_count: None,
            channels: Vec::new(),
            channel_count: None,
            config: None,
            error: None,
            diagnostics: Diagnostics::new(),
        }
    }
}

impl GatewayInfo {
    /// Whether anything beyond the placeholder was assembled
    pub fn has_signal(&self) -> bool {
        self.version != UNKNOWN_VERSION
            || self.uptime.is_some()
            || self.model.is_some()
            || !self.agents.is_empty()
            || !self.channels.is_empty()
            || self.agent_count.is_some()
            || self.channel_count.is_some()
            || self.config.is_some()
    }

    /// Fold a `status` response into the info; existing values win
    pub fn merge_status(&mut self, status: &Value) {
        if self.version == UNKNOWN_VERSION {
            if let Some(version) = first_str(status, &[&["version"], &["gateway", "version"], &["build", "version"]]) {
                self.version = version;
            }
        }
        if self.uptime.is_none() {
            self.uptime = first_u64(status, &[&["uptime"], &["uptimeSeconds"], &["gateway", "uptime"]]).or_else(
                || first_u64(status, &[&["uptimeMs"]]).map(|ms| ms / 1000),
            );
        }
        if self.model.is_none() {
            self.model = first_str(status, &[&["model"], &["defaultModel"], &["agents", "defaults", "model"]]);
        }
        if self.provider.is_none() {
            self.provider = first_str(status, &[&["provider"], &["defaultProvider"]]);
        }
        if self.agent_count.is_none() {
            self.agent_count = first_u64(status, &[&["agentCount"], &["agents", "count"]]).map(|n| n as usize);
        }
        if self.channel_count.is_none() {
            self.channel_count = first_u64(status, &[&["channelCount"], &["channels", "count"]]).map(|n| n as usize);
        }
    }

    /// Record an agent list; the count follows the list
    pub fn merge_agents(&mut self, agents: Vec<Value>) {
        if self.agents.is_empty() && !agents.is_empty() {
            self.agent_count = Some(agents.len());
            self.agents = agents;
        } else if self.agent_count.is_none() {
            self.agent_count = Some(agents.len());
        }
    }

    /// Record a channel list; the count follows the list
    pub fn merge_channels(&mut self, channels: Vec<Value>) {
        if self.channels.is_empty() && !channels.is_empty() {
            self.channel_count = Some(channels.len());
            self.channels = channels;
        } else if self.channel_count.is_none() {
            self.channel_count = Some(channels.len());
        }
    }

    /// Keep a config document and pick up the default model from it
    pub fn merge_config(&mut self, config: Value) {
        if self.model.is_none() {
            self.model = first_str(
                &config,
                &[&["agents", "defaults", "model"], &["agent", "model"], &["model"]],
            );
        }
        if self.config.is_none() {
            self.config = Some(config);
        }
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |cursor, key| cursor.get(key))
}

fn first_str(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        // `{"model": {"primary": "..."}}`
        Value::Object(obj) => obj.get("primary").and_then(Value::as_str).map(String::from),
        _ => None,
    })
}

fn first_u64(value: &Value, paths: &[&[&str]]) -> Option<u64> {
    paths.iter().find_map(|path| {
        let v = lookup(value, path)?;
        v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    })
}

/// Parameters for creating an agent on the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl CreateAgentRequest {
    pub fn new(name: impl Into<String>) -> Self {
        CreateAgentRequest {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Arguments for a tool or socket call
    pub fn to_args(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Outcome of an agent creation attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentResult {
    pub created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Tri-outcome connectivity check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    /// Authenticated and answered a call
    pub success: bool,
    /// Something on the other end answered at all
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pull an agent id out of a creation response of unknown shape
pub fn extract_agent_id(value: &Value) -> Option<String> {
    const ID_PATHS: &[&[&str]] = &[
        &["agentId"],
        &["id"],
        &["agent", "id"],
        &["result", "agentId"],
        &["result", "id"],
        &["payload", "agentId"],
        &["payload", "id"],
    ];

    if let Some(id) = value.as_str() {
        let id = id.trim();
        return (!id.is_empty()).then(|| id.to_string());
    }

    ID_PATHS.iter().find_map(|path| {
        let mut cursor = value;
        for key in path.iter() {
            cursor = cursor.get(key)?;
        }
        match cursor {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
