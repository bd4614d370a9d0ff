//! Dataset catalog
//!
//! Every "list X" query is described once here: which tool names to try,
//! which REST paths, which CLI subcommand and which collection key to prefer
//! when extracting. Transports consume a [`DatasetSpec`] and never special-case
//! a particular dataset.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Known datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Agents,
    Channels,
    Sessions,
    Skills,
    CronJobs,
    Usage,
    Logs,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 7] = [
        DatasetKind::Agents,
        DatasetKind::Channels,
        DatasetKind::Sessions,
        DatasetKind::Skills,
        DatasetKind::CronJobs,
        DatasetKind::Usage,
        DatasetKind::Logs,
    ];

    /// Full description for the transports
    pub fn spec(self) -> DatasetSpec {
        let (name, key, tools, rest, cli): (&str, &str, &[&str], &[&str], &[&str]) = match self {
            DatasetKind::Agents => (
                "agents",
                "agents",
                &["agents.list", "agents_list", "agent.list"],
                &["/api/agents", "/agents"],
                &["agents", "list", "--json"],
            ),
            DatasetKind::Channels => (
                "channels",
                "channels",
                &["channels.status", "channels_status", "channels.list", "channels_list"],
                &["/api/channels", "/channels"],
                &["channels", "status", "--json"],
            ),
            DatasetKind::Sessions => (
                "sessions",
                "sessions",
                &["sessions.list", "sessions_list"],
                &["/api/sessions", "/sessions"],
                &["sessions", "--json"],
            ),
            DatasetKind::Skills => (
                "skills",
                "skills",
                &["skills.list", "skills_list", "skills.status"],
                &["/api/skills"],
                &["skills", "list", "--json"],
            ),
            DatasetKind::CronJobs => (
                "cron",
                "jobs",
                &["cron.list", "cron_list", "cron.jobs"],
                &["/api/cron", "/api/cron/jobs"],
                &["cron", "list", "--json"],
            ),
            DatasetKind::Usage => (
                "usage",
                "entries",
                &["usage.status", "usage_status", "usage.cost", "usage.list"],
                &["/api/usage"],
                &["usage", "--json"],
            ),
            DatasetKind::Logs => (
                "logs",
                "logs",
                &["logs.tail", "logs_tail", "logs.list"],
                &["/api/logs"],
                &["logs", "--json"],
            ),
        };

        DatasetSpec {
            name: name.to_string(),
            preferred_key: Some(key.to_string()),
            tools: tools.iter().map(|s| s.to_string()).collect(),
            rest_paths: rest.iter().map(|s| s.to_string()).collect(),
            cli_args: cli.iter().map(|s| s.to_string()).collect(),
            args: json!({}),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec().name)
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agents" | "agent" => Ok(DatasetKind::Agents),
            "channels" | "channel" => Ok(DatasetKind::Channels),
            "sessions" | "session" => Ok(DatasetKind::Sessions),
            "skills" | "skill" => Ok(DatasetKind::Skills),
            "cron" | "jobs" | "cron-jobs" | "cronjobs" => Ok(DatasetKind::CronJobs),
            "usage" => Ok(DatasetKind::Usage),
            "logs" | "log" => Ok(DatasetKind::Logs),
            other => Err(Error::InvalidInput(format!("Unknown dataset: {}", other))),
        }
    }
}

/// Everything a transport needs to fetch one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    /// Human-readable name used in diagnostics
    pub name: String,
    /// Collection key tried before the generic list
    pub preferred_key: Option<String>,
    /// Tool/method name synonyms, in order
    pub tools: Vec<String>,
    /// REST paths, in order
    pub rest_paths: Vec<String>,
    /// CLI arguments (including `--json`)
    pub cli_args: Vec<String>,
    /// Arguments for tool calls
    pub args: Value,
}

impl DatasetSpec {
    /// Describe a dataset the catalog does not know.
    ///
    /// `"memory.files"` becomes tools `memory.files`/`memory_files`, REST
    /// path `/api/memory/files` and CLI `memory files --json`.
    pub fn named(name: &str) -> Self {
        if let Ok(kind) = name.parse::<DatasetKind>() {
            return kind.spec();
        }

        let name = name.trim();
        let dotted = name.replace('_', ".");
        let underscored = name.replace('.', "_");
        let mut tools = vec![dotted.clone()];
        if underscored != dotted {
            tools.push(underscored);
        }
        let segments: Vec<String> = dotted.split('.').filter(|s| !s.is_empty()).map(String::from).collect();
        let mut cli_args = segments.clone();
        cli_args.push("--json".to_string());

        DatasetSpec {
            name: name.to_string(),
            preferred_key: segments.last().cloned(),
            tools,
            rest_paths: vec![format!("/api/{}", segments.join("/"))],
            cli_args,
            args: json!({}),
        }
    }

    /// Override tool arguments
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Agents".parse::<DatasetKind>().unwrap(), DatasetKind::Agents);
        assert_eq!("cron".parse::<DatasetKind>().unwrap(), DatasetKind::CronJobs);
        assert!("bogus".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_agents_spec_lists_both_verb_styles() {
        let spec = DatasetKind::Agents.spec();
        assert_eq!(spec.tools[0], "agents.list");
        assert_eq!(spec.tools[1], "agents_list");
        assert_eq!(spec.cli_args.last().map(String::as_str), Some("--json"));
    }

    #[test]
    fn test_every_cli_surface_uses_json_flag() {
        for kind in DatasetKind::ALL {
            assert!(kind.spec().cli_args.iter().any(|a| a == "--json"), "{}", kind);
        }
    }

    #[test]
    fn test_named_custom_dataset() {
        let spec = DatasetSpec::named("memory.files");
        assert_eq!(spec.tools, vec!["memory.files", "memory_files"]);
        assert_eq!(spec.rest_paths, vec!["/api/memory/files"]);
        assert_eq!(spec.cli_args, vec!["memory", "files", "--json"]);
        assert_eq!(spec.preferred_key.as_deref(), Some("files"));
    }

    #[test]
    fn test_named_known_dataset_uses_catalog() {
        assert_eq!(DatasetSpec::named("channels"), DatasetKind::Channels.spec());
    }
}
