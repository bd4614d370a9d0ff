//! Local binary adapter
//!
//! Last-resort transport: shells out to the gateway's own command-line tool
//! with `--json` subcommands. Invocation candidates are tried in order:
//! the configured command line, the bare binary on `PATH`, then a login
//! shell and `npx --no-install` for hosts where `PATH` is only set up by the
//! user's profile.

use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use super::output::parse_cli_output;
use crate::config::CliConfig;
use crate::dataset::DatasetSpec;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fallback::first_success;
use crate::types::{extract_agent_id, CreateAgentRequest};

/// Bytes of stderr kept for error messages
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Shell exit code for "command not found"
const EXIT_NOT_FOUND: i32 = 127;

/// One way of launching the binary
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Program plus fixed leading arguments
    Direct { program: PathBuf, prefix: Vec<String> },
    /// `sh -lc "<command line> <args>"`
    LoginShell { command_line: String },
    /// `npx --no-install <package> <args>`
    Npx { package: String },
}

impl Invocation {
    fn command(&self, args: &[String]) -> Command {
        match self {
            Invocation::Direct { program, prefix } => {
                let mut cmd = Command::new(program);
                cmd.args(prefix).args(args);
                cmd
            }
            Invocation::LoginShell { command_line } => {
                let mut line = command_line.clone();
                for arg in args {
                    line.push(' ');
                    line.push_str(&shell_quote(arg));
                }
                let mut cmd = Command::new("sh");
                cmd.arg("-lc").arg(line);
                cmd
            }
            Invocation::Npx { package } => {
                let mut cmd = Command::new("npx");
                cmd.arg("--no-install").arg(package).args(args);
                cmd
            }
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Direct { program, prefix } if prefix.is_empty() => write!(f, "{}", program.display()),
            Invocation::Direct { program, prefix } => write!(f, "{} {}", program.display(), prefix.join(" ")),
            Invocation::LoginShell { command_line } => write!(f, "sh -lc '{}'", command_line),
            Invocation::Npx { package } => write!(f, "npx --no-install {}", package),
        }
    }
}

/// Runs the gateway binary and parses its JSON output
#[derive(Debug, Clone)]
pub struct CliAdapter {
    config: CliConfig,
}

impl CliAdapter {
    pub fn new(config: CliConfig) -> Self {
        CliAdapter { config }
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Invocation candidates in priority order.
    ///
    /// A binary missing from `PATH` is skipped with a diagnostic; the shell
    /// and `npx` wrappers are still offered because they may see a
    /// different `PATH`.
    pub fn candidates(&self, diagnostics: &mut Diagnostics) -> Vec<Invocation> {
        let mut candidates = Vec::new();

        let configured = self
            .config
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        if let Some(command_line) = configured {
            let mut parts = command_line.split_whitespace().map(String::from);
            if let Some(program) = parts.next() {
                candidates.push(Invocation::Direct {
                    program: PathBuf::from(program),
                    prefix: parts.collect(),
                });
            }
        }

        let binary = self.config.binary.trim();
        if !binary.is_empty() {
            match which::which(binary) {
                Ok(path) => candidates.push(Invocation::Direct {
                    program: path,
                    prefix: Vec::new(),
                }),
                Err(_) => diagnostics.push(format!("cli: {} not found on PATH", binary)),
            }
        }

        if self.config.fallback_wrappers {
            let line = configured.unwrap_or(binary);
            if !line.is_empty() {
                candidates.push(Invocation::LoginShell {
                    command_line: line.to_string(),
                });
            }
            if !binary.is_empty() {
                candidates.push(Invocation::Npx {
                    package: binary.to_string(),
                });
            }
        }

        candidates
    }

    /// Run `args` through each candidate until one prints parseable JSON
    pub async fn run_json(&self, args: &[String], diagnostics: &mut Diagnostics) -> Result<Value> {
        if !self.config.enabled {
            return Err(Error::TransportUnavailable("CLI fallback is disabled".to_string()));
        }

        let candidates = self.candidates(diagnostics);
        if candidates.is_empty() {
            let message = "cli: no binary, command or wrapper available";
            diagnostics.push(message);
            return Err(Error::TransportUnavailable(message.to_string()));
        }

        let (_, value) = first_success("cli", candidates, diagnostics, |invocation| {
            async move { self.run_once(&invocation, args).await }.boxed()
        })
        .await?;
        Ok(value)
    }

    /// One bounded subprocess run
    pub async fn run_once(&self, invocation: &Invocation, args: &[String]) -> Result<Value> {
        let mut cmd = invocation.command(args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        debug!("Running CLI: {} {}", invocation, args.join(" "));

        let mut child = cmd.spawn().map_err(|e| {
            Error::TransportUnavailable(format!("failed to start {}: {}", invocation, e))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.config.max_output_bytes;

        let work = async {
            let (out, err) = tokio::try_join!(
                read_capped(stdout, cap, "stdout"),
                read_capped(stderr, MAX_STDERR_BYTES, "stderr"),
            )?;
            let status = child.wait().await?;
            Ok::<_, Error>((status, out, err))
        };

        let (status, stdout, stderr) = match tokio::time::timeout(self.config.timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "{} did not finish within {:?}",
                    invocation, self.config.timeout
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&stdout);
        let stderr = String::from_utf8_lossy(&stderr);

        if !status.success() {
            return Err(exit_error(invocation, status.code(), &stderr, &stdout));
        }

        parse_cli_output(&stdout)
    }

    /// Fetch one dataset's raw JSON
    pub async fn fetch_dataset(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Value> {
        self.run_json(&spec.cli_args, diagnostics).await
    }

    /// `status --json`
    pub async fn gateway_status(&self, diagnostics: &mut Diagnostics) -> Result<Value> {
        self.run_json(&strings(&["status", "--json"]), diagnostics).await
    }

    /// `config get --json`
    pub async fn gateway_config(&self, diagnostics: &mut Diagnostics) -> Result<Value> {
        self.run_json(&strings(&["config", "get", "--json"]), diagnostics).await
    }

    /// Create an agent, then set its identity.
    ///
    /// The identity step is best-effort: its failure is recorded but the
    /// agent still counts as created. Returns the id when the first step's
    /// output contains one.
    pub async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        let mut args = strings(&["agents", "add", request.name.as_str()]);
        if let Some(ref workspace) = request.workspace {
            args.push("--workspace".to_string());
            args.push(workspace.clone());
        }
        if let Some(ref model) = request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push("--non-interactive".to_string());
        args.push("--json".to_string());

        let created = self.run_json(&args, diagnostics).await?;
        let agent_id = extract_agent_id(&created);

        if let Some(ref emoji) = request.emoji {
            let target = agent_id.clone().unwrap_or_else(|| request.name.clone());
            let identity = strings(&[
                "agents",
                "set-identity",
                target.as_str(),
                "--name",
                request.name.as_str(),
                "--emoji",
                emoji.as_str(),
                "--json",
            ]);
            let mut identity_diags = Diagnostics::new();
            match self.run_json(&identity, &mut identity_diags).await {
                Ok(_) => diagnostics.push(format!("cli: identity set for {}", target)),
                Err(e) => diagnostics.push(format!("cli: identity step failed (ignored): {}", e)),
            }
        }

        Ok(agent_id)
    }
}

async fn read_capped<R>(reader: Option<R>, cap: usize, stream: &str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    reader.take(cap as u64 + 1).read_to_end(&mut buf).await?;
    if buf.len() > cap {
        return Err(Error::MalformedResponse(format!("CLI {} exceeded {} bytes", stream, cap)));
    }
    Ok(buf)
}

fn exit_error(invocation: &Invocation, code: Option<i32>, stderr: &str, stdout: &str) -> Error {
    let detail = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(|s| s.lines().take(5).collect::<Vec<_>>().join(" | "))
        .unwrap_or_else(|| "no output".to_string());
    let code_text = code.map_or_else(|| "signal".to_string(), |c| c.to_string());

    if code == Some(EXIT_NOT_FOUND) || detail.contains("command not found") {
        return Error::TransportUnavailable(format!("{} not runnable: {}", invocation, detail));
    }

    match Error::from_gateway_message(detail) {
        Error::Gateway(message) => Error::Gateway(format!("{} exited with {}: {}", invocation, code_text, message)),
        classified => classified,
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Quote one argument for `sh`
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_without_wrappers() -> CliConfig {
        CliConfig {
            binary: "clawbridge-test-binary-that-does-not-exist".to_string(),
            fallback_wrappers: false,
            timeout: Duration::from_secs(5),
            ..CliConfig::default()
        }
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("agents"), "agents");
        assert_eq!(shell_quote("--json"), "--json");
        assert_eq!(shell_quote("my agent"), "'my agent'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_candidate_order() {
        let adapter = CliAdapter::new(CliConfig {
            command: Some("node /opt/gw/index.js".to_string()),
            binary: "clawbridge-test-binary-that-does-not-exist".to_string(),
            ..CliConfig::default()
        });
        let mut diags = Diagnostics::new();
        let candidates = adapter.candidates(&mut diags);

        assert_eq!(
            candidates[0],
            Invocation::Direct {
                program: PathBuf::from("node"),
                prefix: vec!["/opt/gw/index.js".to_string()],
            }
        );
        assert_eq!(
            candidates[1],
            Invocation::LoginShell {
                command_line: "node /opt/gw/index.js".to_string()
            }
        );
        assert!(matches!(candidates[2], Invocation::Npx { .. }));
        assert!(diags.mentions("not found on PATH"));
    }

    #[tokio::test]
    async fn test_missing_binary_without_wrappers() {
        let adapter = CliAdapter::new(config_without_wrappers());
        let mut diags = Diagnostics::new();
        let err = adapter.run_json(&strings(&["agents", "list", "--json"]), &mut diags).await.unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
        assert!(diags.mentions("cli:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_command_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "gw", r#"echo '{"agents":[{"id":"main"}]}'"#);
        let adapter = CliAdapter::new(CliConfig {
            command: Some(path.display().to_string()),
            ..config_without_wrappers()
        });

        let mut diags = Diagnostics::new();
        let value = adapter
            .fetch_dataset(&crate::dataset::DatasetKind::Agents.spec(), &mut diags)
            .await
            .unwrap();
        assert_eq!(value["agents"][0]["id"], "main");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unparseable_output_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let bad = script(&dir, "bad", "echo 'not json at all'");
        let adapter = CliAdapter::new(CliConfig {
            command: Some(bad.display().to_string()),
            ..config_without_wrappers()
        });

        let mut diags = Diagnostics::new();
        let err = adapter.run_json(&strings(&["status", "--json"]), &mut diags).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(&dir, "slow", "sleep 5");
        let adapter = CliAdapter::new(CliConfig {
            command: Some(slow.display().to_string()),
            timeout: Duration::from_millis(200),
            ..config_without_wrappers()
        });

        let mut diags = Diagnostics::new();
        let err = adapter.run_json(&strings(&["status"]), &mut diags).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_cap() {
        let dir = tempfile::tempdir().unwrap();
        let chatty = script(&dir, "chatty", r#"echo '{"data":"0123456789012345678901234567890123456789"}'"#);
        let adapter = CliAdapter::new(CliConfig {
            command: Some(chatty.display().to_string()),
            max_output_bytes: 16,
            ..config_without_wrappers()
        });

        let mut diags = Diagnostics::new();
        let err = adapter.run_json(&strings(&["status"]), &mut diags).await.unwrap_err();
        assert!(err.to_string().contains("exceeded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_agent_identity_failure_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let gw = script(
            &dir,
            "gw",
            r#"if [ "$2" = "add" ]; then echo '{"agentId":"scout"}'; else echo 'boom' >&2; exit 2; fi"#,
        );
        let adapter = CliAdapter::new(CliConfig {
            command: Some(gw.display().to_string()),
            ..config_without_wrappers()
        });

        let mut request = CreateAgentRequest::new("scout");
        request.emoji = Some("🔭".to_string());
        let mut diags = Diagnostics::new();
        let id = adapter.create_agent(&request, &mut diags).await.unwrap();
        assert_eq!(id.as_deref(), Some("scout"));
        assert!(diags.mentions("identity step failed"));
    }

    #[test]
    fn test_exit_error_classification() {
        let inv = Invocation::Npx {
            package: "openclaw".to_string(),
        };
        assert!(matches!(
            exit_error(&inv, Some(127), "sh: openclaw: command not found", ""),
            Error::TransportUnavailable(_)
        ));
        assert!(exit_error(&inv, Some(1), "Error: unauthorized", "").is_auth_failure());
        assert!(matches!(
            exit_error(&inv, Some(1), "error: unknown command 'cron'", ""),
            Error::EndpointNotFound(_)
        ));
        assert!(matches!(exit_error(&inv, Some(3), "", ""), Error::Gateway(_)));
    }
}
