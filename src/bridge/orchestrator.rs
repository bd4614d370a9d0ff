//! Bridge orchestrator
//!
//! Runs the fixed stage order socket → HTTP tools → HTTP REST → CLI for every
//! operation and folds the outcome into the plain result types.

use tracing::{info, warn};

use super::transport::{CliTransport, RestTransport, SocketTransport, ToolTransport, Transport};
use crate::cli::CliAdapter;
use crate::config::ConnectionConfig;
use crate::dataset::{DatasetKind, DatasetSpec};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::gateway::GatewayClient;
use crate::http::ToolsClient;
use crate::types::{ConnectionCheck, CreateAgentRequest, CreateAgentResult, DatasetResult};

/// Multi-transport fallback over one gateway
pub struct Bridge {
    transports: Vec<Box<dyn Transport>>,
}

impl Bridge {
    /// Standard stage order for a connection; the CLI stage is added when an
    /// enabled adapter is given
    pub fn new(config: &ConnectionConfig, cli: Option<CliAdapter>) -> Result<Self> {
        let tools = ToolsClient::new(config)?;
        let mut transports: Vec<Box<dyn Transport>> = vec![
            Box::new(SocketTransport::new(GatewayClient::new(config.clone()))),
            Box::new(ToolTransport::new(tools.clone())),
            Box::new(RestTransport::new(tools)),
        ];
        if let Some(adapter) = cli.filter(CliAdapter::is_enabled) {
            transports.push(Box::new(CliTransport::new(adapter)));
        }
        Ok(Bridge { transports })
    }

    /// Custom stage list, tried in the given order
    pub fn with_transports(transports: Vec<Box<dyn Transport>>) -> Self {
        Bridge { transports }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// List the gateway's agents
    pub async fn probe_agents(&self) -> DatasetResult {
        self.fetch_dataset(&DatasetKind::Agents.spec()).await
    }

    /// Fetch any dataset through the stage chain.
    ///
    /// Never returns `Err`: failures come back as `success: false` with the
    /// reason in `error_details` and every attempt in `diagnostics`.
    pub async fn fetch_dataset(&self, spec: &DatasetSpec) -> DatasetResult {
        let mut diagnostics = Diagnostics::new();
        let mut responded = false;

        for transport in &self.transports {
            diagnostics.push(format!("{}: fetching {}", transport.name(), spec.name));
            match transport.fetch(spec, &mut diagnostics).await {
                Ok(items) => {
                    diagnostics.push(format!(
                        "{}: got {} {} item(s)",
                        transport.name(),
                        items.len(),
                        spec.name
                    ));
                    info!("{} fetched via {} ({} items)", spec.name, transport.name(), items.len());
                    return DatasetResult::found(transport.source(), items, diagnostics);
                }
                Err(err) if err.is_terminal() => {
                    diagnostics.push(format!(
                        "{}: authentication failed, skipping remaining stages",
                        transport.name()
                    ));
                    warn!("{} fetch stopped: {}", spec.name, err);
                    return DatasetResult::failed(err.to_string(), diagnostics);
                }
                Err(err) => {
                    responded |= err.indicates_response();
                    diagnostics.push(format!("{}: {} unavailable: {}", transport.name(), spec.name, err));
                }
            }
        }

        let err = exhausted(&spec.name, responded, diagnostics.clone());
        warn!("{}", err);
        DatasetResult::failed(err.to_string(), diagnostics)
    }

    /// Create an agent through the first stage that supports it
    pub async fn create_agent(&self, request: &CreateAgentRequest) -> CreateAgentResult {
        let mut diagnostics = Diagnostics::new();

        if request.name.trim().is_empty() {
            return CreateAgentResult {
                created: false,
                agent_id: None,
                error: Some(Error::InvalidInput("agent name is empty".to_string()).to_string()),
                diagnostics,
            };
        }

        let mut responded = false;
        for transport in &self.transports {
            diagnostics.push(format!("{}: creating agent {}", transport.name(), request.name));
            match transport.create_agent(request, &mut diagnostics).await {
                Ok(agent_id) => {
                    diagnostics.push(format!(
                        "{}: agent created ({})",
                        transport.name(),
                        agent_id.as_deref().unwrap_or("id not reported")
                    ));
                    return CreateAgentResult {
                        created: true,
                        agent_id,
                        error: None,
                        diagnostics,
                    };
                }
                Err(err) if err.is_terminal() => {
                    diagnostics.push(format!(
                        "{}: authentication failed, skipping remaining stages",
                        transport.name()
                    ));
                    return CreateAgentResult {
                        created: false,
                        agent_id: None,
                        error: Some(err.to_string()),
                        diagnostics,
                    };
                }
                Err(err) => {
                    responded |= err.indicates_response();
                    diagnostics.push(format!("{}: create failed: {}", transport.name(), err));
                }
            }
        }

        let err = exhausted("agent creation", responded, diagnostics.clone());
        CreateAgentResult {
            created: false,
            agent_id: None,
            error: Some(err.to_string()),
            diagnostics,
        }
    }

    /// Is anything there, and does it accept the credentials?
    pub async fn check_connection(&self) -> ConnectionCheck {
        let mut diagnostics = Diagnostics::new();
        let mut connected = false;
        let mut last_error: Option<Error> = None;

        for transport in &self.transports {
            match transport.ping(&mut diagnostics).await {
                Ok(()) => {
                    return ConnectionCheck {
                        success: true,
                        connected: true,
                        error: None,
                    }
                }
                Err(err) if err.is_terminal() => {
                    return ConnectionCheck {
                        success: false,
                        connected: true,
                        error: Some(err.to_string()),
                    }
                }
                Err(err) => {
                    connected |= err.indicates_response();
                    last_error = Some(err);
                }
            }
        }

        ConnectionCheck {
            success: false,
            connected,
            error: Some(
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no transports configured".to_string()),
            ),
        }
    }
}

fn exhausted(what: &str, responded: bool, diagnostics: Diagnostics) -> Error {
    let message = if responded {
        format!("{}: the gateway responded but no known tool or endpoint matched", what)
    } else {
        format!("{}: nothing responded on any transport", what)
    };
    Error::exhausted(message, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;
    use crate::types::DatasetSource;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Refuse,
        Missing,
        RejectAuth,
    }

    struct MockTransport {
        name: &'static str,
        source: DatasetSource,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl MockTransport {
        fn boxed(name: &'static str, source: DatasetSource, behavior: Behavior) -> (Box<dyn Transport>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let transport = MockTransport {
                name,
                source,
                behavior,
                calls: calls.clone(),
            };
            (Box::new(transport), calls)
        }

        fn outcome(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Refuse => Err(Error::TransportUnavailable("connection refused".into())),
                Behavior::Missing => Err(Error::EndpointNotFound("no such tool".into())),
                Behavior::RejectAuth => Err(Error::Authentication("bad token".into())),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn name(&self) -> &str {
            self.name
        }

        fn source(&self) -> DatasetSource {
            self.source
        }

        async fn fetch(&self, _spec: &DatasetSpec, _diagnostics: &mut Diagnostics) -> Result<Vec<Value>> {
            self.outcome().map(|_| vec![json!({"id": self.name})])
        }

        async fn create_agent(
            &self,
            request: &CreateAgentRequest,
            _diagnostics: &mut Diagnostics,
        ) -> Result<Option<String>> {
            self.outcome().map(|_| Some(request.name.clone()))
        }

        async fn ping(&self, _diagnostics: &mut Diagnostics) -> Result<()> {
            self.outcome()
        }
    }

    #[tokio::test]
    async fn test_socket_auth_failure_skips_http_and_cli() {
        let (socket, socket_calls) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::RejectAuth);
        let (http, http_calls) = MockTransport::boxed("http tools", DatasetSource::Tool, Behavior::Succeed);
        let (cli, cli_calls) = MockTransport::boxed("cli", DatasetSource::Cli, Behavior::Succeed);
        let bridge = Bridge::with_transports(vec![socket, http, cli]);

        let result = bridge.probe_agents().await;
        assert!(!result.success);
        assert_eq!(result.source, DatasetSource::None);
        assert_eq!(socket_calls.load(Ordering::SeqCst), 1);
        assert_eq!(http_calls.load(Ordering::SeqCst), 0);
        assert_eq!(cli_calls.load(Ordering::SeqCst), 0);
        assert!(result.error_details.unwrap().contains("Authentication"));
    }

    #[tokio::test]
    async fn test_falls_through_to_first_working_stage() {
        let (socket, _) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::Refuse);
        let (rest, _) = MockTransport::boxed("http rest", DatasetSource::Http, Behavior::Succeed);
        let (cli, cli_calls) = MockTransport::boxed("cli", DatasetSource::Cli, Behavior::Succeed);
        let bridge = Bridge::with_transports(vec![socket, rest, cli]);

        let result = bridge.probe_agents().await;
        assert!(result.success);
        assert_eq!(result.source, DatasetSource::Http);
        assert_eq!(result.count, 1);
        assert_eq!(cli_calls.load(Ordering::SeqCst), 0);
        assert!(result.diagnostics.mentions("socket: agents unavailable"));
    }

    #[tokio::test]
    async fn test_exhaustion_messages_distinguish_silence() {
        let (a, _) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::Refuse);
        let (b, _) = MockTransport::boxed("cli", DatasetSource::Cli, Behavior::Refuse);
        let silent = Bridge::with_transports(vec![a, b]).probe_agents().await;
        assert!(silent.error_details.unwrap().contains("nothing responded"));

        let (a, _) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::Refuse);
        let (b, _) = MockTransport::boxed("http tools", DatasetSource::Tool, Behavior::Missing);
        let answered = Bridge::with_transports(vec![a, b]).probe_agents().await;
        assert!(answered.error_details.unwrap().contains("no known tool or endpoint matched"));
    }

    #[tokio::test]
    async fn test_create_agent_and_check_connection() {
        let (a, _) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::Missing);
        let (b, _) = MockTransport::boxed("cli", DatasetSource::Cli, Behavior::Succeed);
        let bridge = Bridge::with_transports(vec![a, b]);

        let created = bridge.create_agent(&CreateAgentRequest::new("scout")).await;
        assert!(created.created);
        assert_eq!(created.agent_id.as_deref(), Some("scout"));

        let check = bridge.check_connection().await;
        assert_eq!(
            check,
            ConnectionCheck {
                success: true,
                connected: true,
                error: None
            }
        );

        let (a, _) = MockTransport::boxed("socket", DatasetSource::Tool, Behavior::RejectAuth);
        let check = Bridge::with_transports(vec![a]).check_connection().await;
        assert!(!check.success && check.connected);

        let blank = bridge.create_agent(&CreateAgentRequest::new("  ")).await;
        assert!(!blank.created);
    }

    #[tokio::test]
    async fn test_refused_socket_slow_http_missing_cli() {
        // Socket: a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let socket_conn = ConnectionConfig::new(dead, "tok").with_timeout(Duration::from_secs(2));

        // HTTP: answers far slower than the client timeout
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let http_conn = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_millis(200));
        let tools = ToolsClient::new(&http_conn).unwrap();

        // CLI: binary that does not exist, no wrappers
        let cli = CliAdapter::new(CliConfig {
            binary: "clawbridge-test-binary-that-does-not-exist".to_string(),
            fallback_wrappers: false,
            ..CliConfig::default()
        });

        let bridge = Bridge::with_transports(vec![
            Box::new(SocketTransport::new(GatewayClient::new(socket_conn))),
            Box::new(ToolTransport::new(tools.clone())),
            Box::new(RestTransport::new(tools)),
            Box::new(CliTransport::new(cli)),
        ]);

        let result = bridge.probe_agents().await;
        assert!(!result.success);
        assert_eq!(result.source, DatasetSource::None);
        assert_eq!(result.count, 0);
        assert!(result.items.is_empty());
        for stage in ["socket:", "http tools:", "http rest:", "cli:"] {
            assert!(result.diagnostics.mentions(stage), "missing {} in {}", stage, result.diagnostics);
        }
        assert!(result.error_details.unwrap().contains("nothing responded"));
    }

    #[test]
    fn test_standard_stage_order() {
        let conn = ConnectionConfig::new("http://127.0.0.1:1", "t");
        let bridge = Bridge::new(&conn, Some(CliAdapter::new(CliConfig::default()))).unwrap();
        assert_eq!(bridge.stage_names(), vec!["socket", "http tools", "http rest", "cli"]);

        let disabled = CliAdapter::new(CliConfig {
            enabled: false,
            ..CliConfig::default()
        });
        let bridge = Bridge::new(&conn, Some(disabled)).unwrap();
        assert_eq!(bridge.stage_names().len(), 3);
    }
}
