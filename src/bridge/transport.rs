//! Transport trait - one fallback stage of the bridge
//!
//! Each stage wraps one access method (socket, HTTP tools, REST, CLI) behind
//! the same three operations so the orchestrator never branches on which
//! method it is talking to.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};

use crate::cli::CliAdapter;
use crate::dataset::DatasetSpec;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::fallback::first_success;
use crate::gateway::GatewayClient;
use crate::http::aggregate::STATUS_TOOLS;
use crate::http::{extract_dataset_with, looks_like_dataset, ToolsClient};
use crate::types::{extract_agent_id, CreateAgentRequest, DatasetSource};

/// Method/tool names tried for agent creation
pub const CREATE_AGENT_TOOLS: &[&str] = &["agents.create", "agents_create", "agents.add", "agent.create"];

/// REST paths tried for agent creation
pub const CREATE_AGENT_PATHS: &[&str] = &["/api/agents", "/agents"];

/// REST paths tried for a liveness check
pub const STATUS_PATHS: &[&str] = &["/api/status", "/status"];

/// One fallback stage
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short stage name used in diagnostics
    fn name(&self) -> &str;

    /// Reported as `DatasetResult.source` when this stage wins
    fn source(&self) -> DatasetSource;

    /// Fetch one dataset as a list
    async fn fetch(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Vec<Value>>;

    /// Create an agent; returns its id when the response carried one
    async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        let _ = (request, diagnostics);
        Err(Error::EndpointNotFound(format!("{} cannot create agents", self.name())))
    }

    /// Authenticated round trip proving the stage works
    async fn ping(&self, diagnostics: &mut Diagnostics) -> Result<()>;
}

/// Turn a successful payload into items; a payload with no recognisable list
/// is malformed so the next stage gets a turn
pub fn items_from(stage: &str, spec: &DatasetSpec, payload: &Value) -> Result<Vec<Value>> {
    let preferred = spec.preferred_key.as_deref();
    if looks_like_dataset(payload, preferred) {
        Ok(extract_dataset_with(payload, preferred))
    } else {
        Err(Error::MalformedResponse(format!(
            "{} answered but returned no {} list",
            stage, spec.name
        )))
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Socket tool calls
pub struct SocketTransport {
    client: GatewayClient,
}

impl SocketTransport {
    pub fn new(client: GatewayClient) -> Self {
        SocketTransport { client }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn name(&self) -> &str {
        "socket"
    }

    fn source(&self) -> DatasetSource {
        DatasetSource::Tool
    }

    async fn fetch(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Vec<Value>> {
        let (_, payload) = self.client.call_any_once(&spec.tools, &spec.args, diagnostics).await?;
        items_from(self.name(), spec, &payload)
    }

    async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        let (_, payload) = self
            .client
            .call_any_once(CREATE_AGENT_TOOLS, &request.to_args(), diagnostics)
            .await?;
        Ok(extract_agent_id(&payload))
    }

    async fn ping(&self, diagnostics: &mut Diagnostics) -> Result<()> {
        self.client.call_any_once(STATUS_TOOLS, &json!({}), diagnostics).await?;
        Ok(())
    }
}

/// `POST /tools/invoke`
pub struct ToolTransport {
    client: ToolsClient,
}

impl ToolTransport {
    pub fn new(client: ToolsClient) -> Self {
        ToolTransport { client }
    }
}

#[async_trait]
impl Transport for ToolTransport {
    fn name(&self) -> &str {
        "http tools"
    }

    fn source(&self) -> DatasetSource {
        DatasetSource::Tool
    }

    async fn fetch(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Vec<Value>> {
        let (_, payload) = self.client.invoke_tool_any(&spec.tools, &spec.args, diagnostics).await?;
        items_from(self.name(), spec, &payload)
    }

    async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        let (_, payload) = self
            .client
            .invoke_tool_any(CREATE_AGENT_TOOLS, &request.to_args(), diagnostics)
            .await?;
        Ok(extract_agent_id(&payload))
    }

    async fn ping(&self, diagnostics: &mut Diagnostics) -> Result<()> {
        self.client.invoke_tool_any(STATUS_TOOLS, &json!({}), diagnostics).await?;
        Ok(())
    }
}

/// Legacy REST paths
pub struct RestTransport {
    client: ToolsClient,
}

impl RestTransport {
    pub fn new(client: ToolsClient) -> Self {
        RestTransport { client }
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn name(&self) -> &str {
        "http rest"
    }

    fn source(&self) -> DatasetSource {
        DatasetSource::Http
    }

    async fn fetch(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Vec<Value>> {
        let client = &self.client;
        let paths = spec.rest_paths.clone();
        let (_, payload) = first_success("rest", paths, diagnostics, |path| {
            async move { client.get_json(&path).await }.boxed()
        })
        .await?;
        items_from(self.name(), spec, &payload)
    }

    async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        let client = &self.client;
        let body = request.to_args();
        let body = &body;
        let paths = owned(CREATE_AGENT_PATHS);
        let (_, payload) = first_success("rest", paths, diagnostics, |path| {
            async move { client.post_json(&path, body).await }.boxed()
        })
        .await?;
        Ok(extract_agent_id(&payload))
    }

    async fn ping(&self, diagnostics: &mut Diagnostics) -> Result<()> {
        let client = &self.client;
        let paths = owned(STATUS_PATHS);
        first_success("rest", paths, diagnostics, |path| {
            async move { client.get_json(&path).await }.boxed()
        })
        .await?;
        Ok(())
    }
}

/// Local binary
pub struct CliTransport {
    adapter: CliAdapter,
}

impl CliTransport {
    pub fn new(adapter: CliAdapter) -> Self {
        CliTransport { adapter }
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn name(&self) -> &str {
        "cli"
    }

    fn source(&self) -> DatasetSource {
        DatasetSource::Cli
    }

    async fn fetch(&self, spec: &DatasetSpec, diagnostics: &mut Diagnostics) -> Result<Vec<Value>> {
        let payload = self.adapter.fetch_dataset(spec, diagnostics).await?;
        items_from(self.name(), spec, &payload)
    }

    async fn create_agent(
        &self,
        request: &CreateAgentRequest,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<String>> {
        self.adapter.create_agent(request, diagnostics).await
    }

    async fn ping(&self, diagnostics: &mut Diagnostics) -> Result<()> {
        self.adapter.gateway_status(diagnostics).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::dataset::DatasetKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rest(server: &MockServer) -> Box<dyn Transport> {
        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(2));
        Box::new(RestTransport::new(ToolsClient::new(&config).unwrap()))
    }

    #[test]
    fn test_items_from_accepts_empty_list() {
        let spec = DatasetKind::Agents.spec();
        assert!(items_from("x", &spec, &json!({"agents": []})).unwrap().is_empty());
        assert_eq!(items_from("x", &spec, &json!([{"id": 1}])).unwrap().len(), 1);
    }

    #[test]
    fn test_items_from_rejects_non_list() {
        let spec = DatasetKind::Agents.spec();
        let err = items_from("http tools", &spec, &json!({"version": "1.0"})).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(err.indicates_response());
    }

    #[tokio::test]
    async fn test_rest_create_agent_falls_back_to_second_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent": {"id": "ops"}})))
            .mount(&server)
            .await;

        let transport = rest(&server);
        let mut diags = Diagnostics::new();
        let id = transport
            .create_agent(&CreateAgentRequest::new("ops"), &mut diags)
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("ops"));
        assert!(diags.mentions("rest: /api/agents failed"));
        assert!(diags.mentions("rest: /agents succeeded"));
    }

    #[tokio::test]
    async fn test_rest_fetch_and_ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agents": [{"id": "main"}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let transport = rest(&server);
        let mut diags = Diagnostics::new();
        let items = transport.fetch(&DatasetKind::Agents.spec(), &mut diags).await.unwrap();
        assert_eq!(items, vec![json!({"id": "main"})]);

        transport.ping(&mut diags).await.unwrap();
        assert!(diags.mentions("rest: /api/status failed"));
    }
}
