//! HTTP tool client
//!
//! Stateless calls against `POST {base}/tools/invoke` plus the legacy REST
//! paths some gateways still expose.

use futures::FutureExt;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::extract::unwrap_tool_result;
use crate::config::ConnectionConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{is_policy_message, Error, Result};
use crate::fallback::first_success;

/// Longest body excerpt kept in an error message
const MAX_ERROR_BODY: usize = 300;

/// Body of a `/tools/invoke` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation<'a> {
    pub tool: &'a str,
    pub action: &'a str,
    pub args: &'a Value,
    pub session_key: &'a str,
    pub dry_run: bool,
}

/// A plain HTTP response that did not have to be JSON
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(self.body.trim()).ok()
    }
}

/// HTTP client for one gateway
#[derive(Clone)]
pub struct ToolsClient {
    client: Client,
    base_url: String,
    token: SecretString,
    session_key: String,
}

impl ToolsClient {
    /// Create a client from a connection config; the request timeout is the
    /// connection-level timeout
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(concat!("clawbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ToolsClient {
            client,
            base_url: config.http_base(),
            token: config.token.clone(),
            session_key: config.session_key.clone(),
        })
    }

    /// Base URL every path is joined to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self.token.expose_secret();
        if token.is_empty() {
            request
        } else {
            request.header(header::AUTHORIZATION, format!("Bearer {}", token))
        }
    }

    /// Invoke one tool and return the unwrapped result
    pub async fn invoke_tool(&self, tool: &str, args: &Value) -> Result<Value> {
        self.invoke_tool_with(tool, args, false).await
    }

    /// Invoke one tool, optionally as a dry run
    pub async fn invoke_tool_with(&self, tool: &str, args: &Value, dry_run: bool) -> Result<Value> {
        let body = ToolInvocation {
            tool,
            action: "json",
            args,
            session_key: &self.session_key,
            dry_run,
        };

        debug!("POST {}/tools/invoke tool={}", self.base_url, tool);

        let response = self
            .authorized(self.client.post(self.url("/tools/invoke")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        match status {
            StatusCode::UNAUTHORIZED => Err(Error::Authentication(format!(
                "tool {} rejected with 401{}",
                tool,
                excerpt_suffix(&text)
            ))),
            StatusCode::NOT_FOUND => Err(Error::EndpointNotFound(format!("tool unavailable: {}", tool))),
            s if !s.is_success() => Err(status_error(s, &text)),
            _ => {
                let body: Value = serde_json::from_str(text.trim()).map_err(|e| {
                    Error::MalformedResponse(format!("tool {} returned non-JSON body: {}", tool, e))
                })?;
                check_ok_flag(tool, &body)?;
                Ok(unwrap_tool_result(body))
            }
        }
    }

    /// Try tool-name synonyms in order; first success or the last error
    pub async fn invoke_tool_any<S: AsRef<str>>(
        &self,
        tools: &[S],
        args: &Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(String, Value)> {
        let names: Vec<String> = tools.iter().map(|t| t.as_ref().to_string()).collect();
        first_success("http tool", names, diagnostics, |tool| {
            async move { self.invoke_tool(&tool, args).await }.boxed()
        })
        .await
    }

    /// GET a legacy REST path with the bearer token; the body must be JSON
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let raw = self.send_raw(self.authorized(self.client.get(self.url(path)))).await?;
        json_or_error(path, raw)
    }

    /// POST JSON to a legacy REST path
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let raw = self
            .send_raw(self.authorized(self.client.post(self.url(path))).json(body))
            .await?;
        json_or_error(path, raw)
    }

    /// GET a path without credentials, whatever the content type
    pub async fn get_public(&self, path: &str) -> Result<RawResponse> {
        self.send_raw(self.client.get(self.url(path))).await
    }

    async fn send_raw(&self, request: reqwest::RequestBuilder) -> Result<RawResponse> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await?;
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

fn json_or_error(path: &str, raw: RawResponse) -> Result<Value> {
    match raw.status {
        401 => Err(Error::Authentication(format!("{} rejected with 401", path))),
        404 => Err(Error::EndpointNotFound(format!("no REST endpoint at {}", path))),
        s if !(200..300).contains(&s) => Err(status_error(
            StatusCode::from_u16(s).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            &raw.body,
        )),
        _ => raw.json().ok_or_else(|| {
            let kind = raw.content_type.as_deref().unwrap_or("unknown content type");
            Error::MalformedResponse(format!("{} did not return JSON ({})", path, kind))
        }),
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    if is_policy_message(body) {
        return Error::PolicyDenied(format!("HTTP {}{}", status.as_u16(), excerpt_suffix(body)));
    }
    Error::HttpStatus {
        status: status.as_u16(),
        message: excerpt(body).unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    }
}

/// A 200 body can still say `ok:false`
fn check_ok_flag(tool: &str, body: &Value) -> Result<()> {
    if body.get("ok").and_then(Value::as_bool) != Some(false) {
        return Ok(());
    }
    let message = body
        .get("error")
        .map(|e| match e {
            Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        })
        .unwrap_or_else(|| format!("tool {} reported ok:false", tool));
    Err(Error::from_gateway_message(message))
}

fn excerpt(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_ERROR_BODY).collect())
}

fn excerpt_suffix(body: &str) -> String {
    excerpt(body).map(|e| format!(": {}", e)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ToolsClient {
        let config = ConnectionConfig::new(server.uri(), "Bearer test-token")
            .with_timeout(Duration::from_secs(2));
        ToolsClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_sends_expected_body_and_unwraps_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "tool": "agents.list",
                "action": "json",
                "sessionKey": "main",
                "dryRun": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"content": [{"type": "text", "text": "{\"agents\":[{\"id\":\"main\"}]}"}]}
            })))
            .mount(&server)
            .await;

        let value = client_for(&server).invoke_tool("agents.list", &json!({})).await.unwrap();
        assert_eq!(value, json!({"agents": [{"id": "main"}]}));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "locked"})))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "policy"})))
            .respond_with(ResponseTemplate::new(403).set_body_string("tool blocked by policy"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "broken"})))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let args = json!({});
        assert!(matches!(client.invoke_tool("locked", &args).await, Err(Error::Authentication(_))));
        assert!(matches!(client.invoke_tool("missing", &args).await, Err(Error::EndpointNotFound(_))));
        assert!(matches!(client.invoke_tool("policy", &args).await, Err(Error::PolicyDenied(_))));
        assert!(matches!(
            client.invoke_tool("broken", &args).await,
            Err(Error::HttpStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_ok_false_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": {"message": "tool not allowed for this session"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).invoke_tool("config.get", &json!({})).await.unwrap_err();
        assert!(err.is_policy_denied());
    }

    #[tokio::test]
    async fn test_invoke_any_404_then_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "agents.list"})))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "agents_list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"agents": [{"id": "a"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut diags = Diagnostics::new();
        let (tool, value) = client_for(&server)
            .invoke_tool_any(&["agents.list", "agents_list"], &json!({}), &mut diags)
            .await
            .unwrap();
        assert_eq!(tool, "agents_list");
        assert_eq!(value, json!({"agents": [{"id": "a"}]}));
        assert!(diags.mentions("agents.list failed"));
    }

    #[tokio::test]
    async fn test_invoke_any_stops_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut diags = Diagnostics::new();
        let err = client_for(&server)
            .invoke_tool_any(&["a", "b", "c"], &json!({}), &mut diags)
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_get_json_rejects_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>app</html>"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).get_json("/api/agents").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_get_public_sends_no_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let raw = client_for(&server).get_public("/").await.unwrap();
        assert!(raw.is_success());
        assert_eq!(raw.body, "hello");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }
}
