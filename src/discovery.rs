//! Discovery orchestrator
//!
//! Assembles a [`GatewayInfo`] from whatever the gateway is willing to say.
//! Stages, in order:
//!
//! 1. HTTP aggregate (status, agents, channels, config over `/tools/invoke`)
//! 2. Socket: the same four queries over one authenticated session
//! 3. HTTP aggregate once more
//! 4. Unauthenticated probe of a few public paths, scraping a version from
//!    HTML when no JSON is served
//!
//! The first stage yielding usable data wins; a stage that answers without
//! anything recognizable counts as failed. An authentication failure skips
//! stages 2 and 3 but still runs the public probe. Discovery never fails: the
//! result always comes back, with `error` set when nothing was learned.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::gateway::{GatewayClient, GatewaySession, DEFAULT_CHALLENGE_GRACE};
use crate::http::aggregate::{AGENT_TOOLS, CHANNEL_TOOLS, CONFIG_TOOLS, STATUS_TOOLS};
use crate::http::{aggregate_discovery, extract_dataset_with, ToolsClient};
use crate::types::{GatewayInfo, UNKNOWN_VERSION};

/// Paths probed without credentials as a last resort
pub const PUBLIC_PROBE_PATHS: &[&str] = &["/", "/api/status", "/api/config", "/api/agents", "/api/channels"];

/// Discover what a gateway is and what it runs
pub async fn discover(config: &ConnectionConfig) -> GatewayInfo {
    Discovery::new(config.clone()).run().await
}

/// Configurable discovery run
#[derive(Debug, Clone)]
pub struct Discovery {
    config: ConnectionConfig,
    challenge_grace: Duration,
}

impl Discovery {
    pub fn new(config: ConnectionConfig) -> Self {
        Discovery {
            config,
            challenge_grace: DEFAULT_CHALLENGE_GRACE,
        }
    }

    pub fn with_challenge_grace(mut self, grace: Duration) -> Self {
        self.challenge_grace = grace;
        self
    }

    pub async fn run(&self) -> GatewayInfo {
        let mut diagnostics = Diagnostics::new();
        let mut failures: Vec<String> = Vec::new();
        let mut auth_error: Option<Error> = None;
        let mut partial: Option<GatewayInfo> = None;

        let tools = match ToolsClient::new(&self.config) {
            Ok(client) => Some(client),
            Err(e) => {
                diagnostics.push(format!("http: client unavailable: {}", e));
                None
            }
        };

        if let Some(ref tools) = tools {
            diagnostics.push(format!("discovery: HTTP aggregate against {}", tools.base_url()));
            match aggregate_discovery(tools, &mut diagnostics).await {
                Ok(info) if info.has_signal() => return finish(info, diagnostics, None),
                Ok(info) => partial = Some(hollow(info, "http", &mut failures, &mut diagnostics)),
                Err(e) => record(&mut failures, &mut auth_error, "http", e),
            }
        }

        if auth_error.is_none() {
            diagnostics.push("discovery: trying the socket".to_string());
            match self.socket_discovery(&mut diagnostics).await {
                Ok(info) if info.has_signal() => return finish(info, diagnostics, None),
                Ok(info) => partial = Some(hollow(info, "socket", &mut failures, &mut diagnostics)),
                Err(e) => record(&mut failures, &mut auth_error, "socket", e),
            }
        }

        if auth_error.is_none() {
            if let Some(ref tools) = tools {
                diagnostics.push("discovery: retrying HTTP aggregate".to_string());
                match aggregate_discovery(tools, &mut diagnostics).await {
                    Ok(info) if info.has_signal() => return finish(info, diagnostics, None),
                    Ok(info) => partial = Some(hollow(info, "http retry", &mut failures, &mut diagnostics)),
                    Err(e) => record(&mut failures, &mut auth_error, "http retry", e),
                }
            }
        } else {
            diagnostics.push("discovery: credentials rejected, skipping authenticated stages".to_string());
        }

        let mut info = partial.unwrap_or_default();
        if let Some(ref tools) = tools {
            diagnostics.push("discovery: probing public endpoints".to_string());
            probe_public(tools, &mut info, &mut diagnostics).await;
        }

        let error = auth_error.map(|e| e.to_string()).or_else(|| {
            if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            }
        });
        finish(info, diagnostics, error)
    }

    /// The four aggregate queries over one socket session
    async fn socket_discovery(&self, diagnostics: &mut Diagnostics) -> Result<GatewayInfo> {
        let client = GatewayClient::new(self.config.clone()).with_challenge_grace(self.challenge_grace);
        let session = client.connect(diagnostics).await?;
        let mut info = GatewayInfo::default();
        let outcome = socket_queries(&session, &mut info, diagnostics).await;
        session.close().await;
        outcome?;

        if info.has_signal() {
            Ok(info)
        } else {
            Err(Error::Gateway("socket authenticated but no query returned data".to_string()))
        }
    }
}

async fn socket_queries(session: &GatewaySession, info: &mut GatewayInfo, diagnostics: &mut Diagnostics) -> Result<()> {
    let params = json!({});
    if let Some(status) = soft(session.call_any(STATUS_TOOLS, &params, diagnostics).await)? {
        info.merge_status(&status);
    }
    if let Some(agents) = soft(session.call_any(AGENT_TOOLS, &params, diagnostics).await)? {
        info.merge_agents(extract_dataset_with(&agents, Some("agents")));
    }
    if let Some(channels) = soft(session.call_any(CHANNEL_TOOLS, &params, diagnostics).await)? {
        info.merge_channels(extract_dataset_with(&channels, Some("channels")));
    }
    if let Some(config) = soft(session.call_any(CONFIG_TOOLS, &params, diagnostics).await)? {
        info.merge_config(config);
    }
    Ok(())
}

/// Swallow per-query failures except authentication
fn soft(result: Result<(String, Value)>) -> Result<Option<Value>> {
    match result {
        Ok((_, value)) => Ok(Some(value)),
        Err(e) if e.is_terminal() => Err(e),
        Err(_) => Ok(None),
    }
}

fn record(failures: &mut Vec<String>, auth_error: &mut Option<Error>, stage: &str, err: Error) {
    debug!("discovery stage {} failed: {}", stage, err);
    failures.push(format!("{}: {}", stage, err));
    if err.is_auth_failure() && auth_error.is_none() {
        *auth_error = Some(err);
    }
}

/// A stage that answered but produced nothing usable
fn hollow(info: GatewayInfo, stage: &str, failures: &mut Vec<String>, diagnostics: &mut Diagnostics) -> GatewayInfo {
    diagnostics.push(format!("discovery: {} answered without usable data", stage));
    failures.push(format!("{}: responded but returned nothing usable", stage));
    info
}

fn finish(mut info: GatewayInfo, diagnostics: Diagnostics, error: Option<String>) -> GatewayInfo {
    if info.has_signal() {
        info!("Discovered gateway version {}", info.version);
        info.error = None;
    } else {
        let error = error.unwrap_or_else(|| "gateway unreachable: no transport produced data".to_string());
        warn!("Discovery found nothing: {}", error);
        info.error = Some(error);
    }
    info.diagnostics = diagnostics;
    info
}

/// Walk the public paths, folding in whatever they reveal
async fn probe_public(tools: &ToolsClient, info: &mut GatewayInfo, diagnostics: &mut Diagnostics) {
    for path in PUBLIC_PROBE_PATHS {
        let response = match tools.get_public(path).await {
            Ok(response) => response,
            Err(e) => {
                diagnostics.push(format!("public {}: {}", path, e));
                if matches!(e, Error::TransportUnavailable(_) | Error::Timeout(_)) {
                    // Host unreachable; the remaining paths will fail the same way
                    break;
                }
                continue;
            }
        };

        if !response.is_success() {
            diagnostics.push(format!("public {}: HTTP {}", path, response.status));
            continue;
        }

        match response.json() {
            Some(json) => {
                diagnostics.push(format!("public {}: JSON", path));
                match *path {
                    "/api/agents" => info.merge_agents(extract_dataset_with(&json, Some("agents"))),
                    "/api/channels" => info.merge_channels(extract_dataset_with(&json, Some("channels"))),
                    "/api/config" => info.merge_config(json),
                    _ => info.merge_status(&json),
                }
            }
            None => match scrape_version(&response.body) {
                Some(version) if info.version == UNKNOWN_VERSION => {
                    diagnostics.push(format!("public {}: version {} found in page", path, version));
                    info.version = version;
                }
                _ => diagnostics.push(format!("public {}: no JSON and no version", path)),
            },
        }
    }
}

fn version_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#""version"\s*:\s*"([^"]+)""#,
            r#"(?i)<meta[^>]+name=["'](?:version|app-version|generator)["'][^>]+content=["'][^"'\d]*v?(\d+\.\d+[^"']*)["']"#,
            r#"(?i)data-version=["']v?([^"']+)["']"#,
            r#"(?i)\bversion[:\s]+v?(\d+\.\d+(?:\.\d+)?(?:[-.][0-9A-Za-z]+)*)"#,
            r#"\bv(\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)\b"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Pull a version string out of an HTML or text body
pub fn scrape_version(body: &str) -> Option<String> {
    version_patterns().iter().find_map(|re| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn position(info: &GatewayInfo, needle: &str) -> usize {
        info.diagnostics
            .lines()
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("no diagnostic mentions {:?}: {}", needle, info.diagnostics))
    }

    /// Socket gateway that answers `status` and `agents.list`; any plain
    /// HTTP request fails the upgrade and is dropped.
    async fn socket_gateway() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    let challenge = json!({"type": "event", "event": "connect.challenge", "payload": {"nonce": "n"}});
                    let _ = ws.send(Message::Text(challenge.to_string().into())).await;
                    while let Some(Ok(message)) = ws.next().await {
                        let text = match message {
                            Message::Text(text) => text,
                            Message::Close(_) => break,
                            _ => continue,
                        };
                        let request: Value = serde_json::from_str(&text).unwrap();
                        let id = request["id"].clone();
                        let reply = match request["method"].as_str().unwrap_or_default() {
                            "connect" => json!({"type": "res", "id": id, "ok": true, "payload": {}}),
                            "status" => json!({"type": "res", "id": id, "ok": true, "payload": {"version": "5.1.0"}}),
                            "agents.list" => {
                                json!({"type": "res", "id": id, "ok": true, "payload": {"agents": [{"id": "main"}]}})
                            }
                            other => json!({
                                "type": "res",
                                "id": id,
                                "ok": false,
                                "error": {"message": format!("unknown method: {}", other)}
                            }),
                        };
                        let _ = ws.send(Message::Text(reply.to_string().into())).await;
                    }
                });
            }
        });
        addr
    }

    #[test]
    fn test_scrape_version() {
        assert_eq!(scrape_version(r#"<script>window.__APP__={"version":"2026.1.5"}</script>"#).as_deref(), Some("2026.1.5"));
        assert_eq!(scrape_version(r#"<meta name="version" content="1.2.3">"#).as_deref(), Some("1.2.3"));
        assert_eq!(scrape_version("<footer>Gateway v0.9.1</footer>").as_deref(), Some("0.9.1"));
        assert_eq!(scrape_version("<html><body>hello</body></html>"), None);
    }

    #[tokio::test]
    async fn test_everything_failing_returns_unknown_with_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ConnectionConfig::new(format!("http://{}", addr), "tok").with_timeout(Duration::from_secs(1));
        let info = Discovery::new(config)
            .with_challenge_grace(Duration::from_millis(50))
            .run()
            .await;

        assert_eq!(info.version, "unknown");
        assert!(info.error.as_deref().map_or(false, |e| !e.is_empty()));
        assert!(info.diagnostics.mentions("socket"));
        assert!(info.diagnostics.mentions("public /"));
    }

    #[tokio::test]
    async fn test_http_aggregate_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"version": "4.0.0", "agents": [{"id": "main"}]}
            })))
            .mount(&server)
            .await;

        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(2));
        let info = discover(&config).await;
        assert_eq!(info.version, "4.0.0");
        assert!(info.error.is_none());
        assert!(!info.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_still_probes_public_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><meta name=\"version\" content=\"3.1.4\"></html>"),
            )
            .mount(&server)
            .await;

        let config = ConnectionConfig::new(server.uri(), "wrong").with_timeout(Duration::from_secs(2));
        let info = discover(&config).await;
        assert_eq!(info.version, "3.1.4");
        assert!(info.diagnostics.mentions("skipping authenticated stages"));
        // No socket attempt after the credential was rejected
        assert!(!info.diagnostics.mentions("socket: connecting"));
    }

    #[tokio::test]
    async fn test_status_without_recognizable_fields_falls_through_to_public_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .and(body_partial_json(json!({"tool": "status"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"state": "running"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<footer>Gateway v2.5.0</footer>"))
            .mount(&server)
            .await;

        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(2));
        let info = Discovery::new(config)
            .with_challenge_grace(Duration::from_millis(50))
            .run()
            .await;

        assert_eq!(info.version, "2.5.0");
        assert!(info.error.is_none());
        assert!(info.diagnostics.mentions("http answered without usable data"));
        assert!(info.diagnostics.mentions("socket: connecting"));
        assert!(position(&info, "discovery: trying the socket") < position(&info, "discovery: probing public endpoints"));
    }

    #[tokio::test]
    async fn test_stages_run_in_order_when_each_fails() {
        let server = MockServer::start().await;

        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(2));
        let info = Discovery::new(config)
            .with_challenge_grace(Duration::from_millis(50))
            .run()
            .await;

        let http = position(&info, "discovery: HTTP aggregate");
        let socket = position(&info, "discovery: trying the socket");
        let retry = position(&info, "discovery: retrying HTTP aggregate");
        let public = position(&info, "discovery: probing public endpoints");
        assert!(http < socket);
        assert!(socket < retry);
        assert!(retry < public);

        assert_eq!(info.version, "unknown");
        let error = info.error.unwrap();
        assert!(error.contains("socket"));
        assert!(error.contains("http retry"));
    }

    #[tokio::test]
    async fn test_socket_answers_when_http_aggregate_fails() {
        let addr = socket_gateway().await;

        let config = ConnectionConfig::new(format!("http://{}", addr), "tok").with_timeout(Duration::from_secs(3));
        let info = Discovery::new(config)
            .with_challenge_grace(Duration::from_millis(50))
            .run()
            .await;

        assert_eq!(info.version, "5.1.0");
        assert_eq!(info.agents.len(), 1);
        assert!(info.error.is_none());

        assert!(position(&info, "discovery: HTTP aggregate") < position(&info, "discovery: trying the socket"));
        assert!(info.diagnostics.mentions("authenticated"));
        assert!(!info.diagnostics.mentions("discovery: retrying HTTP aggregate"));
        assert!(!info.diagnostics.mentions("discovery: probing public endpoints"));
    }
}
