//! Diagnostic runner
//!
//! Narrates a connection attempt step by step for troubleshooting: socket
//! open, every frame received, handshake sent, outcome, then a `status`
//! call. A plain HTTP probe runs alongside. Both share one hard deadline, and
//! whatever was traced before the deadline is kept.

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConnectionConfig, DiagnosticsConfig};
use crate::error::{is_origin_rejection, Error, Result};
use crate::gateway::{AuthAction, AuthMachine, ConnectParams, Frame, RequestFrame, ORIGIN_HINT};
use crate::gateway::protocol::CONNECT_METHOD;
use crate::http::ToolsClient;

/// Outcome of one probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub success: bool,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full diagnostic run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// Correlates the report with log lines
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub http_url: String,
    pub ws_url: String,
    pub socket: StageReport,
    pub http: StageReport,
    /// The overall deadline cut the run short
    pub timed_out: bool,
}

impl DiagnosticReport {
    pub fn success(&self) -> bool {
        self.socket.success || self.http.success
    }

    /// Both traces, socket first
    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.socket.steps.iter().chain(self.http.steps.iter())
    }
}

/// Trace with elapsed-millisecond prefixes
struct Trace {
    label: &'static str,
    started: Instant,
    max_excerpt: usize,
    report: StageReport,
}

impl Trace {
    fn new(label: &'static str, started: Instant, max_excerpt: usize) -> Self {
        Trace {
            label,
            started,
            max_excerpt,
            report: StageReport::default(),
        }
    }

    fn step(&mut self, message: impl AsRef<str>) {
        let line = format!(
            "[+{:>5}ms] {}: {}",
            self.started.elapsed().as_millis(),
            self.label,
            message.as_ref()
        );
        debug!(target: "clawbridge::diagnose", "{}", line);
        self.report.steps.push(line);
    }

    fn excerpt(&self, text: &str) -> String {
        let mut out: String = text.chars().take(self.max_excerpt).collect();
        if text.chars().count() > self.max_excerpt {
            out.push_str("...");
        }
        out
    }

    fn succeed(&mut self, message: impl AsRef<str>) {
        self.step(message);
        self.report.success = true;
    }

    fn fail(&mut self, error: &Error) {
        self.step(format!("failed: {}", error));
        if is_origin_rejection(&error.to_string()) {
            self.step(ORIGIN_HINT);
        }
        self.report.error = Some(error.to_string());
    }
}

/// Run both probes under `settings.timeout`
pub async fn run_diagnostics(config: &ConnectionConfig, settings: &DiagnosticsConfig) -> DiagnosticReport {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let started = Instant::now();
    let mut socket = Trace::new("socket", started, settings.max_excerpt_chars);
    let mut http = Trace::new("http", started, settings.max_excerpt_chars);

    info!(%run_id, "Running gateway diagnostics against {}", config.http_base());

    let probes = async {
        tokio::join!(socket_probe(config, &mut socket), http_probe(config, &mut http));
    };
    let timed_out = tokio::time::timeout(settings.timeout, probes).await.is_err();

    for trace in [&mut socket, &mut http] {
        if timed_out && !trace.report.success && trace.report.error.is_none() {
            let err = Error::Timeout(format!("diagnostics stopped after {:?}", settings.timeout));
            trace.fail(&err);
        }
    }

    DiagnosticReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        http_url: config.http_base(),
        ws_url: config.ws_url(),
        socket: socket.report,
        http: http.report,
        timed_out,
    }
}

async fn socket_probe(config: &ConnectionConfig, trace: &mut Trace) {
    if let Err(err) = socket_steps(config, trace).await {
        trace.fail(&err);
    }
}

async fn socket_steps(config: &ConnectionConfig, trace: &mut Trace) -> Result<()> {
    let url = config.ws_url();
    trace.step(format!("opening {}", url));

    let mut request = url.as_str().into_client_request()?;
    if let Ok(origin) = HeaderValue::from_str(&config.http_base()) {
        request.headers_mut().insert("Origin", origin);
    }

    let (mut ws, response) = tokio::time::timeout(config.timeout, tokio_tungstenite::connect_async(request))
        .await
        .map_err(|_| Error::Timeout(format!("upgrade did not finish within {:?}", config.timeout)))??;
    trace.step(format!("opened (HTTP {})", response.status().as_u16()));

    let connect_params = serde_json::to_value(ConnectParams::operator(config))?;
    let mut machine = AuthMachine::new();
    machine.opened();
    let mut next_id: u64 = 1;
    let mut status_id: Option<String> = None;

    let grace = tokio::time::sleep(crate::gateway::DEFAULT_CHALLENGE_GRACE);
    tokio::pin!(grace);
    let mut grace_armed = true;

    loop {
        let action = tokio::select! {
            _ = &mut grace, if grace_armed => {
                grace_armed = false;
                let action = machine.grace_expired();
                if matches!(action, AuthAction::SendConnect) {
                    trace.step("no challenge received, connecting unprompted");
                }
                action
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    trace.step(format!("received {}", trace.excerpt(&text)));
                    let frame = match Frame::parse(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            trace.step(format!("ignored: {}", e));
                            continue;
                        }
                    };
                    if let Some(ref id) = status_id {
                        if frame.id_str().as_deref() == Some(id.as_str()) {
                            let _ = ws.close(None).await;
                            if frame.is_failure() {
                                return Err(frame.rejection());
                            }
                            let body = frame.into_body();
                            trace.succeed(format!("status answered: {}", trace.excerpt(&summarize(&body))));
                            return Ok(());
                        }
                    }
                    machine.on_frame(&frame)
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| {
                        let reason: &str = &f.reason;
                        reason.to_string()
                    });
                    trace.step(format!("closed by gateway ({})", reason.as_deref().unwrap_or("no reason")));
                    match machine.on_closed(reason.as_deref()) {
                        AuthAction::Failed(err) => return Err(err),
                        _ => return Err(Error::TransportUnavailable("socket closed before status answered".into())),
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::from(e)),
                None => return Err(Error::TransportUnavailable("socket ended".to_string())),
            },
        };

        match action {
            AuthAction::None => {}
            AuthAction::SendConnect => {
                let id = next_id.to_string();
                next_id += 1;
                let text = RequestFrame::new(id.clone(), CONNECT_METHOD, &connect_params).to_text()?;
                machine.bind_connect_id(id.clone());
                ws.send(Message::Text(text.into())).await?;
                trace.step(format!("sent connect (id {})", id));
            }
            AuthAction::Authenticated => {
                trace.step("authenticated");
                let id = next_id.to_string();
                next_id += 1;
                let params = json!({});
                let text = RequestFrame::new(id.clone(), "status", &params).to_text()?;
                ws.send(Message::Text(text.into())).await?;
                trace.step(format!("sent status (id {})", id));
                status_id = Some(id);
            }
            AuthAction::Failed(err) => {
                let _ = ws.close(None).await;
                return Err(err);
            }
        }
    }
}

async fn http_probe(config: &ConnectionConfig, trace: &mut Trace) {
    if let Err(err) = http_steps(config, trace).await {
        trace.fail(&err);
    }
}

async fn http_steps(config: &ConnectionConfig, trace: &mut Trace) -> Result<()> {
    let client = ToolsClient::new(config)?;
    trace.step(format!("GET {}/", client.base_url()));

    match client.get_public("/").await {
        Ok(response) => trace.step(format!(
            "/ answered HTTP {} ({})",
            response.status,
            response.content_type.as_deref().unwrap_or("no content type")
        )),
        Err(e) => {
            trace.step(format!("/ failed: {}", e));
            if matches!(e, Error::TransportUnavailable(_) | Error::Timeout(_)) {
                return Err(e);
            }
        }
    }

    trace.step("POST /tools/invoke status");
    let value = client.invoke_tool("status", &json!({})).await?;
    trace.succeed(format!("status answered: {}", trace.excerpt(&summarize(&value))));
    Ok(())
}

fn summarize(value: &Value) -> String {
    match value.get("version").and_then(Value::as_str) {
        Some(version) => format!("version {}", version),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(timeout: Duration) -> DiagnosticsConfig {
        DiagnosticsConfig {
            timeout,
            ..DiagnosticsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_http_probe_success_socket_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tools/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"version": "1.0.0"}})))
            .mount(&server)
            .await;

        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(2));
        let report = run_diagnostics(&config, &settings(Duration::from_secs(5))).await;

        assert!(report.http.success);
        assert!(!report.socket.success);
        assert!(report.socket.error.is_some());
        assert!(report.success());
        assert!(report.http.steps.iter().any(|l| l.contains("version 1.0.0")));
        assert!(report.lines().all(|l| l.starts_with("[+")));
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_hard_timeout_terminates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let config = ConnectionConfig::new(server.uri(), "tok").with_timeout(Duration::from_secs(30));
        let started = std::time::Instant::now();
        let report = run_diagnostics(&config, &settings(Duration::from_millis(300))).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.timed_out);
        assert!(!report.success());
        assert!(report.http.error.as_deref().unwrap_or_default().contains("Timeout"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let trace = Trace::new("socket", Instant::now(), 5);
        assert_eq!(trace.excerpt("abcdefgh"), "abcde...");
        assert_eq!(trace.excerpt("abc"), "abc");
    }
}
