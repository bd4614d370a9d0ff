//! Socket protocol client
//!
//! One [`GatewaySession`] per logical call: connect, authenticate, issue
//! calls, drop. A writer task drains an outgoing queue; a reader task owns
//! the [`AuthMachine`] and routes responses to pending requests by id.

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::auth::{AuthAction, AuthMachine};
use super::protocol::{events, ConnectParams, Frame, FrameKind, RequestFrame, CONNECT_METHOD};
use crate::config::ConnectionConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{is_origin_rejection, Error, Result};
use crate::fallback::first_success;

/// How long to wait for `connect.challenge` before connecting unprompted
pub const DEFAULT_CHALLENGE_GRACE: Duration = Duration::from_millis(1000);

/// Diagnostic attached whenever the gateway rejects this client's origin
pub const ORIGIN_HINT: &str = "socket: the gateway rejected this client's origin; \
     use the HTTP tools endpoint (POST /tools/invoke) or add this host to the gateway's allowed origins";

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>>;
type HandshakeOutcome = std::result::Result<Diagnostics, (Error, Diagnostics)>;

enum Outgoing {
    Text(String),
    Close,
}

/// Factory for authenticated socket sessions
#[derive(Debug, Clone)]
pub struct GatewayClient {
    config: ConnectionConfig,
    challenge_grace: Duration,
}

impl GatewayClient {
    pub fn new(config: ConnectionConfig) -> Self {
        GatewayClient {
            config,
            challenge_grace: DEFAULT_CHALLENGE_GRACE,
        }
    }

    /// Override the challenge grace period
    pub fn with_challenge_grace(mut self, grace: Duration) -> Self {
        self.challenge_grace = grace;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open a socket and complete the handshake.
    ///
    /// The upgrade and the handshake share one deadline, the connection
    /// timeout. Every step is written to `diagnostics`.
    pub async fn connect(&self, diagnostics: &mut Diagnostics) -> Result<GatewaySession> {
        let url = self.config.ws_url();
        let deadline = Instant::now() + self.config.timeout;
        diagnostics.push(format!("socket: connecting to {}", url));

        let mut request = url.as_str().into_client_request()?;
        let origin = HeaderValue::from_str(&self.config.http_base())
            .map_err(|e| Error::Config(format!("invalid origin header: {}", e)))?;
        request.headers_mut().insert("Origin", origin);

        let ws = match timeout_at(deadline, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                let err = Error::from(e);
                diagnostics.push(format!("socket: upgrade failed: {}", err));
                if is_origin_rejection(&err.to_string()) {
                    diagnostics.push(ORIGIN_HINT);
                }
                return Err(err);
            }
            Err(_) => {
                let err = Error::Timeout(format!("socket upgrade to {} timed out", url));
                diagnostics.push(format!("socket: {}", err));
                return Err(err);
            }
        };
        diagnostics.push("socket: opened, awaiting challenge");

        let (sink, stream) = ws.split();
        let (session, outcome) = GatewaySession::start(sink, stream, &self.config, self.challenge_grace);

        match timeout_at(deadline, outcome).await {
            Ok(Ok(Ok(trace))) => {
                diagnostics.append(trace);
                info!("Gateway socket authenticated at {}", url);
                Ok(session)
            }
            Ok(Ok(Err((err, trace)))) => {
                diagnostics.append(trace);
                if is_origin_rejection(&err.to_string()) {
                    diagnostics.push(ORIGIN_HINT);
                }
                Err(err)
            }
            Ok(Err(_)) => {
                let err = Error::TransportUnavailable("socket reader ended during handshake".to_string());
                diagnostics.push(format!("socket: {}", err));
                Err(err)
            }
            Err(_) => {
                let err = Error::Timeout(format!(
                    "handshake with {} did not finish within {:?}",
                    url, self.config.timeout
                ));
                diagnostics.push(format!("socket: {}", err));
                Err(err)
            }
        }
    }

    /// Connect, call one method, close
    pub async fn call_once(&self, method: &str, params: &Value, diagnostics: &mut Diagnostics) -> Result<Value> {
        let session = self.connect(diagnostics).await?;
        let result = session.call(method, params).await;
        match &result {
            Ok(_) => diagnostics.push(format!("socket: {} succeeded", method)),
            Err(e) => diagnostics.push(format!("socket: {} failed: {}", method, e)),
        }
        session.close().await;
        result
    }

    /// Connect, try method synonyms in order, close
    pub async fn call_any_once<S: AsRef<str>>(
        &self,
        methods: &[S],
        params: &Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(String, Value)> {
        let session = self.connect(diagnostics).await?;
        let result = session.call_any(methods, params, diagnostics).await;
        session.close().await;
        result
    }
}

/// An authenticated socket connection
pub struct GatewaySession {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    call_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl GatewaySession {
    /// Spawn the reader and writer tasks over an already-open socket.
    ///
    /// The returned receiver resolves once the handshake succeeds or fails.
    fn start<Si, St>(
        sink: Si,
        stream: St,
        config: &ConnectionConfig,
        grace: Duration,
    ) -> (Self, oneshot::Receiver<HandshakeOutcome>)
    where
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: std::fmt::Display + Send,
        St: Stream<Item = std::result::Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (auth_tx, auth_rx) = oneshot::channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let next_id = Arc::new(AtomicU64::new(1));

        let connect_params = serde_json::to_value(ConnectParams::operator(config)).unwrap_or(Value::Null);

        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(
            Reader {
                machine: AuthMachine::new(),
                outgoing: out_tx.clone(),
                pending: pending.clone(),
                next_id: next_id.clone(),
                connect_params,
                auth_tx: Some(auth_tx),
                trace: Diagnostics::new(),
            }
            .run(stream, grace),
        );

        let session = GatewaySession {
            outgoing: out_tx,
            pending,
            next_id,
            call_timeout: config.call_timeout,
            reader,
            writer,
        };
        (session, auth_rx)
    }

    /// Issue one request and wait for its response under the per-call timeout
    pub async fn call(&self, method: &str, params: &Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let text = RequestFrame::new(id.clone(), method, params).to_text()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.outgoing.send(Outgoing::Text(text)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::TransportUnavailable(format!("socket closed before {} was sent", method)));
        }
        debug!("socket request {} -> {}", id, method);

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportUnavailable(format!(
                "socket closed while waiting for {}",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!("{} timed out after {:?}", method, self.call_timeout)))
            }
        }
    }

    /// Try method synonyms strictly in order
    pub async fn call_any<S: AsRef<str>>(
        &self,
        methods: &[S],
        params: &Value,
        diagnostics: &mut Diagnostics,
    ) -> Result<(String, Value)> {
        let names: Vec<String> = methods.iter().map(|m| m.as_ref().to_string()).collect();
        first_success("socket method", names, diagnostics, |method| {
            async move { self.call(&method, params).await }.boxed()
        })
        .await
    }

    /// Send a close frame and give the writer a moment to flush it
    pub async fn close(mut self) {
        let _ = self.outgoing.send(Outgoing::Close);
        let _ = timeout(Duration::from_millis(500), &mut self.writer).await;
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_loop<Si>(mut sink: Si, mut outgoing: mpsc::UnboundedReceiver<Outgoing>)
where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display + Send,
{
    while let Some(message) = outgoing.recv().await {
        match message {
            Outgoing::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("socket write failed: {}", e);
                    break;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

struct Reader {
    machine: AuthMachine,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    connect_params: Value,
    auth_tx: Option<oneshot::Sender<HandshakeOutcome>>,
    trace: Diagnostics,
}

impl Reader {
    async fn run<St>(mut self, mut stream: St, grace: Duration)
    where
        St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        self.machine.opened();
        let grace_timer = tokio::time::sleep(grace);
        tokio::pin!(grace_timer);
        let mut grace_armed = true;

        loop {
            let message = tokio::select! {
                _ = &mut grace_timer, if grace_armed => {
                    grace_armed = false;
                    let action = self.machine.grace_expired();
                    if matches!(action, AuthAction::SendConnect) {
                        self.trace.push(format!("socket: no challenge after {:?}, sending connect", grace));
                    }
                    if !self.apply(action) {
                        break;
                    }
                    continue;
                }
                message = stream.next() => message,
            };

            let keep_going = match message {
                Some(Ok(Message::Text(text))) => self.on_text(&text).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.on_text(text).await,
                    Err(_) => true,
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| {
                        let reason: &str = &f.reason;
                        reason.to_string()
                    });
                    self.trace
                        .push(format!("socket: closed by gateway ({})", reason.as_deref().unwrap_or("no reason")));
                    let action = self.machine.on_closed(reason.as_deref());
                    self.apply(action);
                    false
                }
                Some(Ok(_)) => true,
                Some(Err(e)) => {
                    let err = Error::from(e);
                    self.trace.push(format!("socket: read error: {}", err));
                    let action = self.machine.on_error(err);
                    self.apply(action);
                    false
                }
                None => {
                    let action = self.machine.on_closed(None);
                    self.apply(action);
                    false
                }
            };

            if !keep_going {
                break;
            }
        }

        self.fail_pending().await;
    }

    async fn on_text(&mut self, text: &str) -> bool {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.trace.push(format!("socket: ignored frame: {}", e));
                return true;
            }
        };

        if !self.machine.is_authenticated() {
            if let Some(event) = frame.event_name() {
                self.trace.push(format!("socket: received event {}", event));
            }
            let action = self.machine.on_frame(&frame);
            return self.apply(action);
        }

        if frame.kind() != FrameKind::Response {
            if let Some(event) = frame.event_name() {
                if event != events::CONNECT_READY {
                    debug!("socket event ignored: {}", event);
                }
            }
            return true;
        }

        let Some(id) = frame.id_str() else {
            return true;
        };
        let waiter = self.pending.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                let result = if frame.is_failure() {
                    Err(frame.rejection())
                } else {
                    Ok(frame.into_body())
                };
                let _ = tx.send(result);
            }
            None => debug!("socket response {} has no pending request", id),
        }
        true
    }

    /// Perform an auth action; false when the connection is finished
    fn apply(&mut self, action: AuthAction) -> bool {
        match action {
            AuthAction::None => true,
            AuthAction::SendConnect => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
                let text = match RequestFrame::new(id.clone(), CONNECT_METHOD, &self.connect_params).to_text() {
                    Ok(text) => text,
                    Err(e) => return self.finish(Err(e)),
                };
                self.machine.bind_connect_id(id.clone());
                if self.outgoing.send(Outgoing::Text(text)).is_err() {
                    return self.finish(Err(Error::TransportUnavailable(
                        "socket writer stopped before connect".to_string(),
                    )));
                }
                self.trace.push(format!("socket: sent connect request (id {})", id));
                true
            }
            AuthAction::Authenticated => {
                self.trace.push("socket: authenticated");
                self.finish(Ok(()))
            }
            AuthAction::Failed(err) => {
                self.trace.push(format!("socket: handshake failed: {}", err));
                self.finish(Err(err))
            }
        }
    }

    fn finish(&mut self, outcome: Result<()>) -> bool {
        let keep_going = outcome.is_ok();
        if let Some(tx) = self.auth_tx.take() {
            let trace = std::mem::take(&mut self.trace);
            let _ = tx.send(match outcome {
                Ok(()) => Ok(trace),
                Err(err) => Err((err, trace)),
            });
        }
        keep_going
    }

    async fn fail_pending(&mut self) {
        {
            let mut pending = self.pending.lock().await;
            for (_, tx) in pending.drain() {
                let _ = tx.send(Err(Error::TransportUnavailable("socket closed".to_string())));
            }
        }
        // Handshake never resolved
        if self.auth_tx.is_some() {
            self.finish(Err(Error::TransportUnavailable(
                "socket closed before authentication".to_string(),
            )));
        }
    }
}
