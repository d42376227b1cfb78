//! Provider transports.
//!
//! - **Stdio**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Http**: POST JSON-RPC to an endpoint. The streamable flavour accepts
//!   SSE-framed replies and carries the server-issued session id.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::error::{classify, ClassifiedError, ErrorContext, ErrorKind};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::session::NetworkKind;

/// Header carrying the streamable-HTTP session id.
const SESSION_HEADER: &str = "mcp-session-id";

/// Trait for provider transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a JSON-RPC request and wait for the corresponding response.
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    fn is_alive(&self) -> bool;

    /// Shut down the transport gracefully.
    async fn shutdown(&self);
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed: provider process has exited")]
    ProcessExited,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("provider sent no response for request {0}")]
    NoResponse(u64),
}

impl From<TransportError> for ClassifiedError {
    fn from(e: TransportError) -> Self {
        let mapped = match &e {
            TransportError::ProcessExited => Some((ErrorKind::Connection, true)),
            TransportError::Json(_) | TransportError::NoResponse(_) => {
                Some((ErrorKind::Protocol, false))
            }
            TransportError::InvalidHeader(_) => Some((ErrorKind::Configuration, false)),
            TransportError::Status { status, .. } => Some(match *status {
                429 | 500..=599 => (ErrorKind::Connection, true),
                401 | 403 => (ErrorKind::Configuration, false),
                _ => (ErrorKind::Protocol, false),
            }),
            TransportError::Io(_) | TransportError::Http(_) => None,
        };
        match mapped {
            Some((kind, retryable)) => {
                ClassifiedError::new(kind, retryable, e.to_string()).with_source(e)
            }
            None => classify(e, ErrorContext::default()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stdio transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of non-JSON lines to skip before declaring the provider broken.
const MAX_SKIP_LINES: usize = 1000;

/// Stdio transport: communicates with a child process over stdin/stdout.
///
/// Each JSON-RPC message is a single newline-delimited line.
/// The `request_lock` serializes entire request/response cycles so a reply
/// is only ever read by the request that is waiting for it.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl StdioTransport {
    /// Spawn the provider process.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdin",
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture child stdout",
            ))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping any empty or non-JSON lines.
    ///
    /// Gives up after [`MAX_SKIP_LINES`] non-JSON lines so a provider that
    /// logs to stdout cannot keep us spinning.
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }

        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "provider produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from provider stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending request");
        self.write_line(&json).await?;

        // Providers may interleave notifications; anything without our id is skipped.
        loop {
            let line = self.read_line().await?;
            if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                if resp.id == id {
                    return Ok(resp);
                }
                tracing::debug!(expected_id = id, got_id = resp.id, "response for a different request");
                continue;
            }
            tracing::debug!(line = %line, "skipping non-matching message from provider");
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing provider stdin");
            }
        }
        let waited = tokio::time::timeout(tokio::time::Duration::from_secs(5), child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "provider process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for provider process");
            }
            Err(_) => {
                tracing::warn!("provider process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill provider process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    kind: NetworkKind,
    headers: HeaderMap,
    /// Issued by streamable-HTTP servers on `initialize`.
    session_id: SyncMutex<Option<String>>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        kind: NetworkKind,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::InvalidHeader(format!("'{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidHeader(format!("'{key}': {e}")))?;
            map.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Http(describe(&e)))?;

        Ok(Self {
            http,
            url: url.to_owned(),
            kind,
            headers: map,
            session_id: SyncMutex::new(None),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    fn post(&self, body: &impl serde::Serialize) -> reqwest::RequestBuilder {
        let mut rb = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = self.session_id.lock().clone() {
            rb = rb.header(SESSION_HEADER, id);
        }
        rb
    }

    async fn send(&self, rb: reqwest::RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let resp = rb.send().await.map_err(|e| {
            if e.is_connect() {
                self.alive.store(false, Ordering::SeqCst);
            }
            TransportError::Http(describe(&e))
        })?;

        if self.kind == NetworkKind::StreamableHttp {
            if let Some(id) = resp
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                *self.session_id.lock() = Some(id.to_owned());
            }
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        self.alive.store(true, Ordering::SeqCst);
        Ok(resp)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::debug!(id, method, url = %self.url, "sending request");

        let resp = self.send(self.post(&req)).await?;
        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Http(describe(&e)))?;

        if is_sse {
            return response_from_sse(&body, id).ok_or(TransportError::NoResponse(id));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        tracing::debug!(method, "sending notification");
        self.send(self.post(&notif)).await.map(|_| ())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let Some(id) = self.session_id.lock().take() else {
            return;
        };
        let result = self
            .http
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %describe(&e), url = %self.url, "session termination failed");
        }
    }
}

/// Find the response to `id` among the `data:` lines of an SSE body.
fn response_from_sse(body: &str, id: u64) -> Option<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|resp| resp.id == id)
}

/// Flatten a reqwest error and its sources into one line so the
/// classifier can see the underlying cause ("Connection refused", ...).
fn describe(e: &reqwest::Error) -> String {
    let mut out = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    if e.is_timeout() {
        out.push_str(" (timeout)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_body_yields_matching_response() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\n";
        let resp = response_from_sse(body, 7).unwrap();
        assert_eq!(resp.id, 7);
        assert!(response_from_sse(body, 8).is_none());
    }

    #[test]
    fn invalid_header_is_rejected() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let err = HttpTransport::new(NetworkKind::Http, "http://localhost/mcp", &headers)
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidHeader(_)));
        let classified: ClassifiedError = err.into();
        assert_eq!(classified.kind, ErrorKind::Configuration);
    }

    #[test]
    fn process_exit_is_retryable_connection() {
        let err: ClassifiedError = TransportError::ProcessExited.into();
        assert_eq!(err.kind, ErrorKind::Connection);
        assert!(err.retryable);
    }

    #[test]
    fn status_codes_map_to_kinds() {
        let status = |code: u16| -> ClassifiedError {
            TransportError::Status {
                status: code,
                body: String::new(),
            }
            .into()
        };
        assert_eq!(status(503).kind, ErrorKind::Connection);
        assert!(status(429).retryable);
        assert_eq!(status(401).kind, ErrorKind::Configuration);
        assert_eq!(status(404).kind, ErrorKind::Protocol);
        assert!(!status(404).retryable);
    }

    #[test]
    fn refused_io_error_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "ECONNREFUSED");
        let err: ClassifiedError = TransportError::Io(io).into();
        assert_eq!(err.kind, ErrorKind::Connection);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn spawn_failure_is_io_error() {
        let err = StdioTransport::spawn("/definitely/not/a/binary", &[], &BTreeMap::new())
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
