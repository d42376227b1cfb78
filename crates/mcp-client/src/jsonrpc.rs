//! Bundled JSON-RPC client library.
//!
//! [`JsonRpcConnector`] implements [`SessionConnector`] on top of the stdio
//! and HTTP transports: `initialize` → `notifications/initialized` →
//! `tools/list` on first discovery, `tools/call` for invocation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::Mutex;

use tp_domain::config::ConnectionConfig;

use crate::error::ClassifiedError;
use crate::protocol::{self, RemoteToolDef, ToolsListResult};
use crate::retry::with_timeout;
use crate::session::{ConnectionParams, ProviderParams, SessionConnector, ToolSession};
use crate::tool::{ToolDescriptor, ToolHandler};
use crate::transport::{HttpTransport, McpTransport, StdioTransport};

/// Upper bound on `tools/list` pages fetched from one provider.
const MAX_LIST_PAGES: usize = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builds [`JsonRpcSession`]s.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    request_timeout: Duration,
}

impl JsonRpcConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    pub fn from_config(cfg: &ConnectionConfig) -> Self {
        Self::new(cfg.request_timeout())
    }
}

impl SessionConnector for JsonRpcConnector {
    fn build(&self, providers: Vec<ProviderParams>) -> Result<Box<dyn ToolSession>, ClassifiedError> {
        let mut seen = HashSet::new();
        for p in &providers {
            if !seen.insert(p.name.as_str()) {
                return Err(ClassifiedError::configuration(format!(
                    "duplicate provider name '{}'",
                    p.name
                ))
                .with_provider(&p.name));
            }
            if let ConnectionParams::Network { url, .. } = &p.connection {
                Url::parse(url).map_err(|e| {
                    ClassifiedError::configuration(format!("invalid url '{url}': {e}"))
                        .with_provider(&p.name)
                })?;
            }
        }
        Ok(Box::new(JsonRpcSession {
            providers,
            request_timeout: self.request_timeout,
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregate over every configured provider. Providers connect lazily and
/// a provider that fails is skipped without affecting its siblings.
pub struct JsonRpcSession {
    providers: Vec<ProviderParams>,
    request_timeout: Duration,
    clients: Mutex<HashMap<String, Arc<ProviderClient>>>,
    closed: AtomicBool,
}

impl JsonRpcSession {
    /// Live client for `params`, connecting (or reconnecting) if needed.
    ///
    /// The client map is only locked for lookups and inserts; the handshake
    /// runs unlocked so a slow provider does not stall its siblings.
    async fn client(&self, params: &ProviderParams) -> Result<Arc<ProviderClient>, ClassifiedError> {
        let dead = {
            let mut clients = self.clients.lock().await;
            match clients.get(&params.name) {
                Some(existing) if existing.is_alive() => return Ok(existing.clone()),
                Some(_) => clients.remove(&params.name),
                None => None,
            }
        };
        if let Some(dead) = dead {
            tracing::info!(provider = %params.name, "provider connection lost, reconnecting");
            dead.shutdown().await;
        }

        let client = Arc::new(ProviderClient::connect(params, self.request_timeout).await?);

        let raced = {
            let mut clients = self.clients.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                Some(Err(ClassifiedError::connection("session is closed").with_retryable(false)))
            } else {
                match clients.get(&params.name) {
                    Some(winner) if winner.is_alive() => Some(Ok(winner.clone())),
                    _ => {
                        clients.insert(params.name.clone(), client.clone());
                        None
                    }
                }
            }
        };
        match raced {
            None => Ok(client),
            Some(outcome) => {
                client.shutdown().await;
                outcome
            }
        }
    }
}

#[async_trait]
impl ToolSession for JsonRpcSession {
    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, ClassifiedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClassifiedError::connection("session is closed").with_retryable(false));
        }

        let mut tools = Vec::new();
        let mut reached = 0usize;
        let mut last_err = None;

        for params in &self.providers {
            let listed = match self.client(params).await {
                Ok(client) => match client.list_tools().await {
                    Ok(defs) => Ok((client, defs)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match listed {
                Ok((client, defs)) => {
                    reached += 1;
                    tools.extend(defs.into_iter().map(|def| remote_descriptor(def, &client)));
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %params.name,
                        error = %e,
                        "tool discovery failed for provider, skipping"
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if reached == 0 => Err(e),
            _ => Ok(tools),
        }
    }

    fn providers(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let clients: Vec<_> = self.clients.lock().await.drain().map(|(_, c)| c).collect();
        let futs: Vec<_> = clients.iter().map(|c| c.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

fn remote_descriptor(def: RemoteToolDef, client: &Arc<ProviderClient>) -> ToolDescriptor {
    let handler = Arc::new(RemoteTool {
        client: client.clone(),
        tool: def.name.clone(),
    });
    ToolDescriptor {
        name: def.name,
        description: def.description,
        input_schema: def.input_schema,
        handler: Some(handler),
        server: Some(client.name.clone()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One handshaken provider connection.
pub struct ProviderClient {
    name: String,
    transport: Arc<dyn McpTransport>,
    request_timeout: Duration,
}

impl ProviderClient {
    /// Open the transport and perform the `initialize` handshake.
    pub async fn connect(params: &ProviderParams, request_timeout: Duration) -> Result<Self, ClassifiedError> {
        tracing::info!(
            provider = %params.name,
            transport = %params.connection,
            "connecting to tool provider"
        );

        let opened: Result<Arc<dyn McpTransport>, _> = match &params.connection {
            ConnectionParams::Stdio { command, args, env } => {
                StdioTransport::spawn(command, args, env).map(|t| Arc::new(t) as Arc<dyn McpTransport>)
            }
            ConnectionParams::Network { kind, url, headers } => {
                HttpTransport::new(*kind, url, headers).map(|t| Arc::new(t) as Arc<dyn McpTransport>)
            }
        };
        let transport =
            opened.map_err(|e| ClassifiedError::from(e).with_provider(&params.name))?;

        let client = Self {
            name: params.name.clone(),
            transport,
            request_timeout,
        };

        if let Err(e) = client.handshake().await {
            client.shutdown().await;
            return Err(e.context(format!("provider '{}' handshake failed", client.name)));
        }

        tracing::info!(provider = %client.name, "tool provider initialized");
        Ok(client)
    }

    async fn handshake(&self) -> Result<(), ClassifiedError> {
        let init = serde_json::to_value(protocol::initialize_params()).map_err(|e| {
            ClassifiedError::protocol(format!("failed to serialize initialize params: {e}"))
        })?;
        self.request("initialize", Some(init)).await?;
        self.transport
            .send_notification("notifications/initialized")
            .await
            .map_err(|e| ClassifiedError::from(e).with_provider(&self.name))
    }

    /// Send one request bounded by the request timeout.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClassifiedError> {
        let transport = self.transport.clone();
        let owned_method = method.to_owned();
        let resp = with_timeout(
            async move {
                transport
                    .send_request(&owned_method, params)
                    .await
                    .map_err(ClassifiedError::from)
            },
            self.request_timeout,
            method,
        )
        .await
        .map_err(|e| e.with_provider(&self.name))?;

        resp.into_result().map_err(|rpc| {
            ClassifiedError::protocol(format!("{method} failed: {rpc}"))
                .with_provider(&self.name)
                .with_source(rpc)
        })
    }

    /// Fetch every page of `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<RemoteToolDef>, ClassifiedError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let value = self
                .request("tools/list", protocol::tools_list_params(cursor.as_deref()))
                .await?;
            let page: ToolsListResult = serde_json::from_value(value).map_err(|e| {
                ClassifiedError::protocol(format!("failed to parse tools/list result: {e}"))
                    .with_provider(&self.name)
            })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(provider = %self.name, tool_count = tools.len(), "tools listed");
        Ok(tools)
    }

    /// Invoke a tool and return the raw `result` value.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ClassifiedError> {
        if !self.transport.is_alive() {
            return Err(
                ClassifiedError::connection(format!("provider '{}' connection is down", self.name))
                    .with_provider(&self.name),
            );
        }
        self.request("tools/call", Some(protocol::tool_call_params(tool, arguments)))
            .await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn shutdown(&self) {
        tracing::info!(provider = %self.name, "shutting down tool provider");
        self.transport.shutdown().await;
    }
}

/// Handler bound to one remote tool.
struct RemoteTool {
    client: Arc<ProviderClient>,
    tool: String,
}

#[async_trait]
impl ToolHandler for RemoteTool {
    async fn invoke(&self, params: Value) -> Result<Value, ClassifiedError> {
        self.client.call_tool(&self.tool, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::NetworkKind;
    use std::collections::BTreeMap;

    fn network(name: &str, url: &str) -> ProviderParams {
        ProviderParams {
            name: name.into(),
            connection: ConnectionParams::Network {
                kind: NetworkKind::Http,
                url: url.into(),
                headers: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn build_rejects_duplicate_names() {
        let connector = JsonRpcConnector::new(Duration::from_secs(1));
        let err = connector
            .build(vec![network("a", "http://x/mcp"), network("a", "http://y/mcp")])
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(err.provider.as_deref(), Some("a"));
    }

    #[test]
    fn build_does_not_connect() {
        let connector = JsonRpcConnector::new(Duration::from_secs(1));
        let session = connector
            .build(vec![network("remote", "http://127.0.0.1:9/mcp")])
            .unwrap();
        assert_eq!(session.providers(), vec!["remote".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_provider_fails_discovery() {
        let connector = JsonRpcConnector::new(Duration::from_secs(5));
        let session = connector
            .build(vec![network("remote", "http://127.0.0.1:9/mcp")])
            .unwrap();
        let err = session.get_tools().await.unwrap_err();
        assert_eq!(err.provider.as_deref(), Some("remote"));
        assert!(err.to_string().contains("handshake failed"));
    }

    #[tokio::test]
    async fn slow_handshake_does_not_hold_client_map() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let slow = network("slow", &format!("http://{addr}/mcp"));
        let session = Arc::new(JsonRpcSession {
            providers: vec![slow.clone()],
            request_timeout: Duration::from_secs(5),
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let connecting = {
            let session = session.clone();
            tokio::spawn(async move { session.client(&slow).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!connecting.is_finished());
        assert!(session.clients.try_lock().is_ok());

        connecting.abort();
        accept.abort();
    }

    #[tokio::test]
    async fn closed_session_refuses_discovery() {
        let connector = JsonRpcConnector::new(Duration::from_secs(1));
        let session = connector.build(vec![]).unwrap();
        session.close().await;
        session.close().await;
        assert!(session.get_tools().await.is_err());
    }
}
