//! Connection manager: owns the aggregate provider session and drives it
//! through `Uninitialized → Initialized → Disconnected`.
//!
//! Tool discovery and dispatch go through the session built by a
//! [`SessionConnector`]; the manager adds sanitization, name dedupe,
//! classified errors and cancellable reconnect backoff on top.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tp_domain::config::ConnectionConfig;
use tp_domain::trace::TraceEvent;

use crate::descriptor::{load_descriptor_file, ProviderDescriptor};
use crate::error::{classify, ClassifiedError, ErrorContext, ErrorKind};
use crate::retry::RetryPolicy;
use crate::sanitize::sanitize_tools;
use crate::session::{SessionConnector, ToolSession};
use crate::tool::{dedupe_by_name, group_toolsets, ToolDescriptor, Toolset};

const INIT_FAILED: &str = "failed to initialize tool providers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerPhase {
    Uninitialized,
    Initialized,
    Disconnected,
}

struct ManagerState {
    phase: ManagerPhase,
    session: Option<Arc<dyn ToolSession>>,
    /// Enabled descriptors the current session was built from.
    descriptors: Vec<ProviderDescriptor>,
    /// Cancelled on disconnect so pending reconnect waits stop.
    timers: CancellationToken,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConnectionManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConnectionManager {
    options: ConnectionConfig,
    connector: Arc<dyn SessionConnector>,
    /// Descriptor document read when `initialize_servers(None)` is called.
    source: Option<PathBuf>,
    state: RwLock<ManagerState>,
}

impl ConnectionManager {
    pub fn new(options: ConnectionConfig, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            options,
            connector,
            source: None,
            state: RwLock::new(ManagerState {
                phase: ManagerPhase::Uninitialized,
                session: None,
                descriptors: Vec::new(),
                timers: CancellationToken::new(),
            }),
        }
    }

    /// Use `path` as the descriptor source when none are passed explicitly.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn phase(&self) -> ManagerPhase {
        self.state.read().phase
    }

    pub fn options(&self) -> &ConnectionConfig {
        &self.options
    }

    // ── Initialization ─────────────────────────────────────────────

    /// Build the aggregate session over every enabled descriptor.
    ///
    /// With `None`, descriptors are loaded from the configured source. An
    /// empty or all-disabled set is not an error: no session is built and
    /// every tool query returns nothing. Re-initializing replaces the
    /// previous session.
    pub async fn initialize_servers(
        &self,
        descriptors: Option<Vec<ProviderDescriptor>>,
    ) -> Result<(), ClassifiedError> {
        let descriptors = match descriptors {
            Some(d) => d,
            None => self.load_source().await?,
        };
        let enabled: Vec<ProviderDescriptor> =
            descriptors.into_iter().filter(|d| d.enabled).collect();

        if self.state.read().session.is_some() {
            tracing::info!("replacing existing provider session");
            self.teardown(false).await;
        }

        if enabled.is_empty() {
            tracing::info!("no enabled tool providers, skipping session construction");
            return Ok(());
        }

        let params = enabled.iter().map(ProviderDescriptor::params).collect();
        let session = self.connector.build(params).map_err(|e| {
            e.reclassify(ErrorKind::Configuration)
                .with_retryable(false)
                .context(INIT_FAILED)
        })?;
        let session: Arc<dyn ToolSession> = Arc::from(session);
        let names = session.providers();

        {
            let mut st = self.state.write();
            st.session = Some(session);
            st.descriptors = enabled;
            st.phase = ManagerPhase::Initialized;
        }

        tracing::info!(providers = ?names, "tool provider session initialized");
        TraceEvent::ProvidersInitialized { providers: names }.emit();
        Ok(())
    }

    async fn load_source(&self) -> Result<Vec<ProviderDescriptor>, ClassifiedError> {
        let Some(path) = &self.source else {
            return Ok(Vec::new());
        };
        let set = load_descriptor_file(path)
            .await
            .map_err(|e| ClassifiedError::from(e).context(INIT_FAILED))?;
        if !set.disabled.is_empty() {
            tracing::debug!(disabled = ?set.disabled, "skipping disabled providers");
        }
        Ok(set.enabled)
    }

    // ── Tools ──────────────────────────────────────────────────────

    /// Every tool across all providers, schemas stripped, unique by name.
    /// Empty when no session exists.
    pub async fn get_available_tools(&self) -> Result<Vec<ToolDescriptor>, ClassifiedError> {
        let Some(session) = self.session() else {
            return Ok(Vec::new());
        };
        let discovered = session.get_tools().await?;
        Ok(dedupe_by_name(sanitize_tools(&discovered)))
    }

    /// Available tools grouped per provider.
    pub async fn get_toolsets(&self) -> Result<Vec<Toolset>, ClassifiedError> {
        Ok(group_toolsets(self.get_available_tools().await?))
    }

    /// Resolve `name` among available tools and invoke its handler.
    /// Every failure names the tool.
    pub async fn execute_tool_call(&self, name: &str, params: Value) -> Result<Value, ClassifiedError> {
        if self.session().is_none() {
            return Err(ClassifiedError::protocol(format!(
                "cannot call tool '{name}': tool providers are not initialized"
            ))
            .with_tool(name));
        }

        let tools = self.get_available_tools().await.map_err(|e| {
            classify(e, ErrorContext::tool(name)).context(format!("cannot resolve tool '{name}'"))
        })?;
        let tool = tools.into_iter().find(|t| t.name == name).ok_or_else(|| {
            ClassifiedError::protocol(format!("tool '{name}' not found among available tools"))
                .with_tool(name)
        })?;
        let handler = tool.handler.clone().ok_or_else(|| {
            ClassifiedError::protocol(format!("tool '{name}' has no invocable handler"))
                .with_tool(name)
                .with_provider(tool.group())
        })?;

        let started = Instant::now();
        let result = handler.invoke(params).await.map_err(|e| {
            let ctx = ErrorContext {
                provider: tool.server.clone(),
                tool: Some(name.to_owned()),
            };
            classify(e, ctx).context(format!("tool '{name}' failed"))
        });

        TraceEvent::ToolCalled {
            tool: name.to_owned(),
            provider: tool.server.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            ok: result.is_ok(),
        }
        .emit();

        result
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Cancel pending reconnect waits, close the session and clear all
    /// provider bookkeeping. Safe to call in any phase, any number of times.
    pub async fn disconnect(&self) {
        self.teardown(true).await;
    }

    async fn teardown(&self, cancel_timers: bool) {
        let session = {
            let mut st = self.state.write();
            if cancel_timers {
                st.timers.cancel();
                st.timers = CancellationToken::new();
            }
            st.descriptors.clear();
            if st.phase == ManagerPhase::Initialized {
                st.phase = ManagerPhase::Disconnected;
            }
            st.session.take()
        };
        if let Some(session) = session {
            session.close().await;
            tracing::info!("tool provider session closed");
        }
    }

    /// Whether a session exists; with a provider name, also whether that
    /// provider was constructed into it.
    pub fn is_connected(&self, provider: Option<&str>) -> bool {
        let st = self.state.read();
        if st.session.is_none() {
            return false;
        }
        match provider {
            Some(name) => st.descriptors.iter().any(|d| d.name == name),
            None => true,
        }
    }

    /// Tear down and rebuild the session, then re-run discovery under the
    /// reconnect backoff policy. Returns the rediscovered tools.
    ///
    /// Waits between attempts are cancelled by [`disconnect`](Self::disconnect).
    pub async fn reconnect(&self, provider: Option<&str>) -> Result<Vec<ToolDescriptor>, ClassifiedError> {
        let label = provider.unwrap_or("all providers").to_owned();
        let known = self.state.read().descriptors.clone();
        // With no live session, the source decides which providers exist.
        let descriptors = if known.is_empty() {
            self.load_source().await?
        } else {
            known
        };

        if let Some(name) = provider {
            if !descriptors.iter().any(|d| d.enabled && d.name == name) {
                return Err(ClassifiedError::configuration(format!(
                    "cannot reconnect unknown provider '{name}'"
                ))
                .with_provider(name));
            }
        }

        if self.is_connected(None) {
            self.disconnect().await;
        }

        self.initialize_servers(Some(descriptors)).await?;

        let token = self.state.read().timers.clone();
        let policy = RetryPolicy::reconnect(&self.options).with_cancel(token);
        let operation = format!("reconnect {label}");

        match policy.run(&operation, || self.get_available_tools()).await {
            Ok(tools) => {
                tracing::info!(target_provider = %label, tool_count = tools.len(), "reconnected");
                Ok(tools)
            }
            Err(e) if e.retryable => {
                let mut err = ClassifiedError::connection(format!(
                    "failed to reconnect {label} after {} attempts: {e}",
                    policy.max_attempts
                ));
                if let Some(name) = provider {
                    err = err.with_provider(name);
                }
                Err(err.with_source(e))
            }
            Err(e) => Err(e),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Names of the providers the current session was built over.
    pub fn provider_names(&self) -> Vec<String> {
        self.state.read().descriptors.iter().map(|d| d.name.clone()).collect()
    }

    /// Auto-approved tool names declared for `provider`.
    pub fn auto_approve(&self, provider: &str) -> BTreeSet<String> {
        self.state
            .read()
            .descriptors
            .iter()
            .find(|d| d.name == provider)
            .map(|d| d.auto_approve.clone())
            .unwrap_or_default()
    }

    /// Number of tools currently discoverable.
    pub async fn tool_count(&self) -> Result<usize, ClassifiedError> {
        Ok(self.get_available_tools().await?.len())
    }

    fn session(&self) -> Option<Arc<dyn ToolSession>> {
        self.state.read().session.clone()
    }
}
