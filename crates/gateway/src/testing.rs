//! In-memory session connector shared by the gateway's unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use tp_mcp_client::{ClassifiedError, ProviderParams, SessionConnector, ToolDescriptor, ToolHandler, ToolSession};

pub(crate) struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    async fn invoke(&self, params: Value) -> Result<Value, ClassifiedError> {
        Ok(json!({ "echo": params }))
    }
}

/// Tool named `name` served by provider `server`.
pub(crate) fn tool(name: &str, server: &str) -> ToolDescriptor {
    ToolDescriptor::new(name, format!("{name} via {server}"))
        .with_server(server)
        .with_schema(json!({ "type": "object" }))
        .with_handler(Arc::new(Echo))
}

#[derive(Default)]
pub(crate) struct Counters {
    pub built: Mutex<Vec<Vec<String>>>,
    pub closes: AtomicU32,
    pub discoveries: AtomicU32,
    /// Remaining discoveries that fail with a retryable error.
    pub failing: AtomicU32,
}

/// Serves every catalog tool whose `server` is among the built providers.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    pub catalog: Vec<ToolDescriptor>,
    pub counters: Arc<Counters>,
}

impl FakeConnector {
    pub(crate) fn new(catalog: Vec<ToolDescriptor>) -> Self {
        Self {
            catalog,
            counters: Arc::default(),
        }
    }
}

impl SessionConnector for FakeConnector {
    fn build(&self, providers: Vec<ProviderParams>) -> Result<Box<dyn ToolSession>, ClassifiedError> {
        let names: Vec<String> = providers.into_iter().map(|p| p.name).collect();
        self.counters.built.lock().push(names.clone());
        Ok(Box::new(FakeSession {
            names,
            catalog: self.catalog.clone(),
            counters: self.counters.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeSession {
    names: Vec<String>,
    catalog: Vec<ToolDescriptor>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

#[async_trait]
impl ToolSession for FakeSession {
    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, ClassifiedError> {
        self.counters.discoveries.fetch_add(1, Ordering::SeqCst);
        if self.counters.failing.load(Ordering::SeqCst) > 0 {
            self.counters.failing.fetch_sub(1, Ordering::SeqCst);
            return Err(ClassifiedError::connection("read ECONNRESET"));
        }
        Ok(self
            .catalog
            .iter()
            .filter(|t| t.server.as_ref().is_some_and(|s| self.names.contains(s)))
            .cloned()
            .collect())
    }

    fn providers(&self) -> Vec<String> {
        self.names.clone()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
