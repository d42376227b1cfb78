//! `tp-mcp-client`: tool-provider connection and resilience layer.
//!
//! This crate provides:
//! - Descriptor validation for declared tool providers (stdio or network).
//! - An error taxonomy with classification, retry with backoff and
//!   timeout racing.
//! - A schema sanitizer applied to every discovered tool.
//! - A `ConnectionManager` that owns the aggregate provider session,
//!   dispatches tool calls and reconnects with cancellable backoff.
//! - A bundled JSON-RPC client library (stdio and HTTP transports)
//!   implementing the `SessionConnector` seam.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tp_mcp_client::{ConnectionManager, JsonRpcConnector};
//!
//! let connector = Arc::new(JsonRpcConnector::from_config(&config.connection));
//! let manager = ConnectionManager::new(config.connection.clone(), connector)
//!     .with_source("providers.json");
//! manager.initialize_servers(None).await?;
//!
//! for tool in manager.get_available_tools().await? {
//!     println!("{}:{}", tool.group(), tool.name);
//! }
//! let result = manager.execute_tool_call("read_file", json!({"path": "notes.md"})).await?;
//! ```

pub mod descriptor;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod protocol;
pub mod retry;
pub mod sanitize;
pub mod session;
pub mod tool;
pub mod transport;

pub use descriptor::{
    load_descriptor_file, validate_descriptors, DescriptorError, DescriptorSet, ProviderDescriptor,
};
pub use error::{classify, ClassifiedError, ErrorContext, ErrorKind};
pub use jsonrpc::JsonRpcConnector;
pub use manager::{ConnectionManager, ManagerPhase};
pub use retry::{with_retry, with_timeout, RetryPolicy};
pub use sanitize::sanitize_tools;
pub use session::{ConnectionParams, NetworkKind, ProviderParams, SessionConnector, ToolSession};
pub use tool::{ToolDescriptor, ToolHandler, Toolset, DEFAULT_TOOLSET};
