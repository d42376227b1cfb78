//! The boundary between the connection manager and a tool-protocol client
//! library.
//!
//! A [`SessionConnector`] turns per-provider connection parameters into one
//! aggregate [`ToolSession`]. Building must not perform I/O; providers are
//! contacted lazily on the first [`ToolSession::get_tools`] call.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::ClassifiedError;
use crate::tool::ToolDescriptor;

/// Network transport flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkKind {
    /// Plain JSON-RPC over HTTP POST.
    Http,
    /// MCP streamable HTTP: POST with optional SSE replies and a session id.
    StreamableHttp,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Http => "http",
            NetworkKind::StreamableHttp => "streamable-http",
        }
    }
}

/// Transport-specific connection parameters for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionParams {
    /// Spawn a child process and speak over stdin/stdout.
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    /// Reach an HTTP endpoint.
    Network {
        kind: NetworkKind,
        url: String,
        headers: BTreeMap<String, String>,
    },
}

impl ConnectionParams {
    /// `stdio`, `http` or `streamable-http`.
    pub fn transport_name(&self) -> &'static str {
        match self {
            ConnectionParams::Stdio { .. } => "stdio",
            ConnectionParams::Network { kind, .. } => kind.as_str(),
        }
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionParams::Stdio { command, args, .. } if args.is_empty() => {
                write!(f, "stdio:{command}")
            }
            ConnectionParams::Stdio { command, args, .. } => {
                write!(f, "stdio:{command} {}", args.join(" "))
            }
            ConnectionParams::Network { kind, url, .. } => write!(f, "{}:{url}", kind.as_str()),
        }
    }
}

/// A named provider ready to be handed to a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderParams {
    pub name: String,
    pub connection: ConnectionParams,
}

/// Builds aggregate sessions. Implemented by the tool-protocol client library.
pub trait SessionConnector: Send + Sync {
    /// Construct a session over `providers`. No provider is contacted yet.
    fn build(&self, providers: Vec<ProviderParams>) -> Result<Box<dyn ToolSession>, ClassifiedError>;
}

/// A live aggregate over every constructed provider.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Fetch the current tool list across all providers, connecting on
    /// first use. Tools carry their origin provider in `server`.
    async fn get_tools(&self) -> Result<Vec<ToolDescriptor>, ClassifiedError>;

    /// Names of the providers this session was built over.
    fn providers(&self) -> Vec<String>;

    /// Release every provider handle. Must tolerate repeated calls.
    async fn close(&self);
}
