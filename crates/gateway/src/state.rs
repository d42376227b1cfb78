use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tp_domain::config::Config;
use tp_mcp_client::ConnectionManager;

use crate::agents::AgentRegistry;

/// Shared application state handed to every command.
///
/// Fields are grouped by concern:
/// - **Core**: config, where it came from, the resolved config root
/// - **Tools**: the primary connection manager and the delegate registry
/// - **Lifecycle**: shutdown signal and its once-only guard
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub config_path: PathBuf,
    /// Root that delegate descriptor files must resolve under.
    pub root: PathBuf,

    // ── Tools ─────────────────────────────────────────────────────────
    /// Long-lived manager for the primary agent's providers.
    pub primary: Arc<ConnectionManager>,
    pub agents: Arc<AgentRegistry>,

    // ── Lifecycle ─────────────────────────────────────────────────────
    /// Cancelled once on shutdown; background loops watch it.
    pub shutdown_token: CancellationToken,
    pub(crate) shut_down: Arc<AtomicBool>,
}
