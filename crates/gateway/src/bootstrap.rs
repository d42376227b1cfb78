//! AppState construction, background tasks and shutdown, shared by every
//! CLI command so they boot the same tool runtime.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use tp_domain::config::{Config, ConfigSeverity};
use tp_mcp_client::{ConnectionManager, JsonRpcConnector, SessionConnector};

use crate::agents::AgentRegistry;
use crate::health::spawn_health_supervisor;
use crate::state::AppState;

/// Validate config, bring up the primary providers and assemble every
/// delegate, using the bundled JSON-RPC connector.
pub async fn build_app_state(config: Arc<Config>, config_path: PathBuf) -> anyhow::Result<AppState> {
    let connector: Arc<dyn SessionConnector> =
        Arc::new(JsonRpcConnector::from_config(&config.connection));
    build_app_state_with(config, config_path, connector).await
}

/// [`build_app_state`] with an explicit client library.
pub async fn build_app_state_with(
    config: Arc<Config>,
    config_path: PathBuf,
    connector: Arc<dyn SessionConnector>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    let root = config.resolve_root(&config_path);
    tracing::info!(root = %root.display(), "config root resolved");

    // ── Primary providers ────────────────────────────────────────────
    let providers_file = root.join(&config.providers.file);
    let primary = Arc::new(
        ConnectionManager::new(config.connection.clone(), connector.clone())
            .with_source(&providers_file),
    );
    primary
        .initialize_servers(None)
        .await
        .with_context(|| format!("loading providers from {}", providers_file.display()))?;
    if primary.is_connected(None) {
        tracing::info!(providers = ?primary.provider_names(), "primary tool providers ready");
    } else {
        tracing::info!("no tool providers configured for the primary agent");
    }

    // ── Delegates ────────────────────────────────────────────────────
    let agents = Arc::new(AgentRegistry::build(&config, &root, connector).await);
    if !agents.is_empty() {
        tracing::info!(agent_count = agents.len(), "delegate registry ready");
    }

    Ok(AppState {
        config,
        config_path,
        root,
        primary,
        agents,
        shutdown_token: CancellationToken::new(),
        shut_down: Arc::new(AtomicBool::new(false)),
    })
}

/// Spawn the long-running background tasks for `serve`. One-shot CLI
/// commands skip this.
pub fn spawn_background_tasks(state: &AppState) {
    let interval = Duration::from_secs(state.config.connection.health_check_interval_secs);
    spawn_health_supervisor(state.primary.clone(), interval, state.shutdown_token.clone());
    tracing::info!("background tasks spawned");
}

/// Stop background tasks and disconnect the primary providers. Only the
/// first call does anything.
pub async fn shutdown(state: &AppState) {
    if state.shut_down.swap(true, Ordering::SeqCst) {
        return;
    }
    state.shutdown_token.cancel();
    state.primary.disconnect().await;
    tracing::info!("tool providers disconnected");
}
