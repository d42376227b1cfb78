//! Serve-mode health supervisor for the primary connection manager.
//!
//! Every interval the supervisor re-runs discovery. A retryable failure
//! triggers `reconnect()`; anything else is logged and left for the next
//! tick. The loop ends when the shutdown token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tp_mcp_client::{ClassifiedError, ConnectionManager};

#[derive(Debug)]
pub enum ProbeOutcome {
    /// No session to probe.
    Idle,
    Healthy { tools: usize },
    Reconnected { tools: usize },
    Failed(ClassifiedError),
}

/// One health check against `primary`.
pub async fn probe(primary: &ConnectionManager) -> ProbeOutcome {
    if !primary.is_connected(None) {
        return ProbeOutcome::Idle;
    }
    match primary.get_available_tools().await {
        Ok(tools) => ProbeOutcome::Healthy { tools: tools.len() },
        Err(e) if e.retryable => {
            tracing::warn!(error = %e, kind = %e.kind, "primary tool discovery failed, reconnecting");
            match primary.reconnect(None).await {
                Ok(tools) => ProbeOutcome::Reconnected { tools: tools.len() },
                Err(e) => ProbeOutcome::Failed(e),
            }
        }
        Err(e) => ProbeOutcome::Failed(e),
    }
}

/// Spawn the periodic probe. Returns `None` when `interval` is zero.
pub fn spawn_health_supervisor(
    primary: Arc<ConnectionManager>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        tracing::info!("health supervisor disabled");
        return None;
    }

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; boot already ran discovery.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match probe(&primary).await {
                ProbeOutcome::Idle => {}
                ProbeOutcome::Healthy { tools } => {
                    tracing::debug!(tools, "primary providers healthy");
                }
                ProbeOutcome::Reconnected { tools } => {
                    tracing::info!(tools, "primary providers reconnected");
                }
                ProbeOutcome::Failed(e) => {
                    tracing::error!(
                        error = %e,
                        kind = %e.kind,
                        retryable = e.retryable,
                        "primary providers unhealthy"
                    );
                }
            }
        }
        tracing::debug!("health supervisor stopped");
    });

    tracing::info!(interval_secs = interval.as_secs(), "health supervisor started");
    Some(handle)
}
