use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the primary agent's provider descriptors come from.
///
/// The descriptor document itself (JSON or YAML) is parsed and validated by
/// `tp-mcp-client`; this only names the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Descriptor document, relative to the config root.
    #[serde(default = "d_providers_file")]
    pub file: PathBuf,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            file: d_providers_file(),
        }
    }
}

/// Retry, backoff and timeout settings for a connection manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Attempts made by `reconnect` before giving up.
    #[serde(default = "d_3")]
    pub max_attempts: u32,
    /// Base delay of the reconnect backoff (doubles per attempt).
    #[serde(default = "d_5000")]
    pub retry_delay_ms: u64,
    /// Ceiling for a single backoff wait, before jitter.
    #[serde(default = "d_30000")]
    pub max_delay_ms: u64,
    /// Bound on each individual provider request.
    #[serde(default = "d_30000")]
    pub request_timeout_ms: u64,
    /// Interval of the serve-mode health probe. `0` disables it.
    #[serde(default = "d_60")]
    pub health_check_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 5000,
            max_delay_ms: 30_000,
            request_timeout_ms: 30_000,
            health_check_interval_secs: 60,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_providers_file() -> PathBuf {
    PathBuf::from("providers.json")
}
fn d_3() -> u32 {
    3
}
fn d_5000() -> u64 {
    5000
}
fn d_30000() -> u64 {
    30_000
}
fn d_60() -> u64 {
    60
}
