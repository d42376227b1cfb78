mod agents;
mod mcp;
mod observability;

pub use agents::*;
pub use mcp::*;
pub use observability::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Configuration root that delegate descriptor files must live under.
    /// Falls back to the directory holding the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Provider descriptor source for the primary agent.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Retry, backoff and timeout settings shared by every connection manager.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Delegate agent definitions (key = agent_id).
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Resolve the configuration root.
    ///
    /// An explicit `root` wins; otherwise the parent directory of the
    /// config file is used (or `.` when the file sits in the working dir).
    pub fn resolve_root(&self, config_path: &Path) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.connection.max_attempts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.max_attempts".into(),
                message: "max_attempts must be at least 1".into(),
            });
        }

        if self.connection.request_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.request_timeout_ms".into(),
                message: "request_timeout_ms must be greater than 0".into(),
            });
        }

        if self.connection.max_delay_ms < self.connection.retry_delay_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "connection.max_delay_ms".into(),
                message: "max_delay_ms is below retry_delay_ms; every backoff wait will be capped"
                    .into(),
            });
        }

        if self.providers.file.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "providers.file".into(),
                message: "descriptor file path must not be empty".into(),
            });
        }

        for (id, agent) in &self.agents {
            if id.trim().is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "agents".into(),
                    message: "agent id must not be empty".into(),
                });
            }
            if let Some(file) = &agent.tools_file {
                if file.is_absolute() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: format!("agents.{id}.tools_file"),
                        message: "absolute paths are skipped; use a path relative to the config root"
                            .into(),
                    });
                }
            }
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be between 0.0 and 1.0".into(),
            });
        }

        errors
    }
}
