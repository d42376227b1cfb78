use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delegate agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for a delegate agent that the primary agent can hand work to.
///
/// A delegate that names a `tools_file` gets an isolated tool subset read
/// through a short-lived connection; otherwise it shares the primary's tools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Free-form summary shown in listings.
    #[serde(default)]
    pub description: String,
    /// Private provider descriptor file, relative to the config root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_file: Option<PathBuf>,
}

impl AgentConfig {
    pub fn has_private_tools(&self) -> bool {
        self.tools_file.is_some()
    }
}
