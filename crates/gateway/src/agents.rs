//! Delegate agents and their tool lifecycle.
//!
//! The primary agent keeps one connection manager for the life of the
//! process. A delegate that declares a private `tools_file` instead gets a
//! short-lived manager: built, initialized against that file, asked once
//! for its tools and disconnected before the delegate itself is assembled.
//! Delegates never hold provider connections while idle.
//!
//! Anything that goes wrong while locating, reading or listing a delegate's
//! file costs that delegate its tools, never startup.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tp_domain::config::{AgentConfig, Config, ConnectionConfig};
use tp_domain::trace::TraceEvent;
use tp_mcp_client::{ClassifiedError, ConnectionManager, SessionConnector, ToolDescriptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DelegateAgent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a delegate's tools come from.
#[derive(Debug, Clone)]
pub enum DelegateTools {
    /// Uses the primary agent's live tools.
    Shared,
    /// A snapshot read through a dedicated, already-closed connection.
    Isolated(Vec<ToolDescriptor>),
}

#[derive(Debug, Clone)]
pub struct DelegateAgent {
    pub id: String,
    pub description: String,
    pub tools: DelegateTools,
}

impl DelegateAgent {
    pub fn is_isolated(&self) -> bool {
        matches!(self.tools, DelegateTools::Isolated(_))
    }

    /// Tools visible to this delegate, given the primary's current count.
    pub fn tool_count(&self, shared_count: usize) -> usize {
        match &self.tools {
            DelegateTools::Shared => shared_count,
            DelegateTools::Isolated(tools) => tools.len(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<DelegateAgent>>,
}

impl AgentRegistry {
    /// Assemble every configured delegate. Isolated tool sets are loaded
    /// one delegate at a time, each through its own manager.
    pub async fn build(
        config: &Config,
        root: &Path,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        let mut agents = BTreeMap::new();

        for (id, cfg) in &config.agents {
            let tools = delegate_tools(id, cfg, root, &config.connection, connector.clone()).await;
            let agent = DelegateAgent {
                id: id.clone(),
                description: cfg.description.clone(),
                tools,
            };

            tracing::info!(
                agent_id = %id,
                isolated = agent.is_isolated(),
                "registered delegate agent"
            );
            agents.insert(id.clone(), Arc::new(agent));
        }

        Self { agents }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<DelegateAgent>> {
        self.agents.get(agent_id).cloned()
    }

    /// All delegates, ordered by id.
    pub fn list(&self) -> Vec<Arc<DelegateAgent>> {
        self.agents.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

async fn delegate_tools(
    agent_id: &str,
    cfg: &AgentConfig,
    root: &Path,
    options: &ConnectionConfig,
    connector: Arc<dyn SessionConnector>,
) -> DelegateTools {
    let Some(requested) = &cfg.tools_file else {
        return DelegateTools::Shared;
    };

    let path = match resolve_descriptor_path(root, requested) {
        Ok(path) => path,
        Err(reason) => {
            tracing::warn!(
                agent_id,
                path = %requested.display(),
                reason = %reason,
                "skipping delegate tools file"
            );
            return DelegateTools::Isolated(Vec::new());
        }
    };

    DelegateTools::Isolated(load_isolated_tools(agent_id, &path, options, connector).await)
}

/// Run the construct → initialize → list → disconnect sequence against
/// one descriptor file. Failures degrade to an empty list.
pub async fn load_isolated_tools(
    agent_id: &str,
    path: &Path,
    options: &ConnectionConfig,
    connector: Arc<dyn SessionConnector>,
) -> Vec<ToolDescriptor> {
    let manager = ConnectionManager::new(options.clone(), connector).with_source(path);

    let listed: Result<Vec<ToolDescriptor>, ClassifiedError> = async {
        manager.initialize_servers(None).await?;
        manager.get_available_tools().await
    }
    .await;
    manager.disconnect().await;

    match listed {
        Ok(tools) => {
            TraceEvent::DelegateToolsLoaded {
                agent_id: agent_id.to_owned(),
                tool_count: tools.len(),
            }
            .emit();
            tools
        }
        Err(e) => {
            tracing::warn!(
                agent_id,
                path = %path.display(),
                kind = %e.kind,
                error = %e,
                "failed to load delegate tools, continuing without them"
            );
            Vec::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path containment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve a delegate descriptor path under `root`.
///
/// The request must be relative, free of `..` components, must exist, and
/// once canonicalized (following symlinks) must still sit under the
/// canonical root.
pub fn resolve_descriptor_path(root: &Path, requested: &Path) -> Result<PathBuf, String> {
    if requested.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the config root (got '{}')",
            requested.display()
        ));
    }
    if requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("path must not contain '..' components".to_owned());
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("cannot resolve config root '{}': {e}", root.display()))?;
    let candidate = canonical_root.join(requested);
    let resolved = candidate
        .canonicalize()
        .map_err(|e| format!("cannot resolve '{}': {e}", candidate.display()))?;

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "'{}' resolves outside the config root",
            requested.display()
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tool, FakeConnector};
    use std::sync::atomic::Ordering;

    const REMOTE_DOC: &str = r#"{ "mcpServers": { "search": { "url": "https://search.example.com/mcp" } } }"#;

    fn connector() -> FakeConnector {
        FakeConnector::new(vec![tool("web_search", "search"), tool("read_file", "fs")])
    }

    fn config_with(agents: &[(&str, Option<&str>)]) -> Config {
        let mut config = Config::default();
        for (id, file) in agents {
            config.agents.insert(
                (*id).to_owned(),
                AgentConfig {
                    description: format!("{id} delegate"),
                    tools_file: file.map(PathBuf::from),
                },
            );
        }
        config
    }

    #[test]
    fn containment_rejects_absolute() {
        let root = tempfile::tempdir().unwrap();
        let abs = if cfg!(windows) { "C:\\tools.json" } else { "/etc/tools.json" };
        let err = resolve_descriptor_path(root.path(), Path::new(abs)).unwrap_err();
        assert!(err.contains("absolute paths are not allowed"));
    }

    #[test]
    fn containment_rejects_parent_traversal() {
        let root = tempfile::tempdir().unwrap();
        let err = resolve_descriptor_path(root.path(), Path::new("agents/../../secret.json")).unwrap_err();
        assert!(err.contains(".."));
    }

    #[test]
    fn containment_rejects_missing_file() {
        let root = tempfile::tempdir().unwrap();
        assert!(resolve_descriptor_path(root.path(), Path::new("nope.json")).is_err());
    }

    #[test]
    fn containment_accepts_nested_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("agents")).unwrap();
        std::fs::write(root.path().join("agents/research.json"), "{}").unwrap();

        let resolved = resolve_descriptor_path(root.path(), Path::new("agents/research.json")).unwrap();
        assert!(resolved.ends_with("agents/research.json"));
    }

    #[cfg(unix)]
    #[test]
    fn containment_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("tools.json"), "{}").unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("tools.json"), root.path().join("tools.json")).unwrap();

        let err = resolve_descriptor_path(root.path(), Path::new("tools.json")).unwrap_err();
        assert!(err.contains("outside the config root"));
    }

    #[tokio::test]
    async fn delegate_without_file_shares_primary_tools() {
        let root = tempfile::tempdir().unwrap();
        let fake = connector();
        let registry = AgentRegistry::build(&config_with(&[("writer", None)]), root.path(), Arc::new(fake.clone())).await;

        let writer = registry.get("writer").unwrap();
        assert!(matches!(writer.tools, DelegateTools::Shared));
        assert_eq!(writer.tool_count(7), 7);
        assert!(fake.counters.built.lock().is_empty());
    }

    #[tokio::test]
    async fn isolated_tools_are_read_then_connection_dropped() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("research.json"), REMOTE_DOC).unwrap();
        let fake = connector();

        let registry = AgentRegistry::build(
            &config_with(&[("research", Some("research.json"))]),
            root.path(),
            Arc::new(fake.clone()),
        )
        .await;

        let research = registry.get("research").unwrap();
        let DelegateTools::Isolated(tools) = &research.tools else {
            panic!("expected isolated tools");
        };
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "web_search");
        assert!(tools[0].input_schema.is_none());
        assert_eq!(fake.counters.built.lock().len(), 1);
        assert_eq!(fake.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_file_degrades_to_zero_tools() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(root.path().join("ok.json"), REMOTE_DOC).unwrap();

        let registry = AgentRegistry::build(
            &config_with(&[("broken", Some("broken.json")), ("ok", Some("ok.json"))]),
            root.path(),
            Arc::new(connector()),
        )
        .await;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("broken").unwrap().tool_count(0), 0);
        assert_eq!(registry.get("ok").unwrap().tool_count(0), 1);
    }

    #[tokio::test]
    async fn escaping_path_is_skipped_without_connecting() {
        let root = tempfile::tempdir().unwrap();
        let fake = connector();

        let registry = AgentRegistry::build(
            &config_with(&[("sneaky", Some("../outside.json"))]),
            root.path(),
            Arc::new(fake.clone()),
        )
        .await;

        let sneaky = registry.get("sneaky").unwrap();
        assert!(sneaky.is_isolated());
        assert_eq!(sneaky.tool_count(5), 0);
        assert!(fake.counters.built.lock().is_empty());
    }

    #[tokio::test]
    async fn discovery_failure_still_disconnects() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("research.json"), REMOTE_DOC).unwrap();
        let fake = connector();
        fake.counters.failing.store(1, Ordering::SeqCst);

        let tools = load_isolated_tools(
            "research",
            &root.path().join("research.json"),
            &ConnectionConfig::default(),
            Arc::new(fake.clone()),
        )
        .await;

        assert!(tools.is_empty());
        assert_eq!(fake.counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let root = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::build(
            &config_with(&[("zeta", None), ("alpha", None)]),
            root.path(),
            Arc::new(connector()),
        )
        .await;
        let ids: Vec<_> = registry.list().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
