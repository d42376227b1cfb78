//! Discovered tools and their grouping into toolsets.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClassifiedError;

/// Group name for tools whose origin provider is unknown.
pub const DEFAULT_TOOLSET: &str = "default";

/// The single invocation capability a discovered tool exposes.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, params: Value) -> Result<Value, ClassifiedError>;
}

/// A tool as seen by the host runtime.
///
/// After passing through the sanitizer `input_schema` is always `None`:
/// arguments are forwarded unvalidated and the provider is trusted to
/// reject bad input.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Option<Value>,
    pub handler: Option<Arc<dyn ToolHandler>>,
    /// Origin provider name.
    pub server: Option<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
            handler: None,
            server: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Origin provider, or [`DEFAULT_TOOLSET`].
    pub fn group(&self) -> &str {
        self.server.as_deref().unwrap_or(DEFAULT_TOOLSET)
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("server", &self.server)
            .finish()
    }
}

/// Tools from one provider, in discovery order.
#[derive(Debug, Clone)]
pub struct Toolset {
    pub provider: String,
    pub tools: Vec<ToolDescriptor>,
}

/// Partition tools by origin provider, groups ordered by first appearance.
pub fn group_toolsets(tools: Vec<ToolDescriptor>) -> Vec<Toolset> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut sets: Vec<Toolset> = Vec::new();

    for tool in tools {
        let group = tool.group().to_owned();
        match index.get(&group) {
            Some(&i) => sets[i].tools.push(tool),
            None => {
                index.insert(group.clone(), sets.len());
                sets.push(Toolset {
                    provider: group,
                    tools: vec![tool],
                });
            }
        }
    }

    sets
}

/// Collapse duplicate names: the last discovered tool wins and takes the
/// slot of the first occurrence.
pub fn dedupe_by_name(tools: Vec<ToolDescriptor>) -> Vec<ToolDescriptor> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ToolDescriptor> = Vec::with_capacity(tools.len());

    for tool in tools {
        match index.get(&tool.name) {
            Some(&i) => {
                tracing::warn!(
                    tool = %tool.name,
                    previous = out[i].group(),
                    replacement = tool.group(),
                    "tool name collision, last discovered wins"
                );
                out[i] = tool;
            }
            None => {
                index.insert(tool.name.clone(), out.len());
                out.push(tool);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, server: Option<&str>) -> ToolDescriptor {
        let t = ToolDescriptor::new(name, format!("{name} tool"));
        match server {
            Some(s) => t.with_server(s),
            None => t,
        }
    }

    #[test]
    fn groups_by_server_in_first_seen_order() {
        let sets = group_toolsets(vec![
            tool("read", Some("fs")),
            tool("fetch", Some("web")),
            tool("write", Some("fs")),
        ]);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].provider, "fs");
        let names: Vec<_> = sets[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["read", "write"]);
        assert_eq!(sets[1].provider, "web");
    }

    #[test]
    fn unknown_origin_lands_in_default_group() {
        let sets = group_toolsets(vec![tool("orphan", None)]);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].provider, DEFAULT_TOOLSET);
    }

    #[test]
    fn empty_input_gives_no_groups() {
        assert!(group_toolsets(Vec::new()).is_empty());
    }

    #[test]
    fn collision_keeps_last_in_first_slot() {
        let out = dedupe_by_name(vec![
            tool("search", Some("a")),
            tool("other", Some("a")),
            tool("search", Some("b")),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "search");
        assert_eq!(out[0].server.as_deref(), Some("b"));
        assert_eq!(out[1].name, "other");
    }
}
