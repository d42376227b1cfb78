//! Schema sanitizer.
//!
//! Tool schemas come from providers we do not control and may use dialect
//! features downstream validators cannot represent. Rather than translate
//! them, every tool crossing this boundary is stripped of its schema and its
//! arguments are passed to the handler unvalidated.

use tp_domain::trace::TraceEvent;

use crate::tool::ToolDescriptor;

/// Copy `tools` with every `input_schema` removed. Never fails; emits one
/// [`TraceEvent::SchemasSanitized`] summary per call.
pub fn sanitize_tools(tools: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
    let removed = tools.iter().filter(|t| t.input_schema.is_some()).count();

    let sanitized = tools
        .iter()
        .map(|t| ToolDescriptor {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: None,
            handler: t.handler.clone(),
            server: t.server.clone(),
        })
        .collect();

    TraceEvent::SchemasSanitized {
        removed,
        total: tools.len(),
    }
    .emit();

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_simple_and_nested_schemas() {
        let tools = vec![
            ToolDescriptor::new("simple", "flat schema").with_schema(json!({
                "type": "object",
                "properties": { "path": { "type": "string" } }
            })),
            ToolDescriptor::new("nested", "deep schema").with_schema(json!({
                "type": "object",
                "properties": {
                    "filter": {
                        "oneOf": [
                            { "$ref": "#/$defs/range" },
                            { "type": "array", "items": { "type": "object", "properties": { "x": {} } } }
                        ]
                    }
                },
                "$defs": { "range": { "type": "object" } }
            })),
            ToolDescriptor::new("tagged", "custom").with_schema(json!({ "_def": { "typeName": "ZodObject" } })),
            ToolDescriptor::new("bare", "no schema"),
        ];

        let out = sanitize_tools(&tools);
        assert_eq!(out.len(), 4);
        for (before, after) in tools.iter().zip(&out) {
            assert_eq!(before.name, after.name);
            assert_eq!(before.description, after.description);
            assert!(after.input_schema.is_none());
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let tools = vec![ToolDescriptor::new("t", "d").with_schema(json!({ "type": "object" }))];
        let _ = sanitize_tools(&tools);
        assert!(tools[0].input_schema.is_some());
    }

    #[test]
    fn keeps_server_and_handler() {
        struct Echo;
        #[async_trait::async_trait]
        impl crate::tool::ToolHandler for Echo {
            async fn invoke(
                &self,
                params: serde_json::Value,
            ) -> Result<serde_json::Value, crate::error::ClassifiedError> {
                Ok(params)
            }
        }

        let tools = vec![ToolDescriptor::new("echo", "")
            .with_server("fs")
            .with_handler(std::sync::Arc::new(Echo))];
        let out = sanitize_tools(&tools);
        assert_eq!(out[0].server.as_deref(), Some("fs"));
        assert!(out[0].handler.is_some());
    }

    #[test]
    fn empty_list() {
        assert!(sanitize_tools(&[]).is_empty());
    }
}
