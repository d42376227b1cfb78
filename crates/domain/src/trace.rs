use serde::Serialize;

/// Structured trace events emitted across all toolport crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// One summary per discovery pass through the schema sanitizer.
    SchemasSanitized {
        removed: usize,
        total: usize,
    },
    ProvidersInitialized {
        providers: Vec<String>,
    },
    ToolCalled {
        tool: String,
        provider: Option<String>,
        duration_ms: u64,
        ok: bool,
    },
    RetryScheduled {
        operation: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    DelegateToolsLoaded {
        agent_id: String,
        tool_count: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tp_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = TraceEvent::SchemasSanitized { removed: 2, total: 3 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "SchemasSanitized");
        assert_eq!(json["removed"], 2);
        assert_eq!(json["total"], 3);
    }
}
