//! Tool registry: the fixed set of capabilities a plan may dispatch to.

use std::collections::HashMap;

use super::schema::ToolDefinition;
use crate::error::{AgentError, AgentResult};

/// Map of tool id to definition. Built once, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry holding every built-in tool with the default search backend.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let mut router = crate::routing::Router::new();
        if let Err(e) = crate::builtins::register_builtins(&mut registry, &mut router) {
            tracing::error!(error = %e, "failed to register built-in tools");
        }
        registry
    }

    /// Register a tool. Fails if the id is already taken.
    pub fn register(&mut self, tool: ToolDefinition) -> AgentResult<()> {
        if self.tools.contains_key(&tool.tool_id) {
            return Err(AgentError::DuplicateTool(tool.tool_id));
        }
        self.tools.insert(tool.tool_id.clone(), tool);
        Ok(())
    }

    pub fn lookup(&self, tool_id: &str) -> Option<&ToolDefinition> {
        self.tools.get(tool_id)
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    /// Registered tool ids, sorted.
    pub fn tool_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        ids.sort();
        ids
    }

    /// Registered definitions, sorted by id.
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> = self.tools.values().collect();
        defs.sort_by(|a, b| a.tool_id.cmp(&b.tool_id));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::{boxed_tool_future, render_json};
    use serde_json::json;
    use std::sync::Arc;

    fn make_tool(id: &str) -> ToolDefinition {
        ToolDefinition {
            tool_id: id.to_string(),
            description: format!("{id} tool"),
            input_hint: "anything".to_string(),
            output_schema: json!({}),
            handler: Arc::new(|_input: String| boxed_tool_future(async { Ok(json!({"ok": true})) })),
            render: render_json,
        }
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::new();
        assert_eq!(reg.len(), 0);
        assert!(reg.is_empty());
        assert!(reg.lookup("any").is_none());
        assert!(reg.tool_ids().is_empty());
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("echo")).unwrap();

        assert_eq!(reg.len(), 1);
        assert!(reg.contains("echo"));
        assert_eq!(reg.lookup("echo").unwrap().tool_id, "echo");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("dup")).unwrap();
        let err = reg.register(make_tool("dup")).unwrap_err();
        assert_eq!(err, AgentError::DuplicateTool("dup".to_string()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn tool_ids_and_definitions_are_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("b_tool")).unwrap();
        reg.register(make_tool("a_tool")).unwrap();
        reg.register(make_tool("c_tool")).unwrap();

        assert_eq!(reg.tool_ids(), vec!["a_tool", "b_tool", "c_tool"]);
        let def_ids: Vec<&str> = reg.definitions().iter().map(|d| d.tool_id.as_str()).collect();
        assert_eq!(def_ids, vec!["a_tool", "b_tool", "c_tool"]);
    }

    #[test]
    fn with_builtins_has_all_reference_tools() {
        let reg = ToolRegistry::with_builtins();
        assert_eq!(
            reg.tool_ids(),
            vec![
                "calculator",
                "commodity_price",
                "financial_data",
                "none",
                "search",
                "text_analyzer"
            ]
        );
    }

    #[tokio::test]
    async fn registered_handler_is_callable() {
        let mut reg = ToolRegistry::new();
        reg.register(make_tool("echo")).unwrap();
        let tool = reg.lookup("echo").unwrap();
        let output = (tool.handler)("hi".to_string()).await.unwrap();
        assert_eq!(output, json!({"ok": true}));
    }
}
