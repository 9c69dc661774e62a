//! The `none` tool: echoes its input when no capability is needed.

use serde_json::{json, Value};

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::{boxed_tool_future, ToolDefinition};

pub const TOOL_ID: &str = "none";

pub fn register(registry: &mut ToolRegistry, router: &mut Router) -> AgentResult<()> {
    registry.register(definition())?;
    router.register(routing_metadata());
    Ok(())
}

pub(crate) fn routing_metadata() -> RoutingMetadata {
    RoutingMetadata {
        tool_id: TOOL_ID.to_string(),
        keywords: vec!["hello".into(), "hi".into(), "thanks".into()],
        examples: vec!["thank you".into(), "good morning".into()],
        verbs: vec!["greet".into()],
        objects: vec![],
    }
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        tool_id: TOOL_ID.to_string(),
        description: "No tool needed; passes the text through unchanged.".to_string(),
        input_hint: "the text to carry forward".to_string(),
        output_schema: json!({
            "type": "object",
            "required": ["message", "input"],
            "properties": {
                "message": {"type": "string"},
                "input": {"type": "string"}
            }
        }),
        handler: std::sync::Arc::new(|input: String| {
            boxed_tool_future(async move {
                Ok(json!({
                    "message": "No tool execution needed",
                    "input": input,
                }))
            })
        }),
        render,
    }
}

fn render(output: &Value) -> String {
    output
        .get("input")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
