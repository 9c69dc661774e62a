//! Tool definitions, the handler contract, and output-schema validation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

/// Failure raised by a tool handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("external service error: {0}")]
    ExternalService(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;

/// Handler type: takes the resolved textual input, returns a JSON record.
pub type ToolHandler = Arc<dyn Fn(String) -> ToolFuture + Send + Sync>;

/// Renders a successful output as plain text for substitution and narration.
pub type OutputRenderer = fn(&Value) -> String;

pub fn boxed_tool_future<F>(future: F) -> ToolFuture
where
    F: Future<Output = ToolResult<Value>> + Send + 'static,
{
    Box::pin(future)
}

/// Complete tool definition including contract, handler and renderer.
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique identifier the planner refers to.
    pub tool_id: String,
    /// What the tool does, shown to the planner.
    pub description: String,
    /// What the input text should look like, shown to the planner.
    pub input_hint: String,
    /// JSON Schema the output of a successful call must satisfy.
    pub output_schema: Value,
    pub handler: ToolHandler,
    pub render: OutputRenderer,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("tool_id", &self.tool_id)
            .field("description", &self.description)
            .finish()
    }
}

/// Returns the failure message when a record reports `"success": false`.
pub fn reported_failure(record: &Value) -> Option<String> {
    if record.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    let message = record
        .get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or("tool reported a failure without a message");
    Some(message.to_string())
}

/// Format a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Default renderer: strings verbatim, numbers via [`format_number`], everything else as compact JSON.
pub fn render_json(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| number.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Validate a JSON value against a minimal JSON Schema subset.
///
/// Supports: `type`, `required`, `properties` (recursive).
/// An empty schema `{}` passes anything.
pub fn validate_schema(value: &Value, schema: &Value) -> ToolResult<()> {
    let schema_obj = match schema.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if schema_obj.is_empty() {
        return Ok(());
    }

    if let Some(type_val) = schema_obj.get("type") {
        let type_str = type_val.as_str().ok_or_else(|| {
            ToolError::InvalidInput("schema 'type' must be a string".to_string())
        })?;

        let matches = match type_str {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "unknown schema type: {other}"
                )));
            }
        };

        if !matches {
            return Err(ToolError::InvalidInput(format!(
                "expected type '{type_str}', got {}",
                json_type_name(value)
            )));
        }
    }

    if let (Some(required), Some(obj)) = (
        schema_obj.get("required").and_then(Value::as_array),
        value.as_object(),
    ) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                return Err(ToolError::InvalidInput(format!(
                    "missing required field: '{key}'"
                )));
            }
        }
    }

    if let (Some(props_obj), Some(val_obj)) = (
        schema_obj.get("properties").and_then(Value::as_object),
        value.as_object(),
    ) {
        for (key, prop_schema) in props_obj {
            if let Some(prop_value) = val_obj.get(key) {
                validate_schema(prop_value, prop_schema)
                    .map_err(|e| ToolError::InvalidInput(format!("field '{key}': {e}")))?;
            }
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
