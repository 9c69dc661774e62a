//! Tool contract and registry.

pub mod registry;
pub mod schema;

pub use registry::ToolRegistry;
pub use schema::{
    boxed_tool_future, format_number, render_json, reported_failure, validate_schema,
    OutputRenderer, ToolDefinition, ToolError, ToolFuture, ToolHandler, ToolResult,
};
