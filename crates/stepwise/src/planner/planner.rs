use async_trait::async_trait;

use super::types::{PlannerError, PlannerOutput};
use crate::tools::ToolRegistry;

/// Turns a request into a validated plan over the tools in `registry`.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &str, registry: &ToolRegistry)
        -> Result<PlannerOutput, PlannerError>;
}
