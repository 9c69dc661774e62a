//! Planners turn a request into an ordered, validated list of tool steps.

pub mod fallback;
pub mod keyword_planner;
pub mod llm_planner;
pub mod parse;
pub mod plan;
pub mod planner;
pub mod types;

pub use keyword_planner::KeywordPlanner;
pub use llm_planner::LlmPlanner;
pub use plan::{Plan, PlanDefect, PlanStep};
pub use planner::Planner;
pub use types::{PlanOrigin, PlannerError, PlannerOutput};
