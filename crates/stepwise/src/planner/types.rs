use serde::Serialize;

use super::plan::{Plan, PlanDefect};

/// How the final plan was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanOrigin {
    /// The model's first answer was valid.
    Model,
    /// The model fixed its plan after `attempts` repair prompts.
    Repaired { attempts: u32 },
    /// The model never produced a valid plan; a single routed step was used.
    Fallback,
    /// Built by keyword rules without a model.
    Heuristic,
}

/// Planner output: the plan plus how it came about.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOutput {
    pub plan: Plan,
    pub origin: PlanOrigin,
    /// Every defect found in rejected drafts, in the order they were seen.
    pub defects: Vec<PlanDefect>,
}

impl PlannerOutput {
    pub fn new(plan: Plan, origin: PlanOrigin) -> Self {
        Self {
            plan,
            origin,
            defects: Vec::new(),
        }
    }

    pub fn with_defects(mut self, defects: Vec<PlanDefect>) -> Self {
        self.defects = defects;
        self
    }
}

/// Planning failures that reach the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlannerError {
    /// The model could not be reached for the initial plan.
    #[error("planning model unavailable: {0}")]
    ModelUnavailable(String),
    /// Not even a fallback step could be built (no usable tool registered).
    #[error("no tool available for a fallback plan: {0}")]
    NoFallbackTool(String),
}
