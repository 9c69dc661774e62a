use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::tools::ToolRegistry;

/// One sub-task of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub step_number: u32,
    pub description: String,
    pub required_tool: String,
    pub dependencies: BTreeSet<u32>,
    /// Tool input, possibly referring to earlier steps ("the result from step 1").
    pub raw_input: String,
}

impl PlanStep {
    pub fn new(
        step_number: u32,
        description: impl Into<String>,
        required_tool: impl Into<String>,
        raw_input: impl Into<String>,
    ) -> Self {
        Self {
            step_number,
            description: description.into(),
            required_tool: required_tool.into(),
            dependencies: BTreeSet::new(),
            raw_input: raw_input.into(),
        }
    }

    pub fn depends_on(mut self, step_number: u32) -> Self {
        self.dependencies.insert(step_number);
        self
    }
}

/// Structural problem found in untrusted planner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum PlanDefect {
    #[error("the plan has no steps")]
    Empty,
    #[error("the plan could not be parsed: {0}")]
    Malformed(String),
    #[error("the plan has {count} steps but at most {max} are allowed")]
    TooManySteps { count: usize, max: usize },
    #[error("step at position {index} does not have a positive step number")]
    NonPositiveStep { index: usize },
    #[error("step number {0} is used more than once")]
    DuplicateStep(u32),
    #[error("step {step} uses unknown tool '{tool}'")]
    UnknownTool { step: u32, tool: String },
    #[error("step {step} depends on step {dependency}, which does not come before it")]
    ForwardDependency { step: u32, dependency: u32 },
    #[error("step {step} depends on step {dependency}, which is not in the plan")]
    MissingDependency { step: u32, dependency: u32 },
}

/// A validated, non-empty plan sorted by step number.
///
/// Every step names a registered tool, step numbers are positive and unique,
/// and each dependency refers to an earlier step of the same plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Validate `steps` against `registry`.
    pub fn new(steps: Vec<PlanStep>, registry: &ToolRegistry) -> Result<Self, Vec<PlanDefect>> {
        Self::validate(steps, registry, None)
    }

    /// Like [`Plan::new`], additionally rejecting plans longer than `max_steps`.
    pub fn bounded(
        steps: Vec<PlanStep>,
        registry: &ToolRegistry,
        max_steps: usize,
    ) -> Result<Self, Vec<PlanDefect>> {
        Self::validate(steps, registry, Some(max_steps))
    }

    /// One-step plan.
    pub fn single(step: PlanStep, registry: &ToolRegistry) -> Result<Self, Vec<PlanDefect>> {
        Self::new(vec![step], registry)
    }

    fn validate(
        mut steps: Vec<PlanStep>,
        registry: &ToolRegistry,
        max_steps: Option<usize>,
    ) -> Result<Self, Vec<PlanDefect>> {
        if steps.is_empty() {
            return Err(vec![PlanDefect::Empty]);
        }

        let mut defects = Vec::new();
        if let Some(max) = max_steps {
            if steps.len() > max {
                defects.push(PlanDefect::TooManySteps {
                    count: steps.len(),
                    max,
                });
            }
        }

        let mut seen = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            if step.step_number == 0 {
                defects.push(PlanDefect::NonPositiveStep { index });
            } else if !seen.insert(step.step_number) {
                defects.push(PlanDefect::DuplicateStep(step.step_number));
            }
            if !registry.contains(&step.required_tool) {
                defects.push(PlanDefect::UnknownTool {
                    step: step.step_number,
                    tool: step.required_tool.clone(),
                });
            }
        }

        for step in &steps {
            for &dependency in &step.dependencies {
                if dependency >= step.step_number {
                    defects.push(PlanDefect::ForwardDependency {
                        step: step.step_number,
                        dependency,
                    });
                } else if !seen.contains(&dependency) {
                    defects.push(PlanDefect::MissingDependency {
                        step: step.step_number,
                        dependency,
                    });
                }
            }
        }

        if !defects.is_empty() {
            return Err(defects);
        }

        steps.sort_by_key(|step| step.step_number);
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }

    pub fn get(&self, step_number: u32) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.step_number == step_number)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always `false`; a plan has at least one step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PlanStep;
    type IntoIter = std::slice::Iter<'a, PlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
