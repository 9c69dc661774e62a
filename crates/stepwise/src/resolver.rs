//! Resolves a plan step into a concrete tool and input text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::executor::{ExecutionResult, ResultsTable};
use crate::planner::PlanStep;
use crate::tools::{render_json, ToolDefinition, ToolRegistry};

/// `{{step N}}`, `{{step_N}}`, or a textual "the result from step N" / "step N".
static STEP_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\{\{\s*step[\s_]*(\d+)\s*\}\}|(?:\bthe\s+(?:results?|outputs?|answer|value)\s+(?:of|from)\s+(?:the\s+)?)?\bstep\s+(\d+)\b",
    )
    .expect("valid step reference regex")
});

/// Inconsistencies between a step and the state of the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("step {step} requires unregistered tool '{tool}'")]
    UnregisteredTool { step: u32, tool: String },
    #[error("step {step} depends on step {dependency}, which has not run")]
    DependencyNotComputed { step: u32, dependency: u32 },
}

/// A step ready to run.
#[derive(Debug)]
pub struct ResolvedStep<'a> {
    pub tool: &'a ToolDefinition,
    pub input: String,
    /// Dependencies whose output (or failure marker) was spliced into the input.
    pub substituted: Vec<u32>,
}

pub struct Resolver<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(
        &self,
        step: &PlanStep,
        results: &ResultsTable,
    ) -> Result<ResolvedStep<'a>, ResolutionError> {
        let tool = self.registry.lookup(&step.required_tool).ok_or_else(|| {
            ResolutionError::UnregisteredTool {
                step: step.step_number,
                tool: step.required_tool.clone(),
            }
        })?;

        for &dependency in &step.dependencies {
            if !results.contains(dependency) {
                return Err(ResolutionError::DependencyNotComputed {
                    step: step.step_number,
                    dependency,
                });
            }
        }

        let mut substituted = Vec::new();
        let input = if step.raw_input.trim().is_empty() && !step.dependencies.is_empty() {
            let parts: Vec<String> = step
                .dependencies
                .iter()
                .filter_map(|dependency| results.get(*dependency))
                .map(|result| self.render_dependency(result))
                .collect();
            substituted.extend(step.dependencies.iter().copied());
            parts.join("\n")
        } else {
            STEP_REFERENCE
                .replace_all(&step.raw_input, |caps: &Captures| {
                    let referenced = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .and_then(|m| m.as_str().parse::<u32>().ok());
                    match referenced {
                        Some(n) if step.dependencies.contains(&n) => match results.get(n) {
                            Some(result) => {
                                if !substituted.contains(&n) {
                                    substituted.push(n);
                                }
                                self.render_dependency(result)
                            }
                            None => caps[0].to_string(),
                        },
                        _ => {
                            tracing::debug!(
                                step = step.step_number,
                                reference = &caps[0],
                                "reference to a step outside the dependencies left as text"
                            );
                            caps[0].to_string()
                        }
                    }
                })
                .into_owned()
        };

        Ok(ResolvedStep {
            tool,
            input: input.trim().to_string(),
            substituted,
        })
    }

    /// Rendered output of a successful dependency, or a failure marker.
    fn render_dependency(&self, result: &ExecutionResult) -> String {
        match (&result.output, result.success) {
            (Some(output), true) => {
                let render = self
                    .registry
                    .lookup(&result.tool_used)
                    .map(|tool| tool.render)
                    .unwrap_or(render_json);
                render(output)
            }
            _ => format!(
                "[step {} failed: {}]",
                result.step_number,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
