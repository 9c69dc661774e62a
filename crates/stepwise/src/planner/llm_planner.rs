use std::sync::Arc;

use async_trait::async_trait;
use stepwise_llm::LanguageModel;

use super::fallback::fallback_plan;
use super::parse::parse_plan;
use super::plan::{Plan, PlanDefect};
use super::planner::Planner;
use super::types::{PlanOrigin, PlannerError, PlannerOutput};
use crate::prompts::{planning_prompt, repair_prompt};
use crate::routing::Router;
use crate::tools::ToolRegistry;

/// Planner backed by a language model, with repair prompts and a routed
/// single-step fallback.
pub struct LlmPlanner {
    model: Arc<dyn LanguageModel>,
    router: Router,
    max_steps: usize,
    max_repair_attempts: u32,
}

impl std::fmt::Debug for LlmPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmPlanner")
            .field("model", &self.model.model_id())
            .field("max_steps", &self.max_steps)
            .field("max_repair_attempts", &self.max_repair_attempts)
            .finish()
    }
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, router: Router) -> Self {
        Self {
            model,
            router,
            max_steps: 10,
            max_repair_attempts: 1,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    fn check(&self, response: &str, registry: &ToolRegistry) -> Result<Plan, Vec<PlanDefect>> {
        let steps = parse_plan(response)?;
        Plan::bounded(steps, registry, self.max_steps)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, request: &str, registry: &ToolRegistry) -> Result<PlannerOutput, PlannerError> {
        let prompt = planning_prompt(request, registry, self.max_steps);
        let mut response = self
            .model
            .complete(&prompt)
            .await
            .map_err(|e| PlannerError::ModelUnavailable(e.to_string()))?;

        let mut seen_defects = Vec::new();
        let mut defects = match self.check(&response, registry) {
            Ok(plan) => {
                tracing::info!(steps = plan.len(), "model plan accepted");
                return Ok(PlannerOutput::new(plan, PlanOrigin::Model));
            }
            Err(defects) => defects,
        };

        for attempt in 1..=self.max_repair_attempts {
            tracing::warn!(
                attempt,
                defects = ?defects,
                "model plan rejected, requesting a repair"
            );
            seen_defects.extend(defects.iter().cloned());

            let prompt = repair_prompt(request, registry, self.max_steps, &response, &defects);
            response = match self.model.complete(&prompt).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "repair request failed");
                    defects = Vec::new();
                    break;
                }
            };

            match self.check(&response, registry) {
                Ok(plan) => {
                    tracing::info!(steps = plan.len(), attempts = attempt, "repaired plan accepted");
                    return Ok(PlannerOutput::new(plan, PlanOrigin::Repaired { attempts: attempt })
                        .with_defects(seen_defects));
                }
                Err(next) => defects = next,
            }
        }
        seen_defects.extend(defects);

        let plan = fallback_plan(request, &self.router, registry)?;
        tracing::warn!(
            defects = seen_defects.len(),
            "no valid model plan, using a single routed step"
        );
        Ok(PlannerOutput::new(plan, PlanOrigin::Fallback).with_defects(seen_defects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_llm::testing::ScriptedModel;
    use stepwise_llm::LlmError;

    fn planner(model: ScriptedModel) -> (Arc<ScriptedModel>, LlmPlanner) {
        let model = Arc::new(model);
        let planner = LlmPlanner::new(model.clone(), Router::with_builtin_routes());
        (model, planner)
    }

    const CHAINED: &str = r#"```json
[
  {"step": 1, "description": "Add the numbers", "tool": "calculator", "input": "100 + 50", "dependencies": []},
  {"step": 2, "description": "Analyze the sum", "tool": "text_analyzer", "input": "the result from step 1", "dependencies": [1]}
]
```"#;

    #[tokio::test]
    async fn valid_first_answer_is_used() {
        let registry = ToolRegistry::with_builtins();
        let (model, planner) = planner(ScriptedModel::replies(vec![Ok(CHAINED.to_string())]));

        let output = planner.plan("Calculate 100 + 50 and analyze the result", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Model);
        assert_eq!(output.plan.len(), 2);
        assert!(output.plan.steps()[1].dependencies.contains(&1));
        assert!(output.defects.is_empty());
        assert_eq!(model.call_count(), 1);
        assert!(model.calls()[0].user.contains("Calculate 100 + 50"));
    }

    #[tokio::test]
    async fn unknown_tool_is_repaired() {
        let registry = ToolRegistry::with_builtins();
        let bad = r#"[{"step": 1, "tool": "weather", "input": "Paris"}]"#;
        let (model, planner) = planner(ScriptedModel::replies(vec![
            Ok(bad.to_string()),
            Ok(r#"[{"step": 1, "tool": "search", "input": "Paris weather"}]"#.to_string()),
        ]));

        let output = planner.plan("What's the weather in Paris?", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Repaired { attempts: 1 });
        assert_eq!(output.plan.steps()[0].required_tool, "search");
        assert_eq!(
            output.defects,
            vec![PlanDefect::UnknownTool {
                step: 1,
                tool: "weather".to_string()
            }]
        );
        let repair = &model.calls()[1];
        assert!(repair.user.starts_with("Your previous plan"));
        assert!(repair.user.contains(bad));
    }

    #[tokio::test]
    async fn persistent_forward_dependency_falls_back() {
        let registry = ToolRegistry::with_builtins();
        let forward = r#"[
            {"step": 1, "tool": "text_analyzer", "input": "the result from step 2", "dependencies": [2]},
            {"step": 2, "tool": "calculator", "input": "25 * 4"}
        ]"#;
        let (model, planner) = planner(ScriptedModel::replies(vec![
            Ok(forward.to_string()),
            Ok(forward.to_string()),
        ]));

        let output = planner.plan("Calculate 25 * 4", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Fallback);
        assert_eq!(output.plan.len(), 1);
        let step = &output.plan.steps()[0];
        assert_eq!(step.required_tool, "calculator");
        assert_eq!(step.raw_input, "25 * 4");
        assert_eq!(output.defects.len(), 2);
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn failed_repair_call_falls_back() {
        let registry = ToolRegistry::with_builtins();
        let (_, planner) = planner(ScriptedModel::replies(vec![
            Ok("I would rather not plan this.".to_string()),
            Err(LlmError::Unavailable("reset".to_string())),
        ]));

        let output = planner.plan("hello there", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Fallback);
        assert_eq!(output.plan.steps()[0].required_tool, "none");
        assert!(matches!(output.defects[0], PlanDefect::Malformed(_)));
    }

    #[tokio::test]
    async fn zero_repair_attempts_goes_straight_to_fallback() {
        let registry = ToolRegistry::with_builtins();
        let (model, planner) = planner(ScriptedModel::replies(vec![Ok("[]".to_string())]));
        let planner = planner.with_max_repair_attempts(0);

        let output = planner.plan("Calculate 2 + 2", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Fallback);
        assert_eq!(output.defects, vec![PlanDefect::Empty]);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn oversized_plan_is_rejected() {
        let registry = ToolRegistry::with_builtins();
        let long = r#"[
            {"step": 1, "tool": "none", "input": "a"},
            {"step": 2, "tool": "none", "input": "b"},
            {"step": 3, "tool": "none", "input": "c"}
        ]"#;
        let (_, planner) = planner(ScriptedModel::replies(vec![Ok(long.to_string())]));
        let planner = planner.with_max_steps(2).with_max_repair_attempts(0);

        let output = planner.plan("say hi", &registry).await.unwrap();

        assert_eq!(output.origin, PlanOrigin::Fallback);
        assert_eq!(output.defects, vec![PlanDefect::TooManySteps { count: 3, max: 2 }]);
    }

    #[tokio::test]
    async fn model_outage_is_reported() {
        let registry = ToolRegistry::with_builtins();
        let (_, planner) = planner(ScriptedModel::unavailable());

        let err = planner.plan("Calculate 1 + 1", &registry).await.unwrap_err();

        assert!(matches!(err, PlannerError::ModelUnavailable(_)));
    }
}
