//! Final answer composition.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use stepwise_llm::LanguageModel;

use crate::executor::{ExecutionResult, ResultsTable};
use crate::planner::Plan;
use crate::prompts::synthesis_prompt;
use crate::tools::{render_json, ToolRegistry};
use crate::validator::ValidationReport;

const FAILURE_WORDS: &[&str] = &["fail", "unable", "could not", "couldn't", "error", "not able"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Model,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub answer: String,
    pub source: AnswerSource,
}

#[derive(Clone)]
pub struct Synthesizer {
    model: Option<Arc<dyn LanguageModel>>,
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("model", &self.model.as_ref().map(|model| model.model_id()))
            .finish()
    }
}

impl Synthesizer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, registry: Arc<ToolRegistry>) -> Self {
        Self { model, registry }
    }

    /// Compose the answer. Never empty; mentions every failed step.
    pub async fn synthesize(
        &self,
        request: &str,
        plan: &Plan,
        results: &ResultsTable,
        validation: Option<&ValidationReport>,
    ) -> Synthesis {
        if let Some(model) = &self.model {
            let warnings = validation
                .map(|report| report.warnings.as_slice())
                .unwrap_or_default();
            let prompt = synthesis_prompt(request, plan, results, warnings);
            match model.complete(&prompt).await {
                Ok(answer) if !answer.trim().is_empty() => {
                    return Synthesis {
                        answer: self.acknowledge_failures(answer.trim().to_string(), plan, results),
                        source: AnswerSource::Model,
                    };
                }
                Ok(_) => tracing::warn!("synthesis model returned an empty answer, using template"),
                Err(e) => tracing::warn!(error = %e, "synthesis model unavailable, using template"),
            }
        }

        Synthesis {
            answer: self.template(request, plan, results),
            source: AnswerSource::Template,
        }
    }

    fn template(&self, request: &str, plan: &Plan, results: &ResultsTable) -> String {
        let mut answer = String::new();
        if !results.is_empty() && results.all_failed() {
            answer.push_str("I was unable to complete this request because every part of it failed:");
            self.push_failures(&mut answer, plan, results);
            return answer;
        }

        let _ = write!(answer, "Here is what I found for \"{}\":", request.trim());
        for result in results.succeeded() {
            let _ = write!(
                answer,
                "\n- {}: {}",
                describe(plan, result),
                self.render(result)
            );
        }
        if results.any_failed() {
            answer.push_str("\nSome parts could not be completed:");
            self.push_failures(&mut answer, plan, results);
        }
        answer
    }

    fn acknowledge_failures(&self, mut answer: String, plan: &Plan, results: &ResultsTable) -> String {
        let lowered = answer.to_lowercase();
        let unacknowledged: Vec<&ExecutionResult> = results
            .failed()
            .filter(|result| !acknowledges(&lowered, plan, result))
            .collect();
        if unacknowledged.is_empty() {
            return answer;
        }
        tracing::debug!(
            missing = unacknowledged.len(),
            "answer omitted failed steps, appending a note"
        );
        answer.push_str("\n\nNote: some parts of this request could not be completed:");
        for result in unacknowledged {
            push_failure(&mut answer, plan, result);
        }
        answer
    }

    fn push_failures(&self, answer: &mut String, plan: &Plan, results: &ResultsTable) {
        for result in results.failed() {
            push_failure(answer, plan, result);
        }
    }

    fn render(&self, result: &ExecutionResult) -> String {
        let Some(output) = &result.output else {
            return "(no output)".to_string();
        };
        let rendered = match self.registry.lookup(&result.tool_used) {
            Some(tool) => (tool.render)(output),
            None => render_json(output),
        };
        if rendered.trim().is_empty() {
            "(no output)".to_string()
        } else {
            rendered
        }
    }
}

fn describe(plan: &Plan, result: &ExecutionResult) -> String {
    plan.get(result.step_number)
        .map(|step| step.description.trim())
        .filter(|description| !description.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("step {}", result.step_number))
}

fn push_failure(answer: &mut String, plan: &Plan, result: &ExecutionResult) {
    let _ = write!(
        answer,
        "\n- {}: {}",
        describe(plan, result),
        result.error.as_deref().unwrap_or("unknown error")
    );
}

/// A failed step counts as acknowledged when the answer admits a failure and
/// names that step, by its description or by its error.
fn acknowledges(lowered_answer: &str, plan: &Plan, result: &ExecutionResult) -> bool {
    let admits_failure = FAILURE_WORDS.iter().any(|word| lowered_answer.contains(word));
    let names = |text: &str| {
        let text = text.trim().to_lowercase();
        !text.is_empty() && lowered_answer.contains(&text)
    };
    admits_failure
        && (names(&describe(plan, result)) || result.error.as_deref().is_some_and(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlanStep;
    use serde_json::json;
    use stepwise_llm::testing::ScriptedModel;
    use stepwise_llm::LlmError;

    fn setup() -> (Arc<ToolRegistry>, Plan) {
        let registry = Arc::new(ToolRegistry::with_builtins());
        let plan = Plan::new(
            vec![
                PlanStep::new(1, "Add the numbers", "calculator", "100 + 50"),
                PlanStep::new(2, "Divide by zero", "calculator", "1 / 0").depends_on(1),
            ],
            &registry,
        )
        .unwrap();
        (registry, plan)
    }

    fn sum() -> ExecutionResult {
        ExecutionResult::succeeded(
            1,
            "calculator",
            "100 + 50",
            json!({"expression": "100 + 50", "result": 150.0, "success": true}),
            0,
        )
    }

    fn division() -> ExecutionResult {
        ExecutionResult::failed(2, "calculator", "1 / 0", "division by zero", 0)
    }

    fn table(results: Vec<ExecutionResult>) -> ResultsTable {
        let mut table = ResultsTable::new();
        for result in results {
            table.insert(result);
        }
        table
    }

    #[tokio::test]
    async fn template_lists_outputs_and_failures() {
        let (registry, plan) = setup();
        let synthesizer = Synthesizer::new(None, registry);

        let synthesis = synthesizer
            .synthesize("Add then divide", &plan, &table(vec![sum(), division()]), None)
            .await;

        assert_eq!(synthesis.source, AnswerSource::Template);
        assert_eq!(
            synthesis.answer,
            "Here is what I found for \"Add then divide\":\n- Add the numbers: 150\nSome parts could not be completed:\n- Divide by zero: division by zero"
        );
    }

    #[tokio::test]
    async fn template_when_everything_failed() {
        let (registry, plan) = setup();
        let synthesizer = Synthesizer::new(None, registry);
        let results = table(vec![
            ExecutionResult::failed(1, "calculator", "100 + 50", "tool timed out after 30 s", 0),
            division(),
        ]);

        let synthesis = synthesizer.synthesize("x", &plan, &results, None).await;

        assert!(synthesis.answer.starts_with("I was unable to complete this request"));
        assert!(synthesis.answer.contains("- Add the numbers: tool timed out after 30 s"));
        assert!(synthesis.answer.contains("- Divide by zero: division by zero"));
    }

    #[tokio::test]
    async fn model_answer_is_used() {
        let (registry, plan) = setup();
        let model = Arc::new(ScriptedModel::replies(vec![Ok("  The sum is 150.  ".to_string())]));
        let synthesizer = Synthesizer::new(Some(model.clone()), registry);

        let synthesis = synthesizer.synthesize("x", &plan, &table(vec![sum()]), None).await;

        assert_eq!(synthesis.source, AnswerSource::Model);
        assert_eq!(synthesis.answer, "The sum is 150.");
        assert!(model.calls()[0].system_text().starts_with("You are a response synthesizer"));
    }

    #[tokio::test]
    async fn silent_failure_gets_a_note() {
        let (registry, plan) = setup();
        let model = Arc::new(ScriptedModel::replies(vec![Ok("The sum is 150.".to_string())]));
        let synthesizer = Synthesizer::new(Some(model), registry);

        let synthesis = synthesizer
            .synthesize("x", &plan, &table(vec![sum(), division()]), None)
            .await;

        assert!(synthesis.answer.starts_with("The sum is 150."));
        assert!(synthesis.answer.contains("could not be completed"));
        assert!(synthesis.answer.contains("- Divide by zero: division by zero"));
    }

    #[tokio::test]
    async fn acknowledged_failure_is_left_alone() {
        let (registry, plan) = setup();
        let reply = "The sum is 150, but I couldn't divide by zero.";
        let model = Arc::new(ScriptedModel::replies(vec![Ok(reply.to_string())]));
        let synthesizer = Synthesizer::new(Some(model), registry);

        let synthesis = synthesizer
            .synthesize("x", &plan, &table(vec![sum(), division()]), None)
            .await;

        assert_eq!(synthesis.answer, reply);
    }

    #[tokio::test]
    async fn outage_or_blank_answer_falls_back_to_template() {
        let (registry, plan) = setup();
        for reply in [Err(LlmError::Unavailable("down".to_string())), Ok("   ".to_string())] {
            let model = Arc::new(ScriptedModel::replies(vec![reply]));
            let synthesizer = Synthesizer::new(Some(model), Arc::clone(&registry));
            let synthesis = synthesizer.synthesize("x", &plan, &table(vec![sum()]), None).await;
            assert_eq!(synthesis.source, AnswerSource::Template);
            assert!(synthesis.answer.contains("150"));
        }
    }

    #[tokio::test]
    async fn validation_warnings_reach_the_prompt() {
        let (registry, plan) = setup();
        let model = Arc::new(ScriptedModel::replies(vec![Ok("Done, with one error.".to_string())]));
        let synthesizer = Synthesizer::new(Some(model.clone()), registry);
        let results = table(vec![sum(), division()]);
        let report = crate::validator::Validator::heuristic(&results);

        synthesizer.synthesize("x", &plan, &results, Some(&report)).await;

        assert!(model.calls()[0].user.contains("- Some steps failed"));
    }

    #[tokio::test]
    async fn failure_word_without_the_failed_step_gets_a_note() {
        let (registry, plan) = setup();
        let reply = "The sum is 150, computed without error.";
        let model = Arc::new(ScriptedModel::replies(vec![Ok(reply.to_string())]));
        let synthesizer = Synthesizer::new(Some(model), registry);

        let synthesis = synthesizer
            .synthesize("x", &plan, &table(vec![sum(), division()]), None)
            .await;

        assert!(synthesis.answer.starts_with(reply));
        assert!(synthesis.answer.contains("- Divide by zero: division by zero"));
    }

    #[test]
    fn acknowledgement_needs_a_failure_word_and_the_step() {
        let (_, plan) = setup();
        let failed = division();
        assert!(acknowledges("unable to finish: division by zero", &plan, &failed));
        assert!(acknowledges("i could not divide by zero.", &plan, &failed));
        assert!(!acknowledges("nothing failed", &plan, &failed));
        assert!(!acknowledges("divide by zero gives 7", &plan, &failed));
    }
}
