//! Prompt construction for the model-backed components, plus extraction of
//! JSON from model replies.

use std::fmt::Write as _;

use stepwise_llm::Prompt;

use crate::executor::ResultsTable;
use crate::planner::{Plan, PlanDefect};
use crate::tools::ToolRegistry;

pub const PLANNER_ROLE: &str = "You are a strategic planner for a task agent. You break a user's request into a short sequence of steps, each handled by exactly one tool.";

pub const VALIDATOR_ROLE: &str = "You are a result validator for a task agent. You check whether the tool results are complete, consistent and plausible for the user's request.";

pub const SYNTHESIZER_ROLE: &str = "You are a response synthesizer for a task agent. You turn tool results into one clear, direct answer for the user.";

const MAX_RESULT_CHARS: usize = 2000;

pub fn planning_prompt(request: &str, registry: &ToolRegistry, max_steps: usize) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "User request: {request}\n");
    user.push_str(&planning_instructions(registry, max_steps));
    Prompt::user(user).with_system(PLANNER_ROLE)
}

pub fn repair_prompt(
    request: &str,
    registry: &ToolRegistry,
    max_steps: usize,
    previous_response: &str,
    defects: &[PlanDefect],
) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "Your previous plan for this request was invalid.\n");
    let _ = writeln!(user, "User request: {request}\n");
    let _ = writeln!(user, "Previous response:\n{previous_response}\n");
    let _ = writeln!(user, "Problems found:");
    for defect in defects {
        let _ = writeln!(user, "- {defect}");
    }
    user.push('\n');
    user.push_str(&planning_instructions(registry, max_steps));
    Prompt::user(user).with_system(PLANNER_ROLE)
}

fn planning_instructions(registry: &ToolRegistry, max_steps: usize) -> String {
    let mut text = String::from("Available tools:\n");
    for tool in registry.definitions() {
        let _ = writeln!(
            text,
            "- {}: {} Input: {}.",
            tool.tool_id, tool.description, tool.input_hint
        );
    }
    let _ = write!(
        text,
        "
Return ONLY a JSON array of at most {max_steps} steps. Each step is an object:
{{\"step\": 1, \"description\": \"what this step does\", \"tool\": \"<tool id>\", \"input\": \"<tool input>\", \"dependencies\": []}}

Rules:
- Steps are numbered 1, 2, 3, ... in execution order.
- Use only the tool ids listed above.
- When a step needs an earlier step's output, list that step in \"dependencies\" and write \"the result from step N\" in its input.
- A step may only depend on steps that come before it.
- If no tool is needed, use a single step with the \"none\" tool and the request as input.
"
    );
    text
}

pub fn validation_prompt(request: &str, plan: &Plan, results: &ResultsTable) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "User request: {request}\n");
    let _ = writeln!(user, "Execution results:\n{}", results_context(plan, results));
    user.push_str(
        "Check the results for:
1. Completeness: does every part of the request have a result?
2. Consistency: do the results agree with each other?
3. Plausibility: are the values reasonable?
4. Data quality: are there obvious errors or suspicious values?

Respond with ONLY a JSON object:
{\"valid\": true, \"confidence_score\": 0-100, \"warnings\": [\"...\"], \"errors\": [\"...\"], \"recommendation\": \"ACCEPT\" | \"REJECT\" | \"RETRY_WITH_CAUTION\", \"reasoning\": \"...\"}
",
    );
    Prompt::user(user).with_system(VALIDATOR_ROLE)
}

pub fn synthesis_prompt(
    request: &str,
    plan: &Plan,
    results: &ResultsTable,
    warnings: &[String],
) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "User request: {request}\n");
    let _ = writeln!(user, "Results:\n{}", results_context(plan, results));
    if !warnings.is_empty() {
        let _ = writeln!(user, "Validation warnings:");
        for warning in warnings {
            let _ = writeln!(user, "- {warning}");
        }
        user.push('\n');
    }
    user.push_str(
        "Write the final answer to the user.
Guidelines:
- Answer the request directly.
- Use only facts from the results above.
- If a part failed, say plainly that it could not be completed.
- Do not mention steps, tools or any internal process.
",
    );
    Prompt::user(user).with_system(SYNTHESIZER_ROLE)
}

fn results_context(plan: &Plan, results: &ResultsTable) -> String {
    let mut text = String::new();
    for step in plan {
        let _ = writeln!(text, "Step {}: {}", step.step_number, step.description);
        let _ = writeln!(text, "Tool: {}", step.required_tool);
        match results.get(step.step_number) {
            Some(result) => {
                let _ = writeln!(text, "Input: {}", result.input);
                match (&result.output, &result.error) {
                    (Some(output), _) if result.success => {
                        let rendered = output.to_string();
                        let _ = writeln!(text, "Result: {}", clip(&rendered, MAX_RESULT_CHARS));
                    }
                    (_, error) => {
                        let _ = writeln!(
                            text,
                            "Error: {}",
                            error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
            None => {
                let _ = writeln!(text, "Error: step did not run");
            }
        }
        text.push('\n');
    }
    text
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Locate the JSON payload in a model reply: the body of the first markdown
/// code fence, otherwise the span from the first `[`/`{` to the last matching
/// closer.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(open) = text.find("```") {
        let after = &text[open + 3..];
        // Skip a language tag such as `json`.
        let body_start = match after.find('\n') {
            Some(newline) if after[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                newline + 1
            }
            _ => 0,
        };
        let body = &after[body_start..];
        let body = match body.find("```") {
            Some(close) => &body[..close],
            None => body,
        };
        let body = body.trim();
        if !body.is_empty() {
            return Some(body);
        }
    }

    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| text[start..=end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionResult;
    use crate::planner::PlanStep;
    use serde_json::json;

    #[test]
    fn planning_prompt_lists_tools_and_shape() {
        let registry = ToolRegistry::with_builtins();
        let prompt = planning_prompt("Calculate 25 * 4", &registry, 10);
        assert!(prompt.system_text().starts_with("You are a strategic planner"));
        for tool in [
            "calculator",
            "text_analyzer",
            "search",
            "financial_data",
            "commodity_price",
            "none",
        ] {
            assert!(prompt.user.contains(&format!("- {tool}:")), "missing {tool}");
        }
        assert!(prompt.user.contains("the result from step N"));
        assert!(prompt.user.contains("at most 10 steps"));
        assert!(prompt.user.contains("User request: Calculate 25 * 4"));
    }

    #[test]
    fn repair_prompt_includes_previous_response_and_defects() {
        let registry = ToolRegistry::with_builtins();
        let defects = vec![PlanDefect::UnknownTool {
            step: 1,
            tool: "weather".to_string(),
        }];
        let prompt = repair_prompt("x", &registry, 5, "[{\"tool\":\"weather\"}]", &defects);
        assert!(prompt.user.starts_with("Your previous plan"));
        assert!(prompt.user.contains("[{\"tool\":\"weather\"}]"));
        assert!(prompt.user.contains("- step 1 uses unknown tool 'weather'"));
        assert!(prompt.system_text().starts_with("You are a strategic planner"));
    }

    #[test]
    fn result_context_shows_outputs_and_errors() {
        let registry = ToolRegistry::with_builtins();
        let plan = Plan::new(
            vec![
                PlanStep::new(1, "divide", "calculator", "1 / 0"),
                PlanStep::new(2, "echo", "none", "hi"),
            ],
            &registry,
        )
        .unwrap();
        let mut results = ResultsTable::new();
        results.insert(ExecutionResult::failed(1, "calculator", "1 / 0", "division by zero", 0));
        results.insert(ExecutionResult::succeeded(2, "none", "hi", json!({"input": "hi"}), 0));

        let prompt = synthesis_prompt("req", &plan, &results, &["Some steps failed".to_string()]);
        assert!(prompt.system_text().starts_with("You are a response synthesizer"));
        assert!(prompt.user.contains("Error: division by zero"));
        assert!(prompt.user.contains(r#"Result: {"input":"hi"}"#));
        assert!(prompt.user.contains("- Some steps failed"));

        let prompt = validation_prompt("req", &plan, &results);
        assert!(prompt.system_text().starts_with("You are a result validator"));
        assert!(prompt.user.contains("RETRY_WITH_CAUTION"));
    }

    #[test]
    fn extract_from_json_fence() {
        let text = "Sure!\n```json\n[{\"step\": 1}]\n```\nDone.";
        assert_eq!(extract_json_block(text), Some("[{\"step\": 1}]"));
    }

    #[test]
    fn extract_from_bare_fence() {
        let text = "```\n{\"valid\": true}\n```";
        assert_eq!(extract_json_block(text), Some("{\"valid\": true}"));
    }

    #[test]
    fn extract_from_surrounding_prose() {
        let text = "The plan is [{\"step\": 1, \"tool\": \"none\"}] as requested.";
        assert_eq!(
            extract_json_block(text),
            Some("[{\"step\": 1, \"tool\": \"none\"}]")
        );
    }

    #[test]
    fn extract_without_json_is_none() {
        assert_eq!(extract_json_block("no structured data here"), None);
    }
}
