use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::fallback::{arithmetic_span, choose_tool, fallback_input, fallback_plan, quoted_text};
use super::plan::{Plan, PlanStep};
use super::planner::Planner;
use super::types::{PlanOrigin, PlannerError, PlannerOutput};
use crate::builtins::calculator;
use crate::routing::Router;
use crate::tools::ToolRegistry;

/// Clause separators, longest first so ", and then" wins over ", ".
const SEPARATORS: &[&str] = &[
    ", and then ",
    " and then ",
    ", then ",
    " then ",
    ", and ",
    " and ",
    ";",
    ", ",
];

static REFERS_BACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:the\s+(?:result|output|answer)|it|that|this)\b")
        .expect("valid back-reference regex")
});

static ARITHMETIC_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(multiply|multiplied|times|divide|divided|add|plus|increase|subtract|minus|decrease|double|triple|halve|half|square)\b",
    )
    .expect("valid arithmetic verb regex")
});

static OPERAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid operand regex"));

/// `<reference> * 4` style continuations.
static OPERATOR_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+\-*/])\s*(-?\d+(?:\.\d+)?)").expect("valid operator tail regex")
});

/// Deterministic planner that needs no language model.
///
/// Splits the request into clauses, routes each clause to a tool, and chains
/// a clause to its predecessor when it refers back to "the result" or "it".
#[derive(Debug, Clone)]
pub struct KeywordPlanner {
    router: Router,
    max_steps: usize,
}

impl KeywordPlanner {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            max_steps: 10,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Whether a clause can stand as its own step.
    fn stands_alone(&self, clause: &str, registry: &ToolRegistry) -> bool {
        self.router.best_registered(clause, registry).is_some()
            || arithmetic_span(clause).is_some()
            || REFERS_BACK.is_match(clause)
    }

    fn clauses(&self, request: &str, registry: &ToolRegistry) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for (separator, clause) in split_clauses(request) {
            match merged.last_mut() {
                Some(previous) if !self.stands_alone(&clause, registry) => {
                    previous.push_str(&separator);
                    previous.push_str(&clause);
                }
                _ => merged.push(clause),
            }
        }
        merged
    }

    fn build_steps(&self, request: &str, registry: &ToolRegistry) -> Result<Vec<PlanStep>, PlannerError> {
        let mut steps = Vec::new();
        for (index, clause) in self.clauses(request, registry).into_iter().enumerate() {
            let step_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let previous = step_number - 1;
            let chained = previous > 0 && REFERS_BACK.is_match(&clause) && quoted_text(&clause).is_none();

            let expression = chained
                .then(|| chained_expression(&clause, previous))
                .flatten()
                .filter(|_| registry.contains(calculator::TOOL_ID));
            let tool = match &expression {
                Some(_) => calculator::TOOL_ID.to_string(),
                None => choose_tool(&clause, &self.router, registry).ok_or_else(|| {
                    PlannerError::NoFallbackTool(format!("no registered tool fits \"{clause}\""))
                })?,
            };

            let step = if chained {
                let input = match expression {
                    Some(expression) => expression,
                    // Arithmetic that could not be rebuilt is passed as written so the
                    // calculator reports it instead of echoing the previous value.
                    None if tool == calculator::TOOL_ID && carries_arithmetic(&clause) => clause.clone(),
                    None => format!("the result from step {previous}"),
                };
                PlanStep::new(step_number, clause.as_str(), tool, input).depends_on(previous)
            } else {
                let input = fallback_input(&tool, &clause);
                PlanStep::new(step_number, clause.as_str(), tool, input)
            };
            steps.push(step);
        }
        Ok(steps)
    }
}

/// Calculator input for a clause that continues the previous step's result,
/// e.g. "multiply it by 4" gives `(the result from step 1) * 4`.
fn chained_expression(clause: &str, previous: u32) -> Option<String> {
    let reference = format!("(the result from step {previous})");

    if let Some(found) = REFERS_BACK.find(clause) {
        if let Some(caps) = OPERATOR_TAIL.captures(&clause[found.end()..]) {
            return Some(format!("{reference} {} {}", &caps[1], &caps[2]));
        }
    }

    let verb = ARITHMETIC_VERB.captures(clause)?[1].to_ascii_lowercase();
    let operand = OPERAND.find(clause).map(|m| m.as_str());
    let expression = match (verb.as_str(), operand) {
        ("double", _) => format!("{reference} * 2"),
        ("triple", _) => format!("{reference} * 3"),
        ("halve" | "half", _) => format!("{reference} / 2"),
        ("square", _) => format!("{reference} * {reference}"),
        ("multiply" | "multiplied" | "times", Some(n)) => format!("{reference} * {n}"),
        ("divide" | "divided", Some(n)) => format!("{reference} / {n}"),
        ("add" | "plus" | "increase", Some(n)) => format!("{reference} + {n}"),
        ("subtract" | "minus" | "decrease", Some(n)) => format!("{reference} - {n}"),
        _ => return None,
    };
    Some(expression)
}

fn carries_arithmetic(clause: &str) -> bool {
    ARITHMETIC_VERB.is_match(clause) || clause.chars().any(|c| c.is_ascii_digit())
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn plan(&self, request: &str, registry: &ToolRegistry) -> Result<PlannerOutput, PlannerError> {
        let steps = self.build_steps(request, registry)?;
        match Plan::bounded(steps, registry, self.max_steps) {
            Ok(plan) => {
                tracing::debug!(steps = plan.len(), "keyword plan built");
                Ok(PlannerOutput::new(plan, PlanOrigin::Heuristic))
            }
            Err(defects) => {
                tracing::warn!(?defects, "keyword plan rejected, using a single step");
                let plan = fallback_plan(request, &self.router, registry)?;
                Ok(PlannerOutput::new(plan, PlanOrigin::Heuristic).with_defects(defects))
            }
        }
    }
}

/// Split on clause separators outside of double quotes. Each clause is paired
/// with the separator text that preceded it (empty for the first).
fn split_clauses(request: &str) -> Vec<(String, String)> {
    let mut clauses = Vec::new();
    let mut separator = String::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut index = 0;

    while index < request.len() {
        let Some(ch) = request[index..].chars().next() else {
            break;
        };
        match ch {
            '"' => in_quotes = !in_quotes,
            '“' => in_quotes = true,
            '”' => in_quotes = false,
            _ => {}
        }

        if !in_quotes {
            let matched = SEPARATORS.iter().find(|sep| {
                request
                    .get(index..index + sep.len())
                    .map(|candidate| candidate.eq_ignore_ascii_case(sep))
                    .unwrap_or(false)
            });
            if let Some(sep) = matched {
                push_clause(&mut clauses, &separator, &request[start..index]);
                separator = request[index..index + sep.len()].to_string();
                index += sep.len();
                start = index;
                continue;
            }
        }
        index += ch.len_utf8();
    }
    push_clause(&mut clauses, &separator, &request[start..]);
    clauses
}

fn push_clause(clauses: &mut Vec<(String, String)>, separator: &str, clause: &str) {
    let clause = clause.trim().trim_end_matches(['.', '?', '!']).trim();
    if !clause.is_empty() {
        let separator = if clauses.is_empty() { "" } else { separator };
        clauses.push((separator.to_string(), clause.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn planner() -> KeywordPlanner {
        KeywordPlanner::new(Router::with_builtin_routes())
    }

    fn clause_texts(request: &str) -> Vec<String> {
        split_clauses(request).into_iter().map(|(_, c)| c).collect()
    }

    #[test]
    fn split_on_conjunctions() {
        assert_eq!(
            clause_texts("Calculate 100 + 50 and analyze the result"),
            vec!["Calculate 100 + 50", "analyze the result"]
        );
        assert_eq!(
            clause_texts("search for tokio; then count the words, and then stop."),
            vec!["search for tokio", "count the words", "stop"]
        );
    }

    #[test]
    fn split_ignores_separators_inside_quotes() {
        assert_eq!(
            clause_texts(r#"analyze "salt and pepper, then more" and calculate 2 + 2"#),
            vec![r#"analyze "salt and pepper, then more""#, "calculate 2 + 2"]
        );
    }

    #[tokio::test]
    async fn two_step_chain_with_back_reference() {
        let registry = ToolRegistry::with_builtins();
        let output = planner()
            .plan("Calculate 100 + 50 and analyze the result", &registry)
            .await
            .unwrap();
        assert_eq!(output.origin, PlanOrigin::Heuristic);

        let steps = output.plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].required_tool, "calculator");
        assert_eq!(steps[0].raw_input, "100 + 50");
        assert_eq!(steps[1].required_tool, "text_analyzer");
        assert_eq!(steps[1].raw_input, "the result from step 1");
        assert_eq!(steps[1].dependencies, BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn chained_arithmetic_keeps_the_operand() {
        let registry = ToolRegistry::with_builtins();
        let output = planner()
            .plan("Calculate 2 + 3 and multiply it by 4", &registry)
            .await
            .unwrap();
        let steps = output.plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].required_tool, "calculator");
        assert_eq!(steps[1].raw_input, "(the result from step 1) * 4");
        assert_eq!(steps[1].dependencies, BTreeSet::from([1]));
    }

    #[test]
    fn chained_expression_variants() {
        assert_eq!(
            chained_expression("divide the result by 3", 1).as_deref(),
            Some("(the result from step 1) / 3")
        );
        assert_eq!(
            chained_expression("subtract 7 from that", 2).as_deref(),
            Some("(the result from step 2) - 7")
        );
        assert_eq!(
            chained_expression("double it", 1).as_deref(),
            Some("(the result from step 1) * 2")
        );
        assert_eq!(
            chained_expression("take that * 10", 1).as_deref(),
            Some("(the result from step 1) * 10")
        );
        assert_eq!(chained_expression("analyze the result", 1), None);
        assert_eq!(chained_expression("multiply it by four", 1), None);
    }

    #[tokio::test]
    async fn unreadable_arithmetic_is_not_replaced_by_the_reference() {
        let registry = ToolRegistry::with_builtins();
        let output = planner()
            .plan("Calculate 2 + 3 and multiply it by four", &registry)
            .await
            .unwrap();
        let steps = output.plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].required_tool, "calculator");
        assert_eq!(steps[1].raw_input, "multiply it by four");
    }

    #[tokio::test]
    async fn single_calculation() {
        let registry = ToolRegistry::with_builtins();
        let output = planner().plan("Calculate 25 * 4", &registry).await.unwrap();
        let steps = output.plan.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].required_tool, "calculator");
        assert_eq!(steps[0].raw_input, "25 * 4");
    }

    #[tokio::test]
    async fn unroutable_clause_is_merged_into_previous() {
        let registry = ToolRegistry::with_builtins();
        let output = planner()
            .plan("search for salt and pepper", &registry)
            .await
            .unwrap();
        let steps = output.plan.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].required_tool, "search");
        assert_eq!(steps[0].raw_input, "salt and pepper");
    }

    #[tokio::test]
    async fn quoted_text_is_not_a_back_reference() {
        let registry = ToolRegistry::with_builtins();
        let output = planner()
            .plan(r#"calculate 2 + 2 and analyze this text: "hello world""#, &registry)
            .await
            .unwrap();
        let steps = output.plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].raw_input, "hello world");
        assert!(steps[1].dependencies.is_empty());
    }

    #[tokio::test]
    async fn conversational_request_uses_passthrough() {
        let registry = ToolRegistry::with_builtins();
        let output = planner().plan("hello there", &registry).await.unwrap();
        assert_eq!(output.plan.steps()[0].required_tool, "none");
    }

    #[tokio::test]
    async fn too_many_clauses_fall_back_to_one_step() {
        let registry = ToolRegistry::with_builtins();
        let output = KeywordPlanner::new(Router::with_builtin_routes())
            .with_max_steps(1)
            .plan("calculate 1 + 1 and calculate 2 + 2", &registry)
            .await
            .unwrap();
        assert_eq!(output.plan.len(), 1);
        assert!(!output.defects.is_empty());
    }
}
