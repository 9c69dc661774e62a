//! Rule-based tool choice and input extraction.
//!
//! Shared by the keyword planner and by the model planner's single-step
//! fallback.

use std::sync::LazyLock;

use regex::Regex;

use super::plan::{Plan, PlanStep};
use super::types::PlannerError;
use crate::builtins::{calculator, market, passthrough, search, text_analyzer};
use crate::routing::Router;
use crate::tools::ToolRegistry;

static ARITHMETIC_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?[0-9(][0-9+\-*/().\s]*").expect("valid arithmetic regex"));

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|“([^”]+)”|(?:^|\s)'([^']+)'"#).expect("valid quote regex")
});

static SEARCH_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?(?:search\s+(?:the\s+web\s+)?for|search|look\s+up|find\s+out|find)\s+")
        .expect("valid search prefix regex")
});

/// Longest run of arithmetic characters that contains a digit and an operator,
/// or failing that, the longest numeric run.
pub fn arithmetic_span(text: &str) -> Option<String> {
    let spans: Vec<&str> = ARITHMETIC_SPAN
        .find_iter(text)
        .map(|m| m.as_str().trim().trim_end_matches('.').trim())
        .filter(|span| span.chars().any(|c| c.is_ascii_digit()))
        .collect();

    spans
        .iter()
        .copied()
        .filter(|span| has_operator(span))
        .max_by_key(|span| span.len())
        .or_else(|| spans.iter().copied().max_by_key(|span| span.len()))
        .map(str::to_string)
}

fn has_operator(span: &str) -> bool {
    span.chars().any(|c| matches!(c, '+' | '-' | '*' | '/'))
}

/// First quoted passage in `text`.
pub fn quoted_text(text: &str) -> Option<String> {
    QUOTED.captures(text).and_then(|caps| {
        (1..=3)
            .find_map(|group| caps.get(group))
            .map(|m| m.as_str().trim().to_string())
            .filter(|quoted| !quoted.is_empty())
    })
}

/// The request with a leading "search for" / "look up" / "find" removed.
pub fn search_query(text: &str) -> String {
    let stripped = SEARCH_PREFIX.replace(text, "");
    stripped
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .trim()
        .to_string()
}

/// Best-effort tool input for `tool_id` extracted from free text.
pub fn fallback_input(tool_id: &str, text: &str) -> String {
    let text = text.trim();
    match tool_id {
        calculator::TOOL_ID => arithmetic_span(text).unwrap_or_else(|| text.to_string()),
        text_analyzer::TOOL_ID => quoted_text(text)
            .or_else(|| {
                text.split_once(':')
                    .map(|(_, rest)| rest.trim().to_string())
                    .filter(|rest| !rest.is_empty())
            })
            .unwrap_or_else(|| text.to_string()),
        search::TOOL_ID => {
            let query = search_query(text);
            if query.is_empty() {
                text.to_string()
            } else {
                query
            }
        }
        market::FINANCIAL_TOOL_ID => {
            market::symbol_in_text(text).unwrap_or_else(|| text.to_string())
        }
        market::COMMODITY_TOOL_ID => market::commodity_in_text(text)
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string()),
        _ => text.to_string(),
    }
}

/// The registered tool that best fits `text`: the router's pick, then the
/// calculator when the text holds arithmetic, then the pass-through tool.
pub fn choose_tool(text: &str, router: &Router, registry: &ToolRegistry) -> Option<String> {
    if let Some(tool) = router.best_registered(text, registry) {
        return Some(tool);
    }
    let looks_arithmetic = arithmetic_span(text)
        .map(|span| has_operator(&span))
        .unwrap_or(false);
    if looks_arithmetic && registry.contains(calculator::TOOL_ID) {
        return Some(calculator::TOOL_ID.to_string());
    }
    registry
        .contains(passthrough::TOOL_ID)
        .then(|| passthrough::TOOL_ID.to_string())
}

/// Single-step plan that handles the whole request with the best-fitting tool.
pub fn fallback_plan(
    request: &str,
    router: &Router,
    registry: &ToolRegistry,
) -> Result<Plan, PlannerError> {
    let tool = choose_tool(request, router, registry).ok_or_else(|| {
        PlannerError::NoFallbackTool(format!(
            "neither a routed tool nor '{}' is registered",
            passthrough::TOOL_ID
        ))
    })?;
    let input = fallback_input(&tool, request);
    let step = PlanStep::new(1, request.trim(), tool.as_str(), input);
    Plan::single(step, registry).map_err(|defects| {
        let detail: Vec<String> = defects.iter().map(|d| d.to_string()).collect();
        PlannerError::NoFallbackTool(detail.join("; "))
    })
}
