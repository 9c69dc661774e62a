//! Runs a plan step by step and records one result per step.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::planner::{Plan, PlanStep};
use crate::resolver::Resolver;
use crate::tools::{format_number, reported_failure, validate_schema, ToolRegistry};

const LOG_PREVIEW_CHARS: usize = 200;

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub step_number: u32,
    pub tool_used: String,
    /// The resolved input handed to the tool.
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(
        step_number: u32,
        tool_used: impl Into<String>,
        input: impl Into<String>,
        output: Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_number,
            tool_used: tool_used.into(),
            input: input.into(),
            output: Some(output),
            success: true,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(
        step_number: u32,
        tool_used: impl Into<String>,
        input: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_number,
            tool_used: tool_used.into(),
            input: input.into(),
            output: None,
            success: false,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Per-request map from step number to result, iterated in step order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    results: BTreeMap<u32, ExecutionResult>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, result: ExecutionResult) {
        self.results.insert(result.step_number, result);
    }

    pub fn get(&self, step_number: u32) -> Option<&ExecutionResult> {
        self.results.get(&step_number)
    }

    pub fn contains(&self, step_number: u32) -> bool {
        self.results.contains_key(&step_number)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.values()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.iter().filter(|r| !r.success)
    }

    pub fn any_failed(&self) -> bool {
        self.iter().any(|r| !r.success)
    }

    /// True when there is at least one result and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.is_empty() && self.iter().all(|r| !r.success)
    }
}

impl Serialize for ResultsTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.results.values())
    }
}

/// Sequential plan executor with continue-on-failure semantics.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ToolRegistry>,
    tool_timeout: Option<Duration>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("tools", &self.registry.len())
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            tool_timeout: None,
        }
    }

    pub fn with_timeout(mut self, tool_timeout: Option<Duration>) -> Self {
        self.tool_timeout = tool_timeout.filter(|limit| !limit.is_zero());
        self
    }

    pub async fn execute(&self, plan: &Plan) -> ResultsTable {
        self.execute_observed(plan, |_| {}).await
    }

    /// Run every step in order, calling `on_step` before each one starts.
    pub async fn execute_observed<F>(&self, plan: &Plan, mut on_step: F) -> ResultsTable
    where
        F: FnMut(&PlanStep),
    {
        let mut results = ResultsTable::new();
        for step in plan {
            on_step(step);
            let result = self.run_step(step, &results).await;
            if result.success {
                tracing::info!(
                    step = step.step_number,
                    tool = %result.tool_used,
                    duration_ms = result.duration_ms,
                    "step succeeded"
                );
            } else {
                tracing::warn!(
                    step = step.step_number,
                    tool = %result.tool_used,
                    error = result.error.as_deref().unwrap_or(""),
                    "step failed"
                );
            }
            results.insert(result);
        }

        tracing::info!(
            succeeded = results.succeeded().count(),
            total = results.len(),
            "plan executed"
        );
        results
    }

    async fn run_step(&self, step: &PlanStep, results: &ResultsTable) -> ExecutionResult {
        let started = Instant::now();
        let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let resolved = match Resolver::new(&self.registry).resolve(step, results) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(step = step.step_number, error = %e, "step could not be resolved");
                return ExecutionResult::failed(
                    step.step_number,
                    step.required_tool.as_str(),
                    step.raw_input.as_str(),
                    format!("internal error: {e}"),
                    elapsed_ms(),
                );
            }
        };

        let tool = resolved.tool;
        let input = resolved.input;
        tracing::debug!(
            step = step.step_number,
            tool = %tool.tool_id,
            input = %truncate_for_log(&input, LOG_PREVIEW_CHARS),
            substituted = ?resolved.substituted,
            "invoking tool"
        );

        let handler = Arc::clone(&tool.handler);
        let call_input = input.clone();
        // The handler is called inside the future so a panic while building it is caught too.
        let guarded = AssertUnwindSafe(async move { handler(call_input).await }).catch_unwind();

        let outcome = match self.tool_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return ExecutionResult::failed(
                        step.step_number,
                        tool.tool_id.as_str(),
                        input,
                        format!(
                            "tool timed out after {} s",
                            format_number(limit.as_secs_f64())
                        ),
                        elapsed_ms(),
                    );
                }
            },
            None => guarded.await,
        };

        let failure = |error: String| {
            ExecutionResult::failed(step.step_number, tool.tool_id.as_str(), input.as_str(), error, elapsed_ms())
        };

        match outcome {
            Err(panic) => failure(format!("tool panicked: {}", panic_message(panic.as_ref()))),
            Ok(Err(tool_error)) => failure(tool_error.to_string()),
            Ok(Ok(output)) => {
                if let Some(error) = reported_failure(&output) {
                    return failure(error);
                }
                if let Err(violation) = validate_schema(&output, &tool.output_schema) {
                    return failure(format!("output violates the tool contract: {violation}"));
                }
                tracing::debug!(
                    step = step.step_number,
                    output = %truncate_for_log(&output.to_string(), LOG_PREVIEW_CHARS),
                    "tool returned"
                );
                ExecutionResult::succeeded(
                    step.step_number,
                    tool.tool_id.as_str(),
                    input.as_str(),
                    output,
                    elapsed_ms(),
                )
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub(crate) fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlanStep;
    use crate::tools::{boxed_tool_future, render_json, ToolDefinition, ToolError};
    use serde_json::json;

    fn tool(id: &str, handler: crate::tools::ToolHandler) -> ToolDefinition {
        ToolDefinition {
            tool_id: id.to_string(),
            description: id.to_string(),
            input_hint: String::new(),
            output_schema: json!({"type": "object"}),
            handler,
            render: render_json,
        }
    }

    fn registry_with(extra: Vec<ToolDefinition>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::with_builtins();
        for def in extra {
            registry.register(def).unwrap();
        }
        Arc::new(registry)
    }

    fn plan(registry: &ToolRegistry, steps: Vec<PlanStep>) -> Plan {
        Plan::new(steps, registry).unwrap()
    }

    #[tokio::test]
    async fn one_result_per_step_in_order() {
        let registry = registry_with(vec![]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "add", "calculator", "100 + 50"),
                PlanStep::new(2, "analyze", "text_analyzer", "the result from step 1").depends_on(1),
            ],
        );
        let results = Executor::new(registry).execute(&plan).await;

        assert_eq!(results.len(), 2);
        let order: Vec<u32> = results.iter().map(|r| r.step_number).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(results.get(1).unwrap().output.as_ref().unwrap()["result"], 150.0);

        let second = results.get(2).unwrap();
        assert_eq!(second.input, "150");
        let output = second.output.as_ref().unwrap();
        assert_eq!(output["word_count"], 1);
        assert_eq!(output["character_count"], 3);
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_steps() {
        let registry = registry_with(vec![]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "divide", "calculator", "10 / 0"),
                PlanStep::new(2, "analyze", "text_analyzer", "the result from step 1").depends_on(1),
            ],
        );
        let results = Executor::new(registry).execute(&plan).await;

        assert_eq!(results.len(), 2);
        let first = results.get(1).unwrap();
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("division by zero"));
        assert!(first.output.is_none());

        let second = results.get(2).unwrap();
        assert!(second.success);
        assert_eq!(second.input, "[step 1 failed: division by zero]");
        assert!(results.any_failed());
        assert!(!results.all_failed());
    }

    #[tokio::test]
    async fn panicking_tool_is_contained() {
        let registry = registry_with(vec![tool(
            "boom",
            Arc::new(|_input: String| -> crate::tools::ToolFuture { panic!("kaboom") }),
        )]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "explode", "boom", "x"),
                PlanStep::new(2, "add", "calculator", "1 + 1"),
            ],
        );
        let results = Executor::new(registry).execute(&plan).await;

        assert_eq!(results.get(1).unwrap().error.as_deref(), Some("tool panicked: kaboom"));
        assert!(results.get(2).unwrap().success);
    }

    #[tokio::test]
    async fn panic_inside_future_is_contained() {
        let registry = registry_with(vec![tool(
            "late_boom",
            Arc::new(|_input: String| {
                boxed_tool_future(async {
                    let reason = String::from("late");
                    if !reason.is_empty() {
                        panic!("{reason}");
                    }
                    Ok(json!({}))
                })
            }),
        )]);
        let plan = plan(&registry, vec![PlanStep::new(1, "explode", "late_boom", "x")]);
        let results = Executor::new(registry).execute(&plan).await;
        assert_eq!(results.get(1).unwrap().error.as_deref(), Some("tool panicked: late"));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let registry = registry_with(vec![tool(
            "slow",
            Arc::new(|_input: String| {
                boxed_tool_future(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!({}))
                })
            }),
        )]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "wait", "slow", "x"),
                PlanStep::new(2, "add", "calculator", "2 + 2"),
            ],
        );
        let results = Executor::new(registry)
            .with_timeout(Some(Duration::from_millis(50)))
            .execute(&plan)
            .await;

        assert_eq!(
            results.get(1).unwrap().error.as_deref(),
            Some("tool timed out after 0.05 s")
        );
        assert!(results.get(2).unwrap().success);
    }

    #[tokio::test]
    async fn tool_error_and_contract_violation_fail_the_step() {
        let registry = registry_with(vec![
            tool(
                "erroring",
                Arc::new(|_input: String| {
                    boxed_tool_future(async {
                        Err(ToolError::ExternalService("upstream down".to_string()))
                    })
                }),
            ),
            tool(
                "liar",
                Arc::new(|_input: String| boxed_tool_future(async { Ok(json!("not an object")) })),
            ),
        ]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "call", "erroring", "x"),
                PlanStep::new(2, "call", "liar", "y"),
            ],
        );
        let results = Executor::new(registry).execute(&plan).await;

        assert_eq!(
            results.get(1).unwrap().error.as_deref(),
            Some("external service error: upstream down")
        );
        let violation = results.get(2).unwrap().error.clone().unwrap();
        assert!(violation.starts_with("output violates the tool contract:"));
        assert!(results.all_failed());
    }

    #[tokio::test]
    async fn observer_sees_every_step_before_it_runs() {
        let registry = registry_with(vec![]);
        let plan = plan(
            &registry,
            vec![
                PlanStep::new(1, "a", "none", "a"),
                PlanStep::new(2, "b", "none", "b"),
            ],
        );
        let mut seen = Vec::new();
        Executor::new(registry)
            .execute_observed(&plan, |step| seen.push(step.step_number))
            .await;
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn results_table_serializes_as_ordered_list() {
        let mut table = ResultsTable::new();
        table.insert(ExecutionResult::failed(2, "calculator", "1/0", "division by zero", 0));
        table.insert(ExecutionResult::succeeded(1, "none", "hi", json!({"input": "hi"}), 0));
        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value[0]["step_number"], 1);
        assert_eq!(value[1]["error"], "division by zero");
        assert!(value[1].get("output").is_none());
    }

    #[test]
    fn truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo", 2), "hé…");
        assert_eq!(truncate_for_log("short", 10), "short");
    }
}
