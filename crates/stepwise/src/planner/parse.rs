//! Parsing of model-written plans.
//!
//! Models are asked for a JSON array of steps but routinely wrap it in
//! markdown fences, nest it under a key, or use slightly different field
//! names. This module accepts those variants and reports anything else as a
//! [`PlanDefect::Malformed`].

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::plan::{PlanDefect, PlanStep};
use crate::prompts::extract_json_block;
use crate::tools::render_json;

const STEP_KEYS: &[&str] = &["step", "step_number"];
const TOOL_KEYS: &[&str] = &["tool", "required_tool", "tool_name"];
const INPUT_KEYS: &[&str] = &["input", "raw_input", "tool_input"];
const DEPENDENCY_KEYS: &[&str] = &["dependencies", "depends_on"];
const DESCRIPTION_KEYS: &[&str] = &["description", "task"];

/// Parse a model response into unvalidated plan steps.
pub fn parse_plan(response: &str) -> Result<Vec<PlanStep>, Vec<PlanDefect>> {
    let block = extract_json_block(response).ok_or_else(|| {
        vec![PlanDefect::Malformed(
            "the response does not contain JSON".to_string(),
        )]
    })?;
    let value: Value = serde_json::from_str(block)
        .map_err(|e| vec![PlanDefect::Malformed(format!("invalid JSON: {e}"))])?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("steps")
            .or_else(|| obj.get("plan"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                vec![PlanDefect::Malformed(
                    "expected an array of steps or an object with a \"steps\" array".to_string(),
                )]
            })?,
        _ => {
            return Err(vec![PlanDefect::Malformed(
                "expected a JSON array of steps".to_string(),
            )])
        }
    };

    let mut steps = Vec::with_capacity(items.len());
    let mut defects = Vec::new();
    for (position, item) in items.iter().enumerate() {
        match parse_step(position, item) {
            Ok(step) => steps.push(step),
            Err(defect) => defects.push(defect),
        }
    }

    if defects.is_empty() {
        Ok(steps)
    } else {
        Err(defects)
    }
}

/// Lowercase a tool name and turn spaces and hyphens into underscores.
pub fn normalize_tool_id(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn parse_step(position: usize, item: &Value) -> Result<PlanStep, PlanDefect> {
    let obj = item.as_object().ok_or_else(|| {
        PlanDefect::Malformed(format!("step at position {position} is not an object"))
    })?;

    let step_number = match field(obj, STEP_KEYS) {
        None | Some(Value::Null) => u32::try_from(position + 1).unwrap_or(u32::MAX),
        Some(value) => step_number(value).ok_or_else(|| {
            PlanDefect::Malformed(format!(
                "step at position {position} has an unreadable step number: {value}"
            ))
        })?,
    };

    let tool = field(obj, TOOL_KEYS)
        .and_then(Value::as_str)
        .map(normalize_tool_id)
        .filter(|tool| !tool.is_empty())
        .ok_or_else(|| PlanDefect::Malformed(format!("step {step_number} does not name a tool")))?;

    let description = field(obj, DESCRIPTION_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Run {tool}"));

    let raw_input = field(obj, INPUT_KEYS).map(input_text).unwrap_or_default();

    let dependencies = match field(obj, DEPENDENCY_KEYS) {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(value) => dependencies(value).ok_or_else(|| {
            PlanDefect::Malformed(format!(
                "step {step_number} has unreadable dependencies: {value}"
            ))
        })?,
    };

    Ok(PlanStep {
        step_number,
        description,
        required_tool: tool,
        dependencies,
        raw_input,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

/// Non-positive numbers map to 0 so validation can report them.
fn step_number(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(u32::try_from(number.max(0)).unwrap_or(u32::MAX))
}

fn dependencies(value: &Value) -> Option<BTreeSet<u32>> {
    match value {
        Value::Array(items) => items.iter().map(step_number).collect(),
        single => step_number(single).map(|n| BTreeSet::from([n])),
    }
}

fn input_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        // {"expression": "2 + 2"} and similar single-field wrappers.
        Value::Object(obj) if obj.len() == 1 => match obj.values().next() {
            Some(Value::String(s)) => s.trim().to_string(),
            _ => render_json(value),
        },
        other => render_json(other),
    }
}
