//! Text statistics tool.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::{boxed_tool_future, format_number, ToolDefinition, ToolError};

pub const TOOL_ID: &str = "text_analyzer";

pub fn register(registry: &mut ToolRegistry, router: &mut Router) -> AgentResult<()> {
    registry.register(definition())?;
    router.register(routing_metadata());
    Ok(())
}

pub(crate) fn routing_metadata() -> RoutingMetadata {
    RoutingMetadata {
        tool_id: TOOL_ID.to_string(),
        keywords: vec![
            "analyze".into(),
            "analyse".into(),
            "statistics".into(),
            "readability".into(),
            "words".into(),
        ],
        examples: vec![
            "how many words".into(),
            "word count".into(),
            "how long is".into(),
        ],
        verbs: vec!["analyze".into(), "analyse".into(), "count".into(), "measure".into()],
        objects: vec![
            "text".into(),
            "sentence".into(),
            "sentences".into(),
            "paragraph".into(),
            "characters".into(),
        ],
    }
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        tool_id: TOOL_ID.to_string(),
        description: "Computes statistics about a piece of text: words, characters, sentences and readability."
            .to_string(),
        input_hint: "the text to analyze".to_string(),
        output_schema: json!({
            "type": "object",
            "required": ["word_count", "character_count", "sentence_count", "readability"],
            "properties": {
                "word_count": {"type": "integer"},
                "unique_words": {"type": "integer"},
                "character_count": {"type": "integer"},
                "character_count_no_spaces": {"type": "integer"},
                "sentence_count": {"type": "integer"},
                "avg_word_length": {"type": "number"},
                "avg_sentence_length": {"type": "number"},
                "longest_word": {"type": "string"},
                "longest_word_length": {"type": "integer"},
                "readability": {"type": "string"}
            }
        }),
        handler: std::sync::Arc::new(|input: String| {
            boxed_tool_future(async move {
                serde_json::to_value(analyze(&input))
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
            })
        }),
        render,
    }
}

/// Statistics produced for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStats {
    pub word_count: usize,
    pub unique_words: usize,
    pub character_count: usize,
    pub character_count_no_spaces: usize,
    pub sentence_count: usize,
    pub avg_word_length: f64,
    pub avg_sentence_length: f64,
    pub longest_word: String,
    pub longest_word_length: usize,
    pub readability: &'static str,
}

/// Analyze `text`. Words are whitespace-separated; sentences are the
/// non-empty segments between runs of `.`, `!` and `?`.
pub fn analyze(text: &str) -> TextStats {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len();
    let unique_words = words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<HashSet<_>>()
        .len();

    let sentence_count = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();

    let total_word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_length = if word_count > 0 {
        total_word_chars as f64 / word_count as f64
    } else {
        0.0
    };
    let avg_sentence_length = if sentence_count > 0 {
        word_count as f64 / sentence_count as f64
    } else {
        0.0
    };

    // First longest word wins.
    let longest_word = words.iter().copied().fold("", |longest, word| {
        if word.chars().count() > longest.chars().count() {
            word
        } else {
            longest
        }
    });

    TextStats {
        word_count,
        unique_words,
        character_count: text.chars().count(),
        character_count_no_spaces: text.chars().filter(|c| !c.is_whitespace()).count(),
        sentence_count,
        avg_word_length: round2(avg_word_length),
        avg_sentence_length: round2(avg_sentence_length),
        longest_word: longest_word.to_string(),
        longest_word_length: longest_word.chars().count(),
        readability: readability(avg_word_length),
    }
}

fn readability(avg_word_length: f64) -> &'static str {
    if avg_word_length < 5.0 {
        "simple"
    } else if avg_word_length < 7.0 {
        "moderate"
    } else {
        "complex"
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn plural(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {plural}")
    }
}

fn render(output: &Value) -> String {
    let count = |key: &str| output.get(key).and_then(Value::as_u64).unwrap_or(0);
    let avg = output
        .get("avg_word_length")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let longest = output
        .get("longest_word")
        .and_then(Value::as_str)
        .unwrap_or("");
    let readability = output
        .get("readability")
        .and_then(Value::as_str)
        .unwrap_or("simple");

    format!(
        "{} ({} unique), {}, {}, average word length {}, longest word \"{}\", readability {}",
        plural(count("word_count"), "word", "words"),
        count("unique_words"),
        plural(count("character_count"), "character", "characters"),
        plural(count("sentence_count"), "sentence", "sentences"),
        format_number(avg),
        longest,
        readability
    )
}
