//! Post-execution quality check of the results table.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stepwise_llm::LanguageModel;

use crate::executor::ResultsTable;
use crate::planner::Plan;
use crate::prompts::{extract_json_block, validation_prompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Accept,
    Reject,
    RetryWithCaution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// 0 to 100.
    pub confidence_score: u8,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub recommendation: Recommendation,
    pub reasoning: String,
    pub source: ReportSource,
}

/// Shape the model is asked to answer with. Every field is optional so a
/// partial answer still yields a report.
#[derive(Debug, Deserialize)]
struct ModelReport {
    valid: Option<bool>,
    confidence_score: Option<f64>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
    recommendation: Option<Recommendation>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Clone, Default)]
pub struct Validator {
    model: Option<Arc<dyn LanguageModel>>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("model", &self.model.as_ref().map(|model| model.model_id()))
            .finish()
    }
}

impl Validator {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { model }
    }

    /// Heuristic-only validator.
    pub fn heuristic_only() -> Self {
        Self::default()
    }

    pub async fn validate(&self, request: &str, plan: &Plan, results: &ResultsTable) -> ValidationReport {
        let Some(model) = &self.model else {
            return Self::heuristic(results);
        };

        let prompt = validation_prompt(request, plan, results);
        match model.complete(&prompt).await {
            Ok(response) => match parse_report(&response, results) {
                Some(report) => {
                    tracing::debug!(
                        confidence = report.confidence_score,
                        recommendation = ?report.recommendation,
                        "model validation report"
                    );
                    report
                }
                None => {
                    tracing::warn!("validation response was not a usable report, using heuristic");
                    Self::heuristic(results)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "validation model unavailable, using heuristic");
                Self::heuristic(results)
            }
        }
    }

    /// Report derived only from step outcomes.
    pub fn heuristic(results: &ResultsTable) -> ValidationReport {
        let total = results.len();
        let succeeded = results.succeeded().count();
        let all_ok = succeeded == total;

        let confidence_score = if total == 0 {
            0
        } else {
            let ratio = (100.0 * succeeded as f64 / total as f64).round();
            ratio.clamp(0.0, 100.0) as u8
        };

        let errors: Vec<String> = results
            .failed()
            .map(|result| {
                format!(
                    "step {} ({}) failed: {}",
                    result.step_number,
                    result.tool_used,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        let (warnings, recommendation, reasoning) = if all_ok {
            (
                Vec::new(),
                Recommendation::Accept,
                format!("all {total} steps succeeded"),
            )
        } else if succeeded == 0 {
            (
                vec!["Some steps failed".to_string()],
                Recommendation::Reject,
                "every step failed".to_string(),
            )
        } else {
            (
                vec!["Some steps failed".to_string()],
                Recommendation::RetryWithCaution,
                format!("{succeeded} of {total} steps succeeded"),
            )
        };

        ValidationReport {
            valid: all_ok && total > 0,
            confidence_score,
            warnings,
            errors,
            recommendation,
            reasoning,
            source: ReportSource::Heuristic,
        }
    }
}

fn parse_report(response: &str, results: &ResultsTable) -> Option<ValidationReport> {
    let block = extract_json_block(response)?;
    let parsed: ModelReport = serde_json::from_str(block).ok()?;

    let valid = parsed.valid.unwrap_or(!results.any_failed());
    let confidence_score = parsed
        .confidence_score
        .filter(|score| score.is_finite())
        .map(|score| score.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(if valid { 100 } else { 0 });
    let recommendation = parsed.recommendation.unwrap_or(if valid {
        Recommendation::Accept
    } else {
        Recommendation::RetryWithCaution
    });

    Some(ValidationReport {
        valid,
        confidence_score,
        warnings: parsed.warnings,
        errors: parsed.errors,
        recommendation,
        reasoning: parsed.reasoning,
        source: ReportSource::Model,
    })
}
