//! Settings for the OpenAI-compatible model client.
//!
//! Values come from `STEPWISE_LLM_*` environment variables, falling back to the
//! conventional `OPENAI_*` names and then to built-in defaults.

use std::env;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LlmSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        };
        let defaults = Self::default();

        Self {
            base_url: get(&["STEPWISE_LLM_BASE_URL", "OPENAI_BASE_URL"])
                .unwrap_or(defaults.base_url),
            api_key: get(&["STEPWISE_LLM_API_KEY", "OPENAI_API_KEY"]),
            model: get(&["STEPWISE_LLM_MODEL", "OPENAI_MODEL"]).unwrap_or(defaults.model),
            temperature: get(&["STEPWISE_LLM_TEMPERATURE"])
                .and_then(|value| value.parse::<f64>().ok())
                .unwrap_or(defaults.temperature),
            max_output_tokens: get(&["STEPWISE_LLM_MAX_OUTPUT_TOKENS"])
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(defaults.max_output_tokens),
            timeout_secs: get(&["STEPWISE_LLM_TIMEOUT_SECS"])
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_ref()
            .map(|key| !key.is_empty())
            .unwrap_or(false)
    }

    /// Chat completions endpoint derived from `base_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
