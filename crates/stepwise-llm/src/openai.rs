//! Minimal client for OpenAI-compatible `/chat/completions` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::prompt::Prompt;
use crate::provider::LanguageModel;
use crate::settings::LlmSettings;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct OpenAiCompatibleModel {
    client: reqwest::Client,
    settings: LlmSettings,
    api_key: String,
}

impl std::fmt::Debug for OpenAiCompatibleModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleModel")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl OpenAiCompatibleModel {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let body = request_body(&self.settings, prompt);
        tracing::debug!(
            model = %self.settings.model,
            prompt_chars = prompt.user.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(self.settings.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Unavailable(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let snippet: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            tracing::warn!(status = status.as_u16(), body = %snippet, "completion request rejected");
            return Err(LlmError::Unavailable(format!(
                "provider returned status {}: {snippet}",
                status.as_u16()
            )));
        }

        parse_completion(&text)
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn request_body(settings: &LlmSettings, prompt: &Prompt) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &prompt.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": prompt.user }));

    json!({
        "model": settings.model,
        "messages": messages,
        "temperature": settings.temperature,
        "max_tokens": settings.max_output_tokens,
    })
}

fn parse_completion(body: &str) -> Result<String, LlmError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("malformed completion body: {e}")))?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("completion had no message content".to_string()))
}
