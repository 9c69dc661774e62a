/// Errors raised at the language-model boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("missing LLM API key")]
    MissingApiKey,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("internal error: {0}")]
    Internal(String),
}
