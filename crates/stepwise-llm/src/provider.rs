use async_trait::async_trait;

use crate::error::LlmError;
use crate::prompt::Prompt;

/// Text-in, text-out completion capability.
///
/// Implementations must be cheap to share (`Arc<dyn LanguageModel>`) and safe
/// to call from concurrent requests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    fn model_id(&self) -> &str;
}
