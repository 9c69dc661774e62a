//! Deterministic [`LanguageModel`] double for tests and offline demos.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LlmError;
use crate::prompt::Prompt;
use crate::provider::LanguageModel;

type Responder = Box<dyn Fn(&Prompt) -> Result<String, LlmError> + Send + Sync>;

/// A model whose replies are computed by a closure or popped from a queue.
///
/// Every prompt it receives is recorded and can be inspected with [`ScriptedModel::calls`].
pub struct ScriptedModel {
    responder: Responder,
    calls: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Prompt) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; once the queue is drained every call fails as unavailable.
    pub fn replies(replies: Vec<Result<String, LlmError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
        })
    }

    /// Always fails with [`LlmError::Unavailable`].
    pub fn unavailable() -> Self {
        Self::new(|_| Err(LlmError::Unavailable("model offline".to_string())))
    }

    pub fn calls(&self) -> Vec<Prompt> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.calls.lock().push(prompt.clone());
        (self.responder)(prompt)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
