//! Language-model boundary for the stepwise agent.
//!
//! The agent only ever needs text in, text out. Everything provider-specific
//! lives behind [`LanguageModel`].

pub mod error;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod settings;
pub mod testing;

pub use error::LlmError;
pub use openai::OpenAiCompatibleModel;
pub use prompt::Prompt;
pub use provider::LanguageModel;
pub use settings::LlmSettings;
