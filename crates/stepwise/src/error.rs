/// Errors that can reach the caller of the agent.
///
/// Everything below the agent boundary (tool failures, bad plans, synthesis
/// outages) is recovered into data; only these conditions propagate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// The request was blank or otherwise unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The planner's language model could not be reached.
    #[error("planner unavailable: {0}")]
    PlannerUnavailable(String),
    /// A tool id was registered twice.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    /// Configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(String),
    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// A short, non-technical message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::InvalidRequest(_) => {
                "I couldn't understand that request. Please describe what you'd like me to do."
                    .to_string()
            }
            AgentError::PlannerUnavailable(_) => {
                "I'm sorry, I can't work on requests right now because my reasoning service is unreachable. Please try again in a moment."
                    .to_string()
            }
            AgentError::DuplicateTool(_) | AgentError::Config(_) | AgentError::Internal(_) => {
                "I'm sorry, something went wrong on my side while handling your request.".to_string()
            }
        }
    }
}

/// Result type alias using [`AgentError`].
pub type AgentResult<T> = Result<T, AgentError>;
