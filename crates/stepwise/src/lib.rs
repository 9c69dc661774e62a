//! A multi-step task agent.
//!
//! A request is planned into tool steps, executed in order with earlier
//! results substituted into later inputs, checked, and turned into one answer.

pub mod agent;
pub mod builtins;
pub mod config;
pub mod error;
pub mod executor;
pub mod planner;
pub mod prompts;
pub mod resolver;
pub mod routing;
pub mod synthesizer;
pub mod tools;
pub mod validator;

pub use crate::agent::{Agent, AgentBuilder, AgentPhase, AgentResponse};
pub use crate::config::{AgentConfig, ConfigStore, SearchBackendKind};
pub use crate::error::{AgentError, AgentResult};
pub use crate::executor::{ExecutionResult, Executor, ResultsTable};
pub use crate::planner::{KeywordPlanner, LlmPlanner, Plan, PlanOrigin, PlanStep, Planner};
pub use crate::synthesizer::{AnswerSource, Synthesis, Synthesizer};
pub use crate::tools::{ToolDefinition, ToolError, ToolRegistry};
pub use crate::validator::{Recommendation, ValidationReport, Validator};
