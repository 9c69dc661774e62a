//! Request orchestration: plan, execute, validate, synthesize.

use std::sync::Arc;

use serde::Serialize;
use stepwise_llm::LanguageModel;
use uuid::Uuid;

use crate::builtins::market::{QuoteSource, StaticQuoteBook, YahooFinanceQuotes};
use crate::builtins::search::{DuckDuckGoSearch, SearchBackend, StaticSearchIndex};
use crate::builtins::{passthrough, register_builtins_with};
use crate::config::{AgentConfig, QuoteSourceKind, SearchBackendKind};
use crate::error::{AgentError, AgentResult};
use crate::executor::{Executor, ResultsTable};
use crate::planner::{KeywordPlanner, LlmPlanner, Plan, PlanOrigin, Planner, PlannerError};
use crate::routing::Router;
use crate::synthesizer::{AnswerSource, Synthesizer};
use crate::tools::ToolRegistry;
use crate::validator::{ValidationReport, Validator};

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Received,
    Planned,
    /// Running the given step.
    Executing(u32),
    Validating,
    Synthesizing,
    Done,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Received => "received",
            AgentPhase::Planned => "planned",
            AgentPhase::Executing(_) => "executing",
            AgentPhase::Validating => "validating",
            AgentPhase::Synthesizing => "synthesizing",
            AgentPhase::Done => "done",
        }
    }
}

/// Everything produced while answering one request.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub request_id: Uuid,
    pub answer: String,
    pub plan: Plan,
    pub plan_origin: PlanOrigin,
    pub results: ResultsTable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    pub answer_source: AnswerSource,
    pub phases: Vec<AgentPhase>,
}

#[derive(Default)]
pub struct AgentBuilder {
    registry: Option<ToolRegistry>,
    router: Option<Router>,
    model: Option<Arc<dyn LanguageModel>>,
    planner: Option<Arc<dyn Planner>>,
    config: Option<AgentConfig>,
}

impl AgentBuilder {
    /// Use this tool set instead of the built-ins.
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> AgentResult<Agent> {
        let config = self.config.unwrap_or_default();

        let (mut registry, mut router) = match self.registry {
            Some(registry) => (
                registry,
                self.router.unwrap_or_else(Router::with_builtin_routes),
            ),
            None => {
                let mut registry = ToolRegistry::new();
                let mut router = self.router.unwrap_or_default();
                register_builtins_with(
                    &mut registry,
                    &mut router,
                    search_backend(config.search_backend)?,
                    config.search_max_results,
                    quote_source(config.quote_source)?,
                )?;
                (registry, router)
            }
        };
        if !registry.contains(passthrough::TOOL_ID) {
            passthrough::register(&mut registry, &mut router)?;
        }
        let registry = Arc::new(registry);

        let planner: Arc<dyn Planner> = match (self.planner, &self.model) {
            (Some(planner), _) => planner,
            (None, Some(model)) => Arc::new(
                LlmPlanner::new(Arc::clone(model), router)
                    .with_max_steps(config.max_plan_steps)
                    .with_max_repair_attempts(config.max_repair_attempts),
            ),
            (None, None) => {
                Arc::new(KeywordPlanner::new(router).with_max_steps(config.max_plan_steps))
            }
        };

        tracing::info!(
            tools = ?registry.tool_ids(),
            model = self.model.as_ref().map(|model| model.model_id()).unwrap_or("none"),
            "agent ready"
        );

        Ok(Agent {
            executor: Executor::new(Arc::clone(&registry)).with_timeout(config.tool_timeout()),
            validator: Validator::new(self.model.clone()),
            synthesizer: Synthesizer::new(self.model, Arc::clone(&registry)),
            registry,
            planner,
            config,
        })
    }
}

fn search_backend(kind: SearchBackendKind) -> AgentResult<Arc<dyn SearchBackend>> {
    Ok(match kind {
        SearchBackendKind::Static => Arc::new(StaticSearchIndex::default()),
        SearchBackendKind::DuckDuckGo => Arc::new(
            DuckDuckGoSearch::new().map_err(|e| AgentError::Config(e.to_string()))?,
        ),
    })
}

fn quote_source(kind: QuoteSourceKind) -> AgentResult<Arc<dyn QuoteSource>> {
    Ok(match kind {
        QuoteSourceKind::Static => Arc::new(StaticQuoteBook::default()),
        QuoteSourceKind::Yahoo => Arc::new(
            YahooFinanceQuotes::new().map_err(|e| AgentError::Config(e.to_string()))?,
        ),
    })
}

/// Multi-step task agent. Cheap to share across concurrent requests.
pub struct Agent {
    registry: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    executor: Executor,
    validator: Validator,
    synthesizer: Synthesizer,
    config: AgentConfig,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("tools", &self.registry.tool_ids())
            .field("config", &self.config)
            .finish()
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer `request`, turning any error into a message for the user.
    pub async fn run(&self, request: &str) -> String {
        match self.try_run(request).await {
            Ok(response) => response.answer,
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                e.user_message()
            }
        }
    }

    #[tracing::instrument(skip_all, fields(request_id))]
    pub async fn try_run(&self, request: &str) -> AgentResult<AgentResponse> {
        let request_id = Uuid::now_v7();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let request = request.trim();
        if request.is_empty() {
            return Err(AgentError::InvalidRequest("the request is empty".to_string()));
        }
        let chars = request.chars().count();
        if chars > self.config.max_request_chars {
            return Err(AgentError::InvalidRequest(format!(
                "the request has {chars} characters but at most {} are allowed",
                self.config.max_request_chars
            )));
        }

        let mut phases = vec![AgentPhase::Received];
        tracing::info!(chars, "request received");

        let planned = self
            .planner
            .plan(request, &self.registry)
            .await
            .map_err(|e| match e {
                PlannerError::ModelUnavailable(detail) => AgentError::PlannerUnavailable(detail),
                PlannerError::NoFallbackTool(detail) => AgentError::Internal(detail),
            })?;
        phases.push(AgentPhase::Planned);
        tracing::info!(
            steps = planned.plan.len(),
            origin = ?planned.origin,
            "plan ready"
        );

        let results = self
            .executor
            .execute_observed(&planned.plan, |step| {
                phases.push(AgentPhase::Executing(step.step_number));
            })
            .await;

        let validation = if self.config.validate_results {
            phases.push(AgentPhase::Validating);
            Some(self.validator.validate(request, &planned.plan, &results).await)
        } else {
            None
        };

        phases.push(AgentPhase::Synthesizing);
        let synthesis = self
            .synthesizer
            .synthesize(request, &planned.plan, &results, validation.as_ref())
            .await;
        phases.push(AgentPhase::Done);
        tracing::info!(source = ?synthesis.source, "request done");

        Ok(AgentResponse {
            request_id,
            answer: synthesis.answer,
            plan: planned.plan,
            plan_origin: planned.origin,
            results,
            validation,
            answer_source: synthesis.source,
            phases,
        })
    }
}
