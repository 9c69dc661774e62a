//! Built-in tools.
//!
//! Provides the calculator, text analyzer, search, market price and
//! pass-through tools.
//! Each registers its definition and routing metadata via [`register_builtins`].

pub mod calculator;
pub mod market;
pub mod passthrough;
pub mod search;
pub mod text_analyzer;

use std::sync::Arc;

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::registry::ToolRegistry;

use self::market::{QuoteSource, StaticQuoteBook};
use self::search::{SearchBackend, StaticSearchIndex, DEFAULT_MAX_RESULTS};

/// Register every built-in tool with the offline [`StaticSearchIndex`] and
/// [`StaticQuoteBook`].
pub fn register_builtins(registry: &mut ToolRegistry, router: &mut Router) -> AgentResult<()> {
    register_builtins_with(
        registry,
        router,
        Arc::new(StaticSearchIndex::default()),
        DEFAULT_MAX_RESULTS,
        Arc::new(StaticQuoteBook::default()),
    )
}

/// Register every built-in tool with explicit search and quote backends.
pub fn register_builtins_with(
    registry: &mut ToolRegistry,
    router: &mut Router,
    search_backend: Arc<dyn SearchBackend>,
    search_max_results: usize,
    quote_source: Arc<dyn QuoteSource>,
) -> AgentResult<()> {
    calculator::register(registry, router)?;
    text_analyzer::register(registry, router)?;
    search::register(registry, router, search_backend, search_max_results)?;
    market::register(registry, router, quote_source)?;
    passthrough::register(registry, router)?;
    Ok(())
}

/// Routing metadata for every built-in tool.
pub fn routing_metadata() -> Vec<RoutingMetadata> {
    vec![
        calculator::routing_metadata(),
        text_analyzer::routing_metadata(),
        search::routing_metadata(),
        market::financial_routing_metadata(),
        market::commodity_routing_metadata(),
        passthrough::routing_metadata(),
    ]
}
