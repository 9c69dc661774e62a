//! Market price tools: `financial_data` for ticker symbols and
//! `commodity_price` for named commodities.
//!
//! Both read from a [`QuoteSource`]. [`StaticQuoteBook`] serves a fixed
//! snapshot and never touches the network. [`YahooFinanceQuotes`] reads the
//! Yahoo Finance chart endpoint.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::{boxed_tool_future, format_number, ToolDefinition, ToolError};

pub const FINANCIAL_TOOL_ID: &str = "financial_data";
pub const COMMODITY_TOOL_ID: &str = "commodity_price";

/// Commodity names and the futures symbols they are quoted under.
pub const COMMODITY_SYMBOLS: &[(&str, &str)] = &[
    ("silver", "SI=F"),
    ("gold", "GC=F"),
    ("oil", "CL=F"),
    ("crude oil", "CL=F"),
    ("copper", "HG=F"),
    ("platinum", "PL=F"),
    ("palladium", "PA=F"),
    ("natural gas", "NG=F"),
    ("wheat", "ZW=F"),
    ("corn", "ZC=F"),
    ("soybeans", "ZS=F"),
];

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart/";
const YAHOO_TIMEOUT_SECS: u64 = 10;
const YAHOO_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) stepwise";

static SYMBOL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\^?[A-Z0-9]{1,10}(?:[.\-=][A-Z0-9]{1,4})?$").expect("valid symbol regex")
});

static SYMBOL_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\^?\b[A-Z]{2,5}(?:-USD|=F|\.[A-Z]{1,2})?\b").expect("valid ticker regex")
});

/// A price snapshot for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub currency: String,
    pub market_state: Option<String>,
}

impl Quote {
    /// Percentage move from the previous close, rounded to two places.
    pub fn change_percent(&self) -> f64 {
        match self.previous_close {
            Some(previous) if previous != 0.0 => {
                (((self.price - previous) / previous) * 100.0 * 100.0).round() / 100.0
            }
            _ => 0.0,
        }
    }
}

/// Source of price quotes.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError>;
}

pub fn register(
    registry: &mut ToolRegistry,
    router: &mut Router,
    source: Arc<dyn QuoteSource>,
) -> AgentResult<()> {
    registry.register(financial_definition(Arc::clone(&source)))?;
    registry.register(commodity_definition(source))?;
    router.register(financial_routing_metadata());
    router.register(commodity_routing_metadata());
    Ok(())
}

pub(crate) fn financial_routing_metadata() -> RoutingMetadata {
    RoutingMetadata {
        tool_id: FINANCIAL_TOOL_ID.to_string(),
        keywords: vec![
            "stock".into(),
            "shares".into(),
            "ticker".into(),
            "crypto".into(),
            "bitcoin".into(),
        ],
        examples: vec!["stock price".into(), "share price".into()],
        verbs: vec![],
        objects: vec!["price".into(), "market".into()],
    }
}

pub(crate) fn commodity_routing_metadata() -> RoutingMetadata {
    let mut keywords: Vec<String> = COMMODITY_SYMBOLS
        .iter()
        .flat_map(|(name, _)| name.split_whitespace())
        .map(str::to_string)
        .collect();
    keywords.sort_unstable();
    keywords.dedup();
    keywords.push("commodity".into());
    RoutingMetadata {
        tool_id: COMMODITY_TOOL_ID.to_string(),
        keywords,
        examples: vec!["price of gold".into(), "price of oil".into()],
        verbs: vec![],
        objects: vec!["price".into()],
    }
}

fn quote_schema(extra: &str) -> Value {
    json!({
        "type": "object",
        "required": [extra, "success"],
        "properties": {
            extra: {"type": "string"},
            "success": {"type": "boolean"}
        }
    })
}

pub fn financial_definition(source: Arc<dyn QuoteSource>) -> ToolDefinition {
    ToolDefinition {
        tool_id: FINANCIAL_TOOL_ID.to_string(),
        description: "Looks up the current price of a stock, fund or cryptocurrency.".to_string(),
        input_hint: "a ticker symbol such as AAPL, BTC-USD or SI=F".to_string(),
        output_schema: quote_schema("symbol"),
        handler: Arc::new(move |input: String| {
            let source = Arc::clone(&source);
            boxed_tool_future(async move { Ok(financial_data(source.as_ref(), &input).await) })
        }),
        render,
    }
}

pub fn commodity_definition(source: Arc<dyn QuoteSource>) -> ToolDefinition {
    ToolDefinition {
        tool_id: COMMODITY_TOOL_ID.to_string(),
        description: "Looks up the current price of a commodity such as gold, silver or oil."
            .to_string(),
        input_hint: "a commodity name such as silver, gold, oil or natural gas".to_string(),
        output_schema: quote_schema("commodity"),
        handler: Arc::new(move |input: String| {
            let source = Arc::clone(&source);
            boxed_tool_future(async move { Ok(commodity_price(source.as_ref(), &input).await) })
        }),
        render,
    }
}

async fn financial_data(source: &dyn QuoteSource, input: &str) -> Value {
    let symbol = input.trim().trim_end_matches(['?', '.', '!']).to_uppercase();
    if !SYMBOL_SHAPE.is_match(&symbol) {
        return json!({
            "symbol": symbol,
            "error": format!("invalid ticker symbol '{}'", input.trim()),
            "success": false,
        });
    }

    tracing::debug!(source = source.name(), symbol = %symbol, "fetching quote");
    match source.quote(&symbol).await {
        Ok(quote) => quote_record(&quote),
        Err(e) => {
            tracing::warn!(source = source.name(), symbol = %symbol, error = %e, "quote lookup failed");
            json!({
                "symbol": symbol,
                "error": e.to_string(),
                "success": false,
            })
        }
    }
}

async fn commodity_price(source: &dyn QuoteSource, input: &str) -> Value {
    let commodity = input.trim().trim_end_matches(['?', '.', '!']).trim();
    let Some(symbol) = commodity_symbol(commodity) else {
        let available: Vec<&str> = COMMODITY_SYMBOLS.iter().map(|(name, _)| *name).collect();
        return json!({
            "commodity": commodity,
            "error": format!("unknown commodity; available: {}", available.join(", ")),
            "success": false,
        });
    };

    let mut record = financial_data(source, symbol).await;
    if let Some(fields) = record.as_object_mut() {
        fields.insert("commodity".to_string(), json!(commodity));
    }
    record
}

/// Futures symbol for a commodity name, case-insensitive.
pub fn commodity_symbol(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    COMMODITY_SYMBOLS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, symbol)| *symbol)
}

/// The commodity named in free text, preferring the longest name.
pub fn commodity_in_text(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    COMMODITY_SYMBOLS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| {
            lowered
                .match_indices(name)
                .any(|(at, _)| is_word_at(&lowered, at, name.len()))
        })
        .max_by_key(|name| name.len())
}

fn is_word_at(text: &str, at: usize, len: usize) -> bool {
    let before = text[..at].chars().next_back();
    let after = text[at + len..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// First ticker-looking token in free text.
pub fn symbol_in_text(text: &str) -> Option<String> {
    SYMBOL_IN_TEXT.find(text).map(|m| m.as_str().to_string())
}

fn quote_record(quote: &Quote) -> Value {
    json!({
        "symbol": quote.symbol,
        "name": quote.name,
        "current_price": quote.price,
        "currency": quote.currency,
        "change_percent": quote.change_percent(),
        "market_state": quote.market_state.as_deref().unwrap_or("unknown"),
        "success": true,
    })
}

/// Renders the bare price so later steps can do arithmetic on it.
fn render(output: &Value) -> String {
    output
        .get("current_price")
        .and_then(Value::as_f64)
        .map(format_number)
        .unwrap_or_default()
}

// --- Static snapshot ---

/// Deterministic quotes for a handful of common symbols.
#[derive(Debug, Clone)]
pub struct StaticQuoteBook {
    quotes: Vec<Quote>,
}

impl StaticQuoteBook {
    pub fn empty() -> Self {
        Self { quotes: Vec::new() }
    }

    pub fn with_quote(
        mut self,
        symbol: &str,
        name: &str,
        price: f64,
        previous_close: f64,
        currency: &str,
    ) -> Self {
        self.quotes.push(Quote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            price,
            previous_close: Some(previous_close),
            currency: currency.to_string(),
            market_state: Some("snapshot".to_string()),
        });
        self
    }
}

impl Default for StaticQuoteBook {
    fn default() -> Self {
        Self::empty()
            .with_quote("AAPL", "Apple Inc.", 190.0, 187.5, "USD")
            .with_quote("MSFT", "Microsoft Corporation", 410.0, 412.0, "USD")
            .with_quote("BTC-USD", "Bitcoin USD", 65000.0, 64000.0, "USD")
            .with_quote("GC=F", "Gold", 2350.0, 2340.0, "USD")
            .with_quote("SI=F", "Silver", 28.5, 28.0, "USD")
            .with_quote("CL=F", "Crude Oil", 80.0, 81.0, "USD")
            .with_quote("HG=F", "Copper", 4.5, 4.5, "USD")
            .with_quote("NG=F", "Natural Gas", 2.5, 2.4, "USD")
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteBook {
    fn name(&self) -> &str {
        "static"
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError> {
        self.quotes
            .iter()
            .find(|quote| quote.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .ok_or_else(|| ToolError::ExecutionFailed(format!("could not fetch price for {symbol}")))
    }
}

// --- Yahoo Finance ---

/// Live quotes from the Yahoo Finance chart endpoint.
pub struct YahooFinanceQuotes {
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for YahooFinanceQuotes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooFinanceQuotes")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl YahooFinanceQuotes {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(YAHOO_USER_AGENT)
            .timeout(Duration::from_secs(YAHOO_TIMEOUT_SECS))
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: YAHOO_CHART_URL.to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for YahooFinanceQuotes {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, ToolError> {
        let url = format!(
            "{}{}?range=1d&interval=1d",
            self.endpoint,
            urlencoding::encode(symbol)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::ExternalService(format!("quote request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExternalService(format!("failed to read quote response: {e}")))?;
        if !status.is_success() && status.as_u16() != 404 {
            return Err(ToolError::ExternalService(format!(
                "quote lookup failed with status code: {}",
                status.as_u16()
            )));
        }

        quote_from_chart(symbol, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: Option<String>,
    currency: Option<String>,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    long_name: Option<String>,
    short_name: Option<String>,
}

/// Build a [`Quote`] from a chart endpoint response body.
fn quote_from_chart(symbol: &str, body: &str) -> Result<Quote, ToolError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| ToolError::ExternalService(format!("unexpected quote response: {e}")))?;

    if let Some(error) = envelope.chart.error {
        let detail = if error.description.is_empty() {
            format!("could not fetch price for {symbol}")
        } else {
            error.description
        };
        return Err(ToolError::ExternalService(detail));
    }

    let meta = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .ok_or_else(|| ToolError::ExternalService(format!("could not fetch price for {symbol}")))?;
    let price = meta
        .regular_market_price
        .or(meta.previous_close)
        .or(meta.chart_previous_close)
        .ok_or_else(|| ToolError::ExternalService(format!("could not fetch price for {symbol}")))?;

    let symbol = meta.symbol.unwrap_or_else(|| symbol.to_string());
    Ok(Quote {
        name: meta
            .long_name
            .or(meta.short_name)
            .unwrap_or_else(|| symbol.clone()),
        symbol,
        price,
        previous_close: meta.previous_close.or(meta.chart_previous_close),
        currency: meta.currency.unwrap_or_else(|| "USD".to_string()),
        market_state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Arc<dyn QuoteSource> {
        Arc::new(StaticQuoteBook::default())
    }

    #[tokio::test]
    async fn financial_data_reports_price_and_change() {
        let output = financial_data(book().as_ref(), " aapl ").await;
        assert_eq!(output["success"], true);
        assert_eq!(output["symbol"], "AAPL");
        assert_eq!(output["current_price"], 190.0);
        assert_eq!(output["change_percent"], 1.33);
        assert_eq!(output["market_state"], "snapshot");
        assert_eq!(render(&output), "190");
    }

    #[tokio::test]
    async fn unknown_and_malformed_symbols_fail() {
        let unknown = financial_data(book().as_ref(), "ZZZZ").await;
        assert_eq!(unknown["success"], false);
        assert!(unknown["error"].as_str().unwrap().contains("could not fetch price for ZZZZ"));

        let malformed = financial_data(book().as_ref(), "apple stock please").await;
        assert_eq!(malformed["success"], false);
        assert!(malformed["error"].as_str().unwrap().contains("invalid ticker symbol"));
    }

    #[tokio::test]
    async fn commodity_price_maps_names_to_futures() {
        let output = commodity_price(book().as_ref(), "Gold").await;
        assert_eq!(output["success"], true);
        assert_eq!(output["symbol"], "GC=F");
        assert_eq!(output["commodity"], "Gold");
        assert_eq!(output["current_price"], 2350.0);

        let crude = commodity_price(book().as_ref(), "crude oil").await;
        assert_eq!(crude["symbol"], "CL=F");
    }

    #[tokio::test]
    async fn unknown_commodity_lists_what_is_available() {
        let output = commodity_price(book().as_ref(), "unobtainium").await;
        assert_eq!(output["success"], false);
        let error = output["error"].as_str().unwrap();
        assert!(error.contains("silver, gold, oil"));
        assert!(error.contains("soybeans"));
    }

    #[test]
    fn names_and_symbols_in_free_text() {
        assert_eq!(commodity_in_text("What is the price of crude oil today?"), Some("crude oil"));
        assert_eq!(commodity_in_text("Silver and gold"), Some("silver"));
        assert_eq!(commodity_in_text("goldfish prices"), None);
        assert_eq!(symbol_in_text("What is AAPL trading at?").as_deref(), Some("AAPL"));
        assert_eq!(symbol_in_text("Get the BTC-USD price").as_deref(), Some("BTC-USD"));
        assert_eq!(symbol_in_text("What is the price of apple"), None);
    }

    #[test]
    fn chart_response_becomes_a_quote() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"SI=F","currency":"USD",
            "regularMarketPrice":29.1,"chartPreviousClose":28.8,"shortName":"Silver Jul 24"}}],
            "error":null}}"#;
        let quote = quote_from_chart("SI=F", body).unwrap();
        assert_eq!(quote.name, "Silver Jul 24");
        assert_eq!(quote.price, 29.1);
        assert_eq!(quote.previous_close, Some(28.8));
        assert_eq!(quote.change_percent(), 1.04);
    }

    #[test]
    fn chart_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found",
            "description":"No data found, symbol may be delisted"}}}"#;
        let err = quote_from_chart("NOPE", body).unwrap_err();
        assert_eq!(
            err,
            ToolError::ExternalService("No data found, symbol may be delisted".to_string())
        );
        assert!(quote_from_chart("X", "<html>").is_err());
    }

    #[test]
    fn routing_separates_stocks_from_commodities() {
        let mut router = Router::new();
        router.register(financial_routing_metadata());
        router.register(commodity_routing_metadata());
        assert_eq!(
            router.route("What is the price of gold?").best().unwrap().tool_id,
            COMMODITY_TOOL_ID
        );
        assert_eq!(
            router.route("Get the AAPL stock price").best().unwrap().tool_id,
            FINANCIAL_TOOL_ID
        );
    }
}
