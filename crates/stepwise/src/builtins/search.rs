//! Search tool and its pluggable backends.
//!
//! [`StaticSearchIndex`] answers from a small built-in corpus and never touches
//! the network. [`DuckDuckGoSearch`] queries the DuckDuckGo HTML endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AgentResult;
use crate::routing::{Router, RoutingMetadata};
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::{boxed_tool_future, ToolDefinition, ToolError};

pub const TOOL_ID: &str = "search";

/// Default cap on returned hits.
pub const DEFAULT_MAX_RESULTS: usize = 5;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const DDG_TIMEOUT_SECS: u64 = 10;
const DDG_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Source of search hits.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError>;
}

pub fn register(
    registry: &mut ToolRegistry,
    router: &mut Router,
    backend: Arc<dyn SearchBackend>,
    max_results: usize,
) -> AgentResult<()> {
    registry.register(definition(backend, max_results))?;
    router.register(routing_metadata());
    Ok(())
}

pub(crate) fn routing_metadata() -> RoutingMetadata {
    RoutingMetadata {
        tool_id: TOOL_ID.to_string(),
        keywords: vec![
            "search".into(),
            "find".into(),
            "lookup".into(),
            "who".into(),
            "latest".into(),
            "news".into(),
        ],
        examples: vec![
            "search for".into(),
            "look up".into(),
            "information about".into(),
            "tell me about".into(),
        ],
        verbs: vec!["search".into(), "find".into(), "research".into()],
        objects: vec!["information".into(), "web".into(), "internet".into()],
    }
}

pub fn definition(backend: Arc<dyn SearchBackend>, max_results: usize) -> ToolDefinition {
    ToolDefinition {
        tool_id: TOOL_ID.to_string(),
        description: "Searches for information and returns titled snippets.".to_string(),
        input_hint: "a short search query".to_string(),
        output_schema: json!({
            "type": "object",
            "required": ["query", "results", "total_results", "success"],
            "properties": {
                "query": {"type": "string"},
                "results": {"type": "array"},
                "total_results": {"type": "integer"},
                "success": {"type": "boolean"}
            }
        }),
        handler: Arc::new(move |input: String| {
            let backend = Arc::clone(&backend);
            boxed_tool_future(async move { Ok(run_search(backend.as_ref(), &input, max_results).await) })
        }),
        render,
    }
}

async fn run_search(backend: &dyn SearchBackend, query: &str, max_results: usize) -> Value {
    let query = query.trim();
    if query.is_empty() {
        return failure(query, "empty search query".to_string());
    }

    tracing::debug!(backend = backend.name(), query, "running search");
    match backend.search(query, max_results).await {
        Ok(mut hits) => {
            hits.truncate(max_results);
            json!({
                "query": query,
                "total_results": hits.len(),
                "results": hits,
                "success": true,
            })
        }
        Err(e) => {
            tracing::warn!(backend = backend.name(), error = %e, "search backend failed");
            failure(query, e.to_string())
        }
    }
}

fn failure(query: &str, error: String) -> Value {
    json!({
        "query": query,
        "results": [],
        "total_results": 0,
        "success": false,
        "error": error,
    })
}

fn render(output: &Value) -> String {
    let lines: Vec<String> = output
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .map(|hit| {
                    let title = hit.get("title").and_then(Value::as_str).unwrap_or("");
                    let snippet = hit.get("snippet").and_then(Value::as_str).unwrap_or("");
                    format!("{title}: {snippet}")
                })
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        "no results".to_string()
    } else {
        lines.join("\n")
    }
}

// --- Static index ---

#[derive(Debug, Clone)]
struct IndexEntry {
    title: String,
    snippet: String,
    url: String,
    keywords: Vec<String>,
}

/// Deterministic keyword-scored corpus.
#[derive(Debug, Clone)]
pub struct StaticSearchIndex {
    entries: Vec<IndexEntry>,
}

impl StaticSearchIndex {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_entry(
        mut self,
        title: impl Into<String>,
        snippet: impl Into<String>,
        url: impl Into<String>,
        keywords: &[&str],
    ) -> Self {
        self.entries.push(IndexEntry {
            title: title.into(),
            snippet: snippet.into(),
            url: url.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        });
        self
    }

    fn score(entry: &IndexEntry, terms: &[String]) -> usize {
        let haystack = format!("{} {}", entry.title, entry.snippet).to_lowercase();
        terms
            .iter()
            .map(|term| {
                let keyword_hit = entry.keywords.iter().any(|k| k == term);
                let text_hit = haystack.contains(term.as_str());
                2 * usize::from(keyword_hit) + usize::from(text_hit)
            })
            .sum()
    }
}

impl Default for StaticSearchIndex {
    fn default() -> Self {
        Self::empty()
            .with_entry(
                "The Rust Programming Language",
                "Rust is a systems programming language focused on safety, speed and concurrency.",
                "https://www.rust-lang.org",
                &["rust", "programming", "language", "memory", "safety"],
            )
            .with_entry(
                "Tokio: an asynchronous Rust runtime",
                "Tokio provides an event-driven, non-blocking I/O platform for writing async Rust applications.",
                "https://tokio.rs",
                &["tokio", "async", "runtime", "rust"],
            )
            .with_entry(
                "Eiffel Tower",
                "The Eiffel Tower is a wrought-iron lattice tower in Paris, about 330 metres tall.",
                "https://en.wikipedia.org/wiki/Eiffel_Tower",
                &["eiffel", "tower", "paris", "france", "height"],
            )
            .with_entry(
                "Mount Everest",
                "Mount Everest is Earth's highest mountain above sea level, at 8,849 metres.",
                "https://en.wikipedia.org/wiki/Mount_Everest",
                &["everest", "mountain", "highest", "himalaya"],
            )
    }
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "for", "about", "is", "are", "what", "how", "and", "in", "on", "to",
    "me", "tell", "search", "find", "look", "up",
];

fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.len() > 1 && !STOPWORDS.contains(term))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SearchBackend for StaticSearchIndex {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let terms = query_terms(query);
        let mut scored: Vec<(usize, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (Self::score(entry, &terms), entry))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps corpus order for ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(max_results)
            .map(|(_, entry)| SearchHit {
                title: entry.title.clone(),
                snippet: entry.snippet.clone(),
                url: Some(entry.url.clone()),
            })
            .collect())
    }
}

// --- DuckDuckGo ---

/// Live search through DuckDuckGo's HTML endpoint.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for DuckDuckGoSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDuckGoSearch")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .user_agent(DDG_USER_AGENT)
            .timeout(Duration::from_secs(DDG_TIMEOUT_SECS))
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: DDG_HTML_URL.to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("q={}&b=", urlencoding::encode(query)))
            .send()
            .await
            .map_err(|e| ToolError::ExternalService(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExternalService(format!(
                "search failed with status code: {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::ExternalService(format!("failed to read search response: {e}")))?;

        Ok(parse_result_page(&html, max_results))
    }
}

const TITLE_MARKER: &str = "class=\"result__a\"";
const SNIPPET_MARKER: &str = "class=\"result__snippet\"";
const SNIPPET_WINDOW: usize = 2000;

/// Pull titled links and their snippets out of a DuckDuckGo HTML result page.
fn parse_result_page(html: &str, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let mut cursor = 0;

    while hits.len() < max_results {
        let Some(offset) = html[cursor..].find(TITLE_MARKER) else {
            break;
        };
        let marker_at = cursor + offset;
        cursor = marker_at + TITLE_MARKER.len();

        let Some(tag_start) = html[..marker_at].rfind("<a ") else {
            continue;
        };
        let Some(tag_end) = html[tag_start..].find('>').map(|i| tag_start + i) else {
            continue;
        };
        let Some(href) = attribute(&html[tag_start..tag_end], "href") else {
            continue;
        };
        let title_start = tag_end + 1;
        let Some(title_end) = html[title_start..].find("</a>").map(|i| title_start + i) else {
            continue;
        };
        cursor = title_end;

        let title = plain_text(&html[title_start..title_end]);
        let mut window_end = (title_end + SNIPPET_WINDOW).min(html.len());
        while !html.is_char_boundary(window_end) {
            window_end -= 1;
        }
        let snippet = snippet_after(html, title_end, window_end).unwrap_or_default();
        let url = unwrap_redirect(&href);

        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit {
                title,
                snippet,
                url: Some(url),
            });
        }
    }

    hits
}

fn snippet_after(html: &str, from: usize, to: usize) -> Option<String> {
    let region = &html[from..to];
    let marker = region.find(SNIPPET_MARKER)?;
    let open_end = region[marker..].find('>')? + marker + 1;
    let close = region[open_end..].find("</a>")? + open_end;
    Some(plain_text(&region[open_end..close]))
}

/// DuckDuckGo wraps outbound links as `//duckduckgo.com/l/?uddg=ENCODED&...`.
fn unwrap_redirect(href: &str) -> String {
    let wrapped = href
        .strip_prefix("//duckduckgo.com/l/?uddg=")
        .or_else(|| href.strip_prefix("/l/?uddg="));
    match wrapped {
        Some(rest) => {
            let encoded = rest.split('&').next().unwrap_or(rest);
            urlencoding::decode(encoded)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| href.to_string())
        }
        None if href.starts_with("http://") || href.starts_with("https://") => href.to_string(),
        None => String::new(),
    }
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let pattern = format!("{name}=\"");
    let start = tag.find(&pattern)? + pattern.len();
    let end = tag[start..].find('"')? + start;
    Some(decode_entities(&tag[start..end]))
}

fn plain_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    decode_entities(out.trim())
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    #[async_trait]
    impl SearchBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, ToolError> {
            Err(ToolError::ExternalService("service down".to_string()))
        }
    }

    fn static_tool() -> ToolDefinition {
        definition(Arc::new(StaticSearchIndex::default()), DEFAULT_MAX_RESULTS)
    }

    #[tokio::test]
    async fn static_index_finds_relevant_entry() {
        let output = (static_tool().handler)("Eiffel Tower height".to_string())
            .await
            .unwrap();
        assert_eq!(output["success"], true);
        assert_eq!(output["results"][0]["title"], "Eiffel Tower");
        assert_eq!(output["total_results"], 1);
    }

    #[tokio::test]
    async fn static_index_is_deterministic() {
        let tool = static_tool();
        let first = (tool.handler)("rust programming".to_string()).await.unwrap();
        let second = (tool.handler)("rust programming".to_string()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["results"][0]["title"], "The Rust Programming Language");
    }

    #[tokio::test]
    async fn no_match_is_a_successful_empty_result() {
        let output = (static_tool().handler)("zxqv".to_string()).await.unwrap();
        assert_eq!(output["success"], true);
        assert_eq!(output["total_results"], 0);
        assert_eq!(render(&output), "no results");
    }

    #[tokio::test]
    async fn empty_query_fails() {
        let output = (static_tool().handler)("   ".to_string()).await.unwrap();
        assert_eq!(output["success"], false);
        assert_eq!(output["error"], "empty search query");
    }

    #[tokio::test]
    async fn backend_error_becomes_failed_record() {
        let tool = definition(Arc::new(FailingBackend), 3);
        let output = (tool.handler)("anything".to_string()).await.unwrap();
        assert_eq!(output["success"], false);
        assert_eq!(output["error"], "external service error: service down");
    }

    #[tokio::test]
    async fn results_are_capped() {
        let tool = definition(Arc::new(StaticSearchIndex::default()), 1);
        let output = (tool.handler)("programming language".to_string())
            .await
            .unwrap();
        assert_eq!(output["results"].as_array().unwrap().len(), 1);
        assert!(crate::tools::validate_schema(&output, &tool.output_schema).is_ok());
    }

    #[test]
    fn render_lists_title_and_snippet() {
        let output = json!({
            "results": [
                {"title": "A", "snippet": "first"},
                {"title": "B", "snippet": "second"}
            ]
        });
        assert_eq!(render(&output), "A: first\nB: second");
    }

    #[test]
    fn parse_result_page_extracts_hits() {
        let html = r##"
        <div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com">Example Site</a>
            <a class="result__snippet" href="#">This is a snippet about example.</a>
        </div>
        <div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Frust-lang.org&amp;rut=abc">Rust &amp; Language</a>
            <a class="result__snippet" href="#">A <b>systems</b> programming language.</a>
        </div>
        "##;
        let hits = parse_result_page(html, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url.as_deref(), Some("https://example.com"));
        assert_eq!(hits[0].title, "Example Site");
        assert_eq!(hits[1].url.as_deref(), Some("https://rust-lang.org"));
        assert_eq!(hits[1].title, "Rust & Language");
        assert_eq!(hits[1].snippet, "A systems programming language.");
    }

    #[test]
    fn parse_result_page_respects_cap_and_skips_relative_links() {
        let html = r##"
        <a class="result__a" href="/relative">Skipped</a>
        <a class="result__a" href="https://a.com">A</a><a class="result__snippet" href="#">a</a>
        <a class="result__a" href="https://b.com">B</a><a class="result__snippet" href="#">b</a>
        <a class="result__a" href="https://c.com">C</a>
        "##;
        let hits = parse_result_page(html, 2);
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }
}
