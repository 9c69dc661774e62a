use crate::routing::RoutingMetadata;
use crate::tools::ToolRegistry;

/// A single routing candidate with score and explanation.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub tool_id: String,
    pub score: f64,
    pub explanation: String,
}

/// Result of a routing operation.
#[derive(Debug, Clone, Default)]
pub struct RoutingResult {
    pub candidates: Vec<RouteCandidate>,
}

impl RoutingResult {
    pub fn best(&self) -> Option<&RouteCandidate> {
        self.candidates.first()
    }
}

/// Scores request text against registered tool metadata.
#[derive(Debug, Clone)]
pub struct Router {
    entries: Vec<RoutingMetadata>,
    max_candidates: usize,
}

impl Router {
    /// Create a new router with the default candidate limit (5).
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_candidates: 5,
        }
    }

    pub fn with_max_candidates(max_candidates: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_candidates,
        }
    }

    /// Router preloaded with the routing metadata of every built-in tool.
    pub fn with_builtin_routes() -> Self {
        let mut router = Self::new();
        for metadata in crate::builtins::routing_metadata() {
            router.register(metadata);
        }
        router
    }

    /// Register a tool's routing metadata, replacing any earlier entry for the same tool.
    /// All string fields are lowercased at registration.
    pub fn register(&mut self, metadata: RoutingMetadata) {
        let normalized = RoutingMetadata {
            tool_id: metadata.tool_id,
            keywords: metadata.keywords.into_iter().map(|s| s.to_lowercase()).collect(),
            examples: metadata.examples.into_iter().map(|s| s.to_lowercase()).collect(),
            verbs: metadata.verbs.into_iter().map(|s| s.to_lowercase()).collect(),
            objects: metadata.objects.into_iter().map(|s| s.to_lowercase()).collect(),
        };
        self.entries.retain(|entry| entry.tool_id != normalized.tool_id);
        self.entries.push(normalized);
    }

    /// Route request text to candidate tools.
    ///
    /// Scoring:
    /// - Keyword match: +3 per match
    /// - Verb match: +2 per match
    /// - Object match: +2 per match
    /// - Example substring match: +4 per matching example
    pub fn route(&self, text: &str) -> RoutingResult {
        let input_lower = text.to_lowercase();
        let tokens: Vec<&str> = input_lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| !s.is_empty())
            .collect();

        let mut candidates: Vec<RouteCandidate> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let mut score: f64 = 0.0;
                let mut explanations: Vec<String> = Vec::new();

                for (label, words, weight) in [
                    ("keywords", &entry.keywords, 3.0),
                    ("verbs", &entry.verbs, 2.0),
                    ("objects", &entry.objects, 2.0),
                ] {
                    let matched: Vec<&str> = words
                        .iter()
                        .map(|w| w.as_str())
                        .filter(|w| tokens.contains(w))
                        .collect();
                    if !matched.is_empty() {
                        score += matched.len() as f64 * weight;
                        explanations.push(format!("matched {label}: [{}]", matched.join(", ")));
                    }
                }

                let matched_examples: Vec<&str> = entry
                    .examples
                    .iter()
                    .map(|ex| ex.as_str())
                    .filter(|ex| input_lower.contains(ex))
                    .collect();
                if !matched_examples.is_empty() {
                    score += matched_examples.len() as f64 * 4.0;
                    explanations.push(format!(
                        "matched examples: [{}]",
                        matched_examples.join(", ")
                    ));
                }

                (score > 0.0).then(|| RouteCandidate {
                    tool_id: entry.tool_id.clone(),
                    score,
                    explanation: explanations.join("; "),
                })
            })
            .collect();

        // Sort by score descending, tie-break by tool_id ascending
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.tool_id.cmp(&b.tool_id))
        });
        candidates.truncate(self.max_candidates);

        RoutingResult { candidates }
    }

    /// Highest-scoring candidate that is actually registered.
    pub fn best_registered(&self, text: &str, registry: &ToolRegistry) -> Option<String> {
        self.route(text)
            .candidates
            .into_iter()
            .find(|candidate| registry.contains(&candidate.tool_id))
            .map(|candidate| candidate.tool_id)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
