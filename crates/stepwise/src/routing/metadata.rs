/// Routing metadata for a tool.
///
/// Tools register this with the router so request text can be matched to
/// candidate tools via keyword/verb/object/example overlap.
#[derive(Debug, Clone)]
pub struct RoutingMetadata {
    pub tool_id: String,
    /// Keywords that point at this tool (e.g., ["calculate", "math"]).
    pub keywords: Vec<String>,
    /// Phrases this tool typically handles (e.g., ["how many words"]).
    pub examples: Vec<String>,
    pub verbs: Vec<String>,
    pub objects: Vec<String>,
}
