use serde::{Deserialize, Serialize};

use crate::citations::{CitationSegment, UrlResolver};

/// Returned by the topic extractor when the conversation is empty.
pub const NO_TOPIC: &str = "No research topic provided";

/// Who authored a conversation turn. Any other role string fails
/// deserialization at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation that seeds a research run. The run only
/// reads these; the caller owns the sequence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A planned web search query with the planner's reasoning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Query {
    pub query: String,
    pub rationale: String,
}

/// Mutable state for a single research run. Built fresh per request and
/// dropped when the run completes or errors.
#[derive(Debug)]
pub struct LoopState {
    pub pending_queries: Vec<Query>,
    pub accumulated_summaries: Vec<String>,
    /// Every citation segment seen across all rounds, in aggregation order.
    /// Duplicates across rounds are expected; the resolver handles dedup.
    pub sources_gathered: Vec<CitationSegment>,
    pub loop_count: u32,
    pub max_loops: u32,
    pub is_sufficient: bool,
    pub resolver: UrlResolver,
}

impl LoopState {
    pub fn new(max_loops: u32, run_id: u64) -> Self {
        LoopState {
            pending_queries: Vec::new(),
            accumulated_summaries: Vec::new(),
            sources_gathered: Vec::new(),
            loop_count: 0,
            max_loops,
            is_sufficient: false,
            resolver: UrlResolver::new(run_id),
        }
    }
}

/// Flatten a conversation into a single research-topic string.
///
/// A single message is returned verbatim. Longer conversations are rendered
/// as `User:`/`Assistant:` prefixed lines in their original order.
pub fn research_topic(messages: &[Message]) -> String {
    match messages {
        [] => NO_TOPIC.to_string(),
        [only] => only.content.clone(),
        many => many
            .iter()
            .map(|m| match m.role {
                Role::User => format!("User: {}", m.content),
                Role::Assistant => format!("Assistant: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
