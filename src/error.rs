use thiserror::Error;

/// Failures that abort a research run.
///
/// Everything else the loop encounters (sources without a usable URI,
/// responses without grounding metadata, an empty conversation, a planner
/// that returns no queries, an exhausted loop budget, citation offsets past
/// the end of the text) is handled in place by skipping, falling back,
/// or clamping, and never becomes an error value.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("language model call failed: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("web search call failed: {0}")]
    Search(#[source] anyhow::Error),

    #[error("research run cancelled")]
    Cancelled,
}
