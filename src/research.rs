//! The research control loop: plan queries, fan out grounded searches,
//! reflect on the evidence, and loop until it is sufficient or the loop
//! budget runs out, then synthesize a cited answer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::citations::{get_citations, insert_citation_markers, ResolvedSource};
use crate::error::ResearchError;
use crate::grounding::GroundedResponse;
use crate::state::{research_topic, LoopState, Message, Query};

/// Separator between accumulated summaries when they are handed back to the
/// model for reflection and answer synthesis.
const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Result of the planning call.
#[derive(Debug, Clone)]
pub struct Plan {
    pub rationale: String,
    pub queries: Vec<Query>,
}

/// Result of the reflection call.
#[derive(Debug, Clone)]
pub struct Reflection {
    pub is_sufficient: bool,
    pub knowledge_gap: String,
    pub follow_up_queries: Vec<String>,
}

/// The LLM collaborator: planning, reflection, and answer synthesis.
/// Single-shot request/response calls; the implementation owns its own
/// timeouts.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn plan_queries(&self, topic: &str, count: usize) -> anyhow::Result<Plan>;
    async fn reflect(&self, topic: &str, summaries: &str) -> anyhow::Result<Reflection>;
    async fn synthesize_answer(
        &self,
        topic: &str,
        summaries: &str,
    ) -> anyhow::Result<GroundedResponse>;
}

/// The web-search collaborator: one grounded search per query, returning
/// synthesized text plus grounding metadata.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<GroundedResponse>;
}

#[derive(Debug, Clone)]
pub enum ResearchProgress {
    Planning,
    SearchesStarted(usize),
    SearchCompleted(String), // query text
    Reflecting(u32, u32),    // current loop, max loops
    Answering,
    Completed,
}

/// Caller-supplied bounds for one run.
#[derive(Debug, Clone, Copy)]
pub struct ResearchParams {
    pub initial_query_count: usize,
    pub max_loops: u32,
}

/// What a finished run hands back to the boundary.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub answer: String,
    /// Every source resolved during the run, in first-seen order.
    pub sources: Vec<ResolvedSource>,
}

/// Drives one research run end to end. Not reentrant: `run` builds a fresh
/// `LoopState` per call and the state never outlives it.
pub struct ResearchRunner<L, S> {
    llm: Arc<L>,
    search: Arc<S>,
    params: ResearchParams,
    progress_tx: Option<mpsc::UnboundedSender<ResearchProgress>>,
    cancel: CancellationToken,
}

impl<L, S> ResearchRunner<L, S>
where
    L: LanguageModel + 'static,
    S: WebSearch + 'static,
{
    pub fn new(llm: Arc<L>, search: Arc<S>, params: ResearchParams) -> Self {
        ResearchRunner {
            llm,
            search,
            params,
            progress_tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_progress_channel(&mut self, tx: mpsc::UnboundedSender<ResearchProgress>) {
        self.progress_tx = Some(tx);
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    fn send_progress(&self, progress: ResearchProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Run the full loop for one request.
    pub async fn run(
        &self,
        messages: &[Message],
        run_id: u64,
    ) -> Result<ResearchOutcome, ResearchError> {
        let topic = research_topic(messages);
        let mut state = LoopState::new(self.params.max_loops, run_id);

        // PLANNING
        self.send_progress(ResearchProgress::Planning);
        let plan = self
            .llm
            .plan_queries(&topic, self.params.initial_query_count)
            .await
            .map_err(ResearchError::Llm)?;
        tracing::debug!(rationale = %plan.rationale, count = plan.queries.len(), "planned queries");
        state.pending_queries = if plan.queries.is_empty() {
            // Never enter SEARCHING with nothing to search.
            vec![Query {
                query: topic.clone(),
                rationale: "Planner returned no queries; searching the raw topic".to_string(),
            }]
        } else {
            plan.queries
        };

        // SEARCHING <-> REFLECTING
        loop {
            let queries = std::mem::take(&mut state.pending_queries);
            self.run_searches(&queries, &mut state).await?;

            if state.loop_count >= state.max_loops {
                break;
            }
            state.loop_count += 1;
            self.send_progress(ResearchProgress::Reflecting(state.loop_count, state.max_loops));

            let summaries = state.accumulated_summaries.join(SUMMARY_SEPARATOR);
            let reflection = self
                .llm
                .reflect(&topic, &summaries)
                .await
                .map_err(ResearchError::Llm)?;
            state.is_sufficient = reflection.is_sufficient;
            tracing::info!(
                loop_count = state.loop_count,
                is_sufficient = state.is_sufficient,
                "reflection round complete"
            );

            // Insufficiency is overridden once the budget is exhausted.
            if state.is_sufficient || state.loop_count >= state.max_loops {
                break;
            }
            state.pending_queries = reflection
                .follow_up_queries
                .into_iter()
                .map(|query| Query { query, rationale: reflection.knowledge_gap.clone() })
                .collect();
            // Insufficient but nothing left to ask: answering with what we
            // have beats searching nothing forever.
            if state.pending_queries.is_empty() {
                break;
            }
        }

        // ANSWERING
        self.send_progress(ResearchProgress::Answering);
        let summaries = state.accumulated_summaries.join(SUMMARY_SEPARATOR);
        let response = self
            .llm
            .synthesize_answer(&topic, &summaries)
            .await
            .map_err(ResearchError::Llm)?;
        let answer = absorb_grounded(&response, &mut state);
        tracing::info!(
            loops = state.loop_count,
            segments = state.sources_gathered.len(),
            sources = state.resolver.len(),
            "answer synthesized"
        );
        self.send_progress(ResearchProgress::Completed);

        Ok(ResearchOutcome { answer, sources: state.resolver.sources() })
    }

    /// Fan the pending queries out as independent search tasks, then fold
    /// the results into the run state.
    ///
    /// Aggregation happens in dispatch order after every task has finished
    /// (single writer), so short-URL sequence numbers are deterministic no
    /// matter how the searches interleave. Cancellation aborts the in-flight
    /// round and merges nothing.
    async fn run_searches(
        &self,
        queries: &[Query],
        state: &mut LoopState,
    ) -> Result<(), ResearchError> {
        self.send_progress(ResearchProgress::SearchesStarted(queries.len()));

        let mut handles = Vec::with_capacity(queries.len());
        for q in queries {
            tracing::debug!(query = %q.query, rationale = %q.rationale, "dispatching search");
            let search = self.search.clone();
            let query = q.query.clone();
            handles.push(tokio::spawn(async move {
                let result = search.search(&query).await;
                (query, result)
            }));
        }

        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let joined = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                for handle in abort_handles {
                    handle.abort();
                }
                return Err(ResearchError::Cancelled);
            }
            joined = futures_util::future::join_all(handles) => joined,
        };

        for joined_result in joined {
            let (query, result) =
                joined_result.map_err(|e| ResearchError::Search(anyhow::Error::from(e)))?;
            let response = result.map_err(ResearchError::Search)?;
            self.send_progress(ResearchProgress::SearchCompleted(query));
            let summary = absorb_grounded(&response, state);
            state.accumulated_summaries.push(summary);
        }
        Ok(())
    }
}

/// Resolve a grounded response's sources through the run's resolver, splice
/// citation markers into its text, and record the segments gathered.
fn absorb_grounded(response: &GroundedResponse, state: &mut LoopState) -> String {
    state.resolver.resolve(response.grounding_chunks());
    let citations = get_citations(Some(response), state.resolver.mapping());
    let text = insert_citation_markers(&response.text(), &citations);
    for citation in &citations {
        state.sources_gathered.extend(citation.segments.iter().cloned());
    }
    text
}
