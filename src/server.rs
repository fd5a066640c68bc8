//! The HTTP boundary: one research endpoint and a liveness probe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::citations::ResolvedSource;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::gemini::GeminiClient;
use crate::research::{ResearchParams, ResearchRunner};
use crate::state::{Message, Role};

pub const PING_PATH: &str = "/ping";
pub const RESEARCH_PATH: &str = "/research";

#[derive(Clone)]
pub struct AppState {
    client: Arc<GeminiClient>,
    defaults: ResearchParams,
    /// Run ids seed the URL resolver; short URLs stay unique across runs.
    run_counter: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(client: Arc<GeminiClient>, research: &ResearchConfig) -> Self {
        AppState {
            client,
            defaults: ResearchParams {
                initial_query_count: research.initial_search_query_count,
                max_loops: research.max_research_loops,
            },
            run_counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    /// Conversation so far; a bare `topic` is accepted as shorthand for a
    /// single user message.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub max_research_loops: Option<u32>,
    #[serde(default)]
    pub initial_search_query_count: Option<usize>,
    #[serde(default)]
    pub reasoning_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub answer: String,
    pub sources: Vec<ResolvedSource>,
}

#[derive(Debug)]
pub enum ApiError {
    Research(ResearchError),
}

impl From<ResearchError> for ApiError {
    fn from(err: ResearchError) -> Self {
        ApiError::Research(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            // A failed collaborator call fails the run; there is no
            // partial-answer fallback.
            ApiError::Research(err @ ResearchError::Llm(_))
            | ApiError::Research(err @ ResearchError::Search(_)) => {
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            ApiError::Research(err @ ResearchError::Cancelled) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PING_PATH, get(ping))
        .route(RESEARCH_PATH, post(research))
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

async fn research(
    State(st): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let mut messages = request.messages;
    if let Some(topic) = request.topic {
        messages.push(Message { role: Role::User, content: topic });
    }

    let params = ResearchParams {
        initial_query_count: request
            .initial_search_query_count
            .unwrap_or(st.defaults.initial_query_count),
        max_loops: request.max_research_loops.unwrap_or(st.defaults.max_loops),
    };
    let run_id = st.run_counter.fetch_add(1, Ordering::Relaxed);
    tracing::info!(run_id, max_loops = params.max_loops, "starting research run");

    let llm = Arc::new(st.client.with_reasoning_model(request.reasoning_model.as_deref()));
    let runner = ResearchRunner::new(llm, st.client.clone(), params);
    let outcome = runner.run(&messages, run_id).await?;

    tracing::info!(run_id, sources = outcome.sources.len(), "research run complete");
    Ok(Json(ResearchResponse { answer: outcome.answer, sources: outcome.sources }))
}
