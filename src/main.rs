mod citations;
mod config;
mod error;
mod gemini;
mod grounding;
mod prompts;
mod research;
mod server;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load();
    if config.gemini.api_key.is_empty() {
        tracing::warn!(
            "no Gemini API key configured; set GEMINI_API_KEY or [gemini] api_key in {}",
            config::Config::get_config_path().display()
        );
    }

    let client = Arc::new(gemini::GeminiClient::with_config(
        config.gemini.base_url.clone(),
        config.gemini.api_key.clone(),
        gemini::GeminiModels {
            query_model: config.gemini.query_model.clone(),
            search_model: config.gemini.search_model.clone(),
            reflection_model: config.gemini.reflection_model.clone(),
            answer_model: config.gemini.answer_model.clone(),
        },
    ));

    let state = server::AppState::new(client, &config.research);
    let app = server::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
