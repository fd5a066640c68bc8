//! Gemini `generateContent` client implementing both collaborator traits.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::grounding::GroundedResponse;
use crate::prompts;
use crate::research::{LanguageModel, Plan, Reflection, WebSearch};
use crate::state::Query;

/// Collaborator calls enforce their own deadline; the loop adds none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// Helper function to extract a JSON object from text. Models asked for JSON
// still wrap it in code fences or prose often enough that plain
// `from_str` is not sufficient.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut brace_count = 0;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' {
            escape = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
        }
        if !in_string {
            match ch {
                '{' => brace_count += 1,
                '}' => {
                    brace_count -= 1;
                    if brace_count == 0 {
                        return Some(text[start..start + i + ch.len_utf8()].to_string());
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Parse a structured model reply, recovering from fenced or prose-wrapped
/// output.
fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    let object = extract_json_object(text)
        .ok_or_else(|| anyhow::anyhow!("no JSON object found in model response"))?;
    serde_json::from_str(&object).context("malformed JSON object in model response")
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(rename = "generationConfig")]
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// Planner reply: `{"rationale": "...", "query": ["...", ...]}`.
#[derive(Debug, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    query: Vec<String>,
}

/// Reflection reply: `{"is_sufficient": ..., "knowledge_gap": ...,
/// "follow_up_queries": [...]}`.
#[derive(Debug, Deserialize)]
struct ReflectionPayload {
    #[serde(default)]
    is_sufficient: bool,
    #[serde(default)]
    knowledge_gap: String,
    #[serde(default)]
    follow_up_queries: Vec<String>,
}

/// Which model serves each stage of the run.
#[derive(Debug, Clone)]
pub struct GeminiModels {
    pub query_model: String,
    pub search_model: String,
    pub reflection_model: String,
    pub answer_model: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    models: GeminiModels,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn with_config(base_url: String, api_key: String, models: GeminiModels) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        GeminiClient { base_url, api_key, models, client }
    }

    /// A view of this client with the reflection and answer models replaced
    /// by the caller's reasoning model, for a single run.
    pub fn with_reasoning_model(&self, model: Option<&str>) -> GeminiClient {
        let mut client = self.clone();
        if let Some(model) = model {
            client.models.reflection_model = model.to_string();
            client.models.answer_model = model.to_string();
        }
        client
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        grounded: bool,
        json_reply: bool,
    ) -> Result<GroundedResponse> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart { text: prompt.to_string() }],
            }],
            tools: grounded.then(|| vec![json!({"google_search": {}})]),
            generation_config: json_reply.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/v1beta/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Gemini API error: {}", response.status()));
        }

        let grounded_response: GroundedResponse = response.json().await?;
        Ok(grounded_response)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn plan_queries(&self, topic: &str, count: usize) -> Result<Plan> {
        let prompt = prompts::query_writer(topic, count);
        let response = self
            .generate(&self.models.query_model, &prompt, false, true)
            .await?;
        let payload: PlanPayload = parse_structured(&response.text())?;
        let queries = payload
            .query
            .into_iter()
            .take(count.max(1))
            .map(|query| Query { query, rationale: payload.rationale.clone() })
            .collect();
        Ok(Plan { rationale: payload.rationale, queries })
    }

    async fn reflect(&self, topic: &str, summaries: &str) -> Result<Reflection> {
        let prompt = prompts::reflection(topic, summaries);
        let response = self
            .generate(&self.models.reflection_model, &prompt, false, true)
            .await?;
        let payload: ReflectionPayload = parse_structured(&response.text())?;
        Ok(Reflection {
            is_sufficient: payload.is_sufficient,
            knowledge_gap: payload.knowledge_gap,
            follow_up_queries: payload.follow_up_queries,
        })
    }

    async fn synthesize_answer(&self, topic: &str, summaries: &str) -> Result<GroundedResponse> {
        let prompt = prompts::answer(topic, summaries);
        self.generate(&self.models.answer_model, &prompt, false, false)
            .await
    }
}

#[async_trait]
impl WebSearch for GeminiClient {
    async fn search(&self, query: &str) -> Result<GroundedResponse> {
        let prompt = prompts::web_searcher(query);
        self.generate(&self.models.search_model, &prompt, true, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_code_fence() {
        let text = "Here you go:\n```json\n{\"rationale\": \"because\", \"query\": [\"a\"]}\n```";
        let payload: PlanPayload = parse_structured(text).unwrap();
        assert_eq!(payload.rationale, "because");
        assert_eq!(payload.query, vec!["a"]);
    }

    #[test]
    fn extracts_nested_object_from_prose() {
        let text = "Sure. {\"outer\": {\"inner\": 1}, \"query\": []} Anything else?";
        let object = extract_json_object(text).unwrap();
        assert_eq!(object, "{\"outer\": {\"inner\": 1}, \"query\": []}");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let text = r#"{"knowledge_gap": "missing {pricing} data", "is_sufficient": false}"#;
        let payload: ReflectionPayload = parse_structured(text).unwrap();
        assert!(!payload.is_sufficient);
        assert_eq!(payload.knowledge_gap, "missing {pricing} data");
    }

    #[test]
    fn reflection_fields_default_when_absent() {
        let payload: ReflectionPayload = parse_structured("{\"is_sufficient\": true}").unwrap();
        assert!(payload.is_sufficient);
        assert!(payload.knowledge_gap.is_empty());
        assert!(payload.follow_up_queries.is_empty());
    }

    #[test]
    fn unparseable_reply_is_an_error() {
        assert!(parse_structured::<PlanPayload>("no json here").is_err());
    }
}
