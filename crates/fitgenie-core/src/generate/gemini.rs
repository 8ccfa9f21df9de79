//! Google Gemini `generateContent` backend.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::trait_def::TextGenerator;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Connection settings for [`GeminiGenerator`].
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Calls the Gemini REST API once per [`TextGenerator::generate`].
pub struct GeminiGenerator {
    config: GeminiConfig,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("Gemini API key is empty");
        }
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read Gemini response body")?;

        if !status.is_success() {
            return Err(map_api_error(status.as_u16(), &text));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).context("failed to parse Gemini response")?;
        completion_text(parsed)
    }
}

fn map_api_error(status: u16, body: &str) -> anyhow::Error {
    let message = serde_json::from_str::<GenerateResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map_or_else(|| body.trim().to_owned(), |e| e.message);
    anyhow!("Gemini API error ({status}): {message}")
}

fn completion_text(response: GenerateResponse) -> Result<String> {
    if let Some(error) = response.error {
        bail!("Gemini API error: {}", error.message);
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        bail!("Gemini returned no candidates");
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        bail!(
            "Gemini returned an empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone)]
    struct Fake {
        status: StatusCode,
        reply: Value,
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn handler(
        State(fake): State<Fake>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let key = headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        fake.seen.lock().unwrap().push((key, body));
        (fake.status, Json(fake.reply.clone()))
    }

    async fn serve(fake: Fake) -> String {
        let app = Router::new()
            .route("/v1beta/models/{call}", post(handler))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1beta")
    }

    fn fake(status: StatusCode, reply: Value) -> Fake {
        Fake {
            status,
            reply,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn generator(base_url: String) -> GeminiGenerator {
        GeminiGenerator::new(GeminiConfig::new("test-key").with_base_url(base_url)).unwrap()
    }

    #[tokio::test]
    async fn returns_candidate_text_and_sends_prompt() {
        let fake = fake(
            StatusCode::OK,
            json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"plan\":" }, { "text": "{}}" }] },
                    "finishReason": "STOP"
                }]
            }),
        );
        let seen = fake.seen.clone();
        let base = serve(fake).await;

        let text = generator(base).generate("PROMPT TEXT").await.unwrap();
        assert_eq!(text, "{\"plan\":{}}");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (key, body) = &seen[0];
        assert_eq!(key.as_deref(), Some("test-key"));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "PROMPT TEXT");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn non_success_status_is_error() {
        let base = serve(fake(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": { "message": "quota exhausted" } }),
        ))
        .await;

        let err = generator(base).generate("p").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"), "{msg}");
        assert!(msg.contains("quota exhausted"), "{msg}");
    }

    #[tokio::test]
    async fn error_payload_with_ok_status_is_error() {
        let base = serve(fake(
            StatusCode::OK,
            json!({ "error": { "message": "model overloaded" } }),
        ))
        .await;

        let err = generator(base).generate("p").await.unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
    }

    #[tokio::test]
    async fn empty_candidates_are_error() {
        let base = serve(fake(StatusCode::OK, json!({ "candidates": [] }))).await;
        let err = generator(base).generate("p").await.unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[tokio::test]
    async fn blank_candidate_is_error() {
        let base = serve(fake(
            StatusCode::OK,
            json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }] }),
        ))
        .await;
        let err = generator(base).generate("p").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn debug_hides_api_key() {
        let shown = format!("{:?}", GeminiConfig::new("AIza-secret-key"));
        assert!(!shown.contains("AIza-secret-key"));
        assert!(shown.contains("gemini-1.5-flash"));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(GeminiGenerator::new(GeminiConfig::new("  ")).is_err());
    }

    #[test]
    fn url_uses_model_and_trims_slash() {
        let g = GeminiGenerator::new(
            GeminiConfig::new("k")
                .with_model("gemini-2.0-flash")
                .with_base_url("http://localhost:9/v1beta/"),
        )
        .unwrap();
        assert_eq!(
            g.url(),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(g.model(), "gemini-2.0-flash");
    }
}
