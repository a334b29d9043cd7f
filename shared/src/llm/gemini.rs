//! Google Gemini adapter, used for analytical queries.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    estimate_tokens, status_error, GenerationOptions, ModelError, ModelId, ModelInfo, ModelProvider,
    RateLimiter, UsageSnapshot, UsageTracker, MODEL_TIMEOUT,
};

const MODEL: &str = "gemini-1.5-pro";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUESTS_PER_MINUTE: u32 = 60;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 8000;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const MODEL_INFO: ModelInfo = ModelInfo {
    name: MODEL,
    provider: "Google",
    max_tokens: DEFAULT_MAX_TOKENS,
    input_cost_per_1k: 0.00025,
    output_cost_per_1k: 0.00025,
};

pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    limiter: RateLimiter,
    usage: UsageTracker,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

impl GeminiProvider {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_base: API_BASE.to_string(),
            limiter: RateLimiter::per_minute(REQUESTS_PER_MINUTE),
            usage: UsageTracker::new(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_rate_limit(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn request_body(prompt: &str, options: &GenerationOptions) -> serde_json::Value {
        let safety_settings: Vec<_> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE"}))
            .collect();

        json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                "maxOutputTokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                "topP": 0.95,
                "topK": 40,
            },
            "safetySettings": safety_settings,
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn id(&self) -> ModelId {
        ModelId::Gemini
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::NotConfigured("Gemini"))?;

        if !self.limiter.try_acquire() {
            warn!(model = MODEL, "Gemini request budget exhausted");
            return Err(ModelError::RateLimited);
        }

        debug!(
            model = MODEL,
            prompt_chars = prompt.len(),
            budget_left = self.limiter.remaining(),
            "Calling Gemini"
        );
        let response = self
            .http
            .post(format!("{}/{}:generateContent", self.api_base, MODEL))
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(prompt, options))
            .timeout(MODEL_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let body: GenerateResponse = response.json().await?;
        let candidate = body.candidates.first();

        let text: String = candidate
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let blocked = candidate
                .and_then(|c| c.finish_reason.as_deref())
                .is_some_and(|reason| reason == "SAFETY");
            return Err(ModelError::EmptyResponse(if blocked {
                "Content was blocked by safety filters".to_string()
            } else {
                "No content generated".to_string()
            }));
        }

        let usage = body.usage_metadata.as_ref();
        let prompt_tokens = usage
            .and_then(|u| u.prompt_token_count)
            .unwrap_or_else(|| estimate_tokens(prompt));
        let completion_tokens = usage
            .and_then(|u| u.candidates_token_count)
            .unwrap_or_else(|| estimate_tokens(&text));
        self.usage.record(
            prompt_tokens,
            completion_tokens,
            MODEL_INFO.estimate_cost(prompt_tokens, completion_tokens),
        );

        Ok(text)
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    fn reset_usage(&self) {
        self.usage.reset();
    }

    fn model_info(&self) -> ModelInfo {
        MODEL_INFO
    }
}
