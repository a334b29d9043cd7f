//! OpenAI chat-completions adapter, used for creative queries.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{
    estimate_tokens, status_error, GenerationOptions, ModelError, ModelId, ModelInfo, ModelProvider,
    RateLimiter, UsageSnapshot, UsageTracker, MODEL_TIMEOUT,
};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUESTS_PER_MINUTE: u32 = 50;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 4000;

const SYSTEM_MESSAGE: &str = "You are a digital marketing analyst AI assistant. You analyze marketing \
data from Google Ads, Google Analytics 4, and WordPress to provide actionable insights and \
recommendations. Always structure your responses with clear sections: Summary, Key Trends, and \
Recommendations.";

/// Chat models this adapter knows the pricing of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum OpenAiModel {
    #[default]
    #[serde(rename = "gpt-4-turbo-preview")]
    Gpt4TurboPreview,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl OpenAiModel {
    pub fn name(&self) -> &'static str {
        match self {
            OpenAiModel::Gpt4TurboPreview => "gpt-4-turbo-preview",
            OpenAiModel::Gpt4 => "gpt-4",
            OpenAiModel::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    /// USD per 1k (input, output) tokens.
    fn pricing(&self) -> (f64, f64) {
        match self {
            OpenAiModel::Gpt4TurboPreview => (0.01, 0.03),
            OpenAiModel::Gpt4 => (0.03, 0.06),
            OpenAiModel::Gpt35Turbo => (0.0005, 0.0015),
        }
    }
}

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    model: OpenAiModel,
    limiter: RateLimiter,
    usage: UsageTracker,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_url: API_URL.to_string(),
            model: OpenAiModel::default(),
            limiter: RateLimiter::per_minute(REQUESTS_PER_MINUTE),
            usage: UsageTracker::new(),
        }
    }

    /// Override the chat-completions endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_model(mut self, model: OpenAiModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_rate_limit(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn id(&self) -> ModelId {
        ModelId::OpenAi
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::NotConfigured("OpenAI"))?;

        if !self.limiter.try_acquire() {
            warn!(model = self.model.name(), "OpenAI request budget exhausted");
            return Err(ModelError::RateLimited);
        }

        let body = json!({
            "model": self.model.name(),
            "messages": [
                {"role": "system", "content": SYSTEM_MESSAGE},
                {"role": "user", "content": prompt},
            ],
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        });

        debug!(
            model = self.model.name(),
            prompt_chars = prompt.len(),
            budget_left = self.limiter.remaining(),
            "Calling OpenAI"
        );
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(MODEL_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let body: ChatResponse = response.json().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ModelError::EmptyResponse("No content generated".to_string()))?;

        let (prompt_tokens, completion_tokens) = match body.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (estimate_tokens(SYSTEM_MESSAGE) + estimate_tokens(prompt), estimate_tokens(&text)),
        };
        let cost = self.model_info().estimate_cost(prompt_tokens, completion_tokens);
        self.usage.record(prompt_tokens, completion_tokens, cost);

        Ok(text)
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    fn reset_usage(&self) {
        self.usage.reset();
    }

    fn model_info(&self) -> ModelInfo {
        let (input, output) = self.model.pricing();
        ModelInfo {
            name: self.model.name(),
            provider: "OpenAI",
            max_tokens: DEFAULT_MAX_TOKENS,
            input_cost_per_1k: input,
            output_cost_per_1k: output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(reqwest::Client::new(), Some("sk-test".into()))
            .with_api_url(format!("{}/v1/chat/completions", server.uri()))
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 2000, "completion_tokens": 1000, "total_tokens": 3000}
        })
    }

    #[tokio::test]
    async fn test_generate_sends_system_message_and_overrides() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4-turbo-preview",
                "max_tokens": 500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Try a new headline.")))
            .expect(1)
            .mount(&server)
            .await;

        let openai = provider(&server);
        let options = GenerationOptions {
            max_tokens: Some(500),
            ..Default::default()
        };
        let text = openai.generate("Write ad copy", &options).await.unwrap();
        assert_eq!(text, "Try a new headline.");

        let usage = openai.usage();
        assert_eq!(usage.prompt_tokens, 2000);
        // 2 * 0.01 + 1 * 0.03
        assert!((usage.estimated_cost - 0.05).abs() < 1e-9);

        openai.reset_usage();
        assert_eq!(openai.usage().requests, 0);
    }

    #[tokio::test]
    async fn test_call_over_budget_is_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let openai = provider(&server).with_rate_limit(RateLimiter::per_minute(1));
        let options = GenerationOptions::default();
        assert!(openai.generate("first", &options).await.is_ok());
        assert!(matches!(
            openai.generate("second", &options).await,
            Err(ModelError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_bad_key_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided: sk-test.", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate("prompt", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: Incorrect API key provided: sk-test.");
    }

    #[test]
    fn test_model_info_follows_selected_model() {
        let openai = OpenAiProvider::new(reqwest::Client::new(), None).with_model(OpenAiModel::Gpt35Turbo);
        let info = openai.model_info();
        assert_eq!(info.name, "gpt-3.5-turbo");
        assert_eq!(info.input_cost_per_1k, 0.0005);
        assert!((info.estimate_cost(1000, 1000) - 0.002).abs() < 1e-12);
    }
}
