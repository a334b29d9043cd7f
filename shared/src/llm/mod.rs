//! Large-language-model provider adapters.

pub mod gemini;
pub mod openai;
pub mod rate_limit;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use rate_limit::RateLimiter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Per-call timeout for model requests.
pub const MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Concrete model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ModelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gemini => "gemini",
            ModelId::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call overrides. `None` keeps the adapter's default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0} API key not configured")]
    NotConfigured(&'static str),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    EmptyResponse(String),
}

/// A text-generation backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> ModelId;

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, ModelError>;

    /// Accumulated usage since start-up or the last reset.
    fn usage(&self) -> UsageSnapshot;

    fn reset_usage(&self);

    fn model_info(&self) -> ModelInfo;
}

/// Static description of the model behind an adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub provider: &'static str,
    pub max_tokens: u32,
    /// USD per 1k prompt tokens
    pub input_cost_per_1k: f64,
    /// USD per 1k completion tokens
    pub output_cost_per_1k: f64,
}

impl ModelInfo {
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated USD
    pub estimated_cost: f64,
}

/// Lock-free usage counters. Cost is kept in micro-dollars.
#[derive(Debug, Default)]
pub struct UsageTracker {
    requests: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    cost_micros: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64, cost: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion_tokens, Ordering::Relaxed);
        self.cost_micros
            .fetch_add((cost * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let prompt_tokens = self.prompt_tokens.load(Ordering::Relaxed);
        let completion_tokens = self.completion_tokens.load(Ordering::Relaxed);
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            estimated_cost: self.cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
        self.cost_micros.store(0, Ordering::Relaxed);
    }
}

/// Rough token count for text when the provider does not report one.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Map a non-success HTTP status to a [`ModelError`].
pub(crate) fn status_error(status: u16, body: &str) -> ModelError {
    let message = error_message(body);
    match status {
        429 => ModelError::RateLimited,
        401 | 403 => ModelError::Authentication(message),
        _ => ModelError::Upstream { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_usage_tracker_accumulates_and_resets() {
        let tracker = UsageTracker::new();
        tracker.record(1000, 500, 0.025);
        tracker.record(200, 100, 0.005);

        let usage = tracker.snapshot();
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.total_tokens, 1800);
        assert!((usage.estimated_cost - 0.03).abs() < 1e-9);

        tracker.reset();
        assert_eq!(tracker.snapshot(), UsageSnapshot::default());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(status_error(429, ""), ModelError::RateLimited));
        assert!(matches!(
            status_error(401, r#"{"error":{"message":"Incorrect API key provided"}}"#),
            ModelError::Authentication(m) if m == "Incorrect API key provided"
        ));
        assert!(matches!(
            status_error(500, "<html>"),
            ModelError::Upstream { status: 500, message } if message == "Unknown error"
        ));
    }

    #[test]
    fn test_model_id_wire_names() {
        assert_eq!(serde_json::to_string(&ModelId::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(serde_json::to_string(&ModelId::Gemini).unwrap(), "\"gemini\"");
    }
}
