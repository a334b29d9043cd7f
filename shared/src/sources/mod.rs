//! Marketing data source adapters.
//!
//! Each adapter turns one provider's API into a normalized report. Adapters
//! never fail past their own boundary: every problem becomes a
//! [`ProviderResult::Failed`] marker so one provider cannot block the others.

pub mod ga4;
pub mod google_ads;
pub mod wordpress;

pub use ga4::Ga4Source;
pub use google_ads::GoogleAdsSource;
pub use wordpress::WordPressSource;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::{DateRange, ProviderResult};

/// Rows kept in every breakdown list.
pub const TOP_N: usize = 10;

/// Per-call timeout for provider requests.
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Longest access-token lifetime accepted from a token endpoint.
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Failures inside a data-source adapter.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} API error (HTTP {status}): {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// A marketing data provider.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Report: Send;

    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch and normalize data for the range. Never fails; see module docs.
    async fn fetch(&self, range: &DateRange) -> ProviderResult<Self::Report>;
}

/// Convert an adapter-internal result into the per-source marker, logging failures.
pub(crate) fn settle<T>(source: &'static str, result: Result<T, SourceError>) -> ProviderResult<T> {
    match result {
        Ok(report) => ProviderResult::Ready(report),
        Err(e) => {
            warn!(source, error = %e, "Data source fetch failed");
            ProviderResult::failed(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// POST a form to an OAuth token endpoint, returning `(access_token, expires_in)`.
pub(crate) async fn request_access_token(
    http: &reqwest::Client,
    token_url: &str,
    params: &[(&str, &str)],
) -> Result<(String, i64), SourceError> {
    let response = http
        .post(token_url)
        .form(params)
        .timeout(SOURCE_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| SourceError::Malformed(format!("token response: {}", e)))?;

    if let Some(error) = body.error {
        return Err(SourceError::Auth(body.error_description.unwrap_or(error)));
    }
    if !status.is_success() {
        return Err(SourceError::Auth(format!(
            "token endpoint returned HTTP {}",
            status.as_u16()
        )));
    }

    let token = body
        .access_token
        .ok_or_else(|| SourceError::Malformed("token response has no access_token".to_string()))?;

    let expires_in = body.expires_in.unwrap_or(3600);
    if !(1..=MAX_TOKEN_LIFETIME_SECS).contains(&expires_in) {
        return Err(SourceError::Malformed(format!(
            "token response has out-of-range expires_in {}",
            expires_in
        )));
    }

    Ok((token, expires_in))
}

/// Turn a non-success response into [`SourceError::Upstream`], pulling out
/// Google-style `{"error": {"message": ...}}` bodies when present.
pub(crate) async fn upstream_error(provider: &'static str, response: reqwest::Response) -> SourceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown error".to_string());

    SourceError::Upstream {
        provider,
        status,
        message,
    }
}

/// Accept a number given either as JSON number or as a decimal string.
///
/// Google APIs encode int64 metrics as strings.
pub(crate) fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator`, or zero when the denominator is zero.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Deserialize)]
    struct Metric {
        #[serde(default, deserialize_with = "flexible_f64")]
        value: f64,
    }

    #[test]
    fn test_flexible_f64_accepts_strings_and_numbers() {
        let m: Metric = serde_json::from_str(r#"{"value":"1200"}"#).unwrap();
        assert_eq!(m.value, 1200.0);
        let m: Metric = serde_json::from_str(r#"{"value":3.5}"#).unwrap();
        assert_eq!(m.value, 3.5);
        let m: Metric = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(m.value, 0.0);
    }

    #[test]
    fn test_ratio_and_rounding() {
        assert_eq!(round2(ratio(1.0, 3.0) * 100.0), 33.33);
        assert_eq!(ratio(5.0, 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_token_exchange_surfaces_oauth_error_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = request_access_token(
            &http,
            &format!("{}/token", server.uri()),
            &[("grant_type", "refresh_token"), ("refresh_token", "rt")],
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Authentication failed: Token has been expired or revoked.");
    }

    #[tokio::test]
    async fn test_token_exchange_rejects_out_of_range_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t",
                "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = request_access_token(&http, &format!("{}/token", server.uri()), &[("grant_type", "refresh_token")])
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Malformed(_)));
        assert!(err.to_string().contains("expires_in"));
    }

    #[test]
    fn test_settle_converts_errors_to_markers() {
        let failed: ProviderResult<u32> =
            settle("test", Err(SourceError::Malformed("no rows".into())));
        assert_eq!(failed.error(), Some("Malformed response: no rows"));

        let ready = settle::<u32>("test", Ok(7));
        assert_eq!(ready.ready(), Some(&7));
    }
}
