//! Typed provider settings snapshot.
//!
//! The bundle is stored as one JSON secret; decrypting it is Secrets Manager's
//! job. It is read once at start-up and treated as read-only afterwards.

use serde::Deserialize;

use crate::llm::openai::OpenAiModel;
use crate::{Error, Result};

/// Credentials and feature flags for every upstream provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub google_ads: GoogleAdsCredentials,
    pub ga4: Ga4Credentials,
    pub site: SiteCredentials,
    pub openai_api_key: Option<String>,
    /// Chat model for creative queries; the adapter default when unset
    pub openai_model: Option<OpenAiModel>,
    pub gemini_api_key: Option<String>,
    pub enable_weekly_reports: bool,
    pub enable_monthly_reports: bool,
    pub slack_webhook_url: Option<String>,
}

/// OAuth client and account identifiers for the Google Ads API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleAdsCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub developer_token: Option<String>,
    /// Account the reports are run against; dashes are stripped
    pub customer_id: Option<String>,
    /// Manager account, when access goes through one
    pub login_customer_id: Option<String>,
}

/// GA4 property and service account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ga4Credentials {
    pub property_id: Option<String>,
    /// Raw service-account key file contents
    pub service_account_json: Option<String>,
}

/// WordPress REST API access.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteCredentials {
    /// Site root, e.g. `https://example.com`
    pub url: Option<String>,
    pub username: Option<String>,
    /// WordPress application password
    pub application_password: Option<String>,
}

impl Settings {
    /// Parse the settings bundle from its JSON secret string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("Failed to parse settings bundle: {}", e)))
    }
}

/// Treat blank strings the same as missing values.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
