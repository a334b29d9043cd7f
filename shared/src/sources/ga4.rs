//! Google Analytics 4 adapter.
//!
//! Authenticates with a service-account key: a signed RS256 assertion is
//! exchanged for an access token, which is cached until shortly before expiry.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ratio, request_access_token, round2, settle, upstream_error, DataSource, SourceError,
    GOOGLE_TOKEN_URL, SOURCE_TIMEOUT, TOP_N,
};
use crate::models::{AnalyticsReport, AnalyticsSummary, DateRange, ProviderResult, TrafficSourceRow};
use crate::settings::{non_empty, Ga4Credentials};
use crate::token_cache::TokenCache;

const PROVIDER: &str = "ga4";
const API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";
const SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

const METRICS: [&str; 6] = [
    "sessions",
    "totalUsers",
    "bounceRate",
    "averageSessionDuration",
    "conversions",
    "screenPageViews",
];

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
}

#[derive(Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

struct ServiceAccount {
    property_id: String,
    client_email: String,
    key: EncodingKey,
}

enum Ga4Mode {
    Mock,
    Misconfigured(String),
    Live(ServiceAccount),
}

/// GA4 traffic and engagement source.
pub struct Ga4Source {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    mode: Ga4Mode,
    token_url: String,
    api_base: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<CellValue>,
    #[serde(default)]
    metric_values: Vec<CellValue>,
}

#[derive(Debug, Default, Deserialize)]
struct CellValue {
    #[serde(default)]
    value: String,
}

impl ReportRow {
    fn metric(&self, index: usize) -> f64 {
        self.metric_values
            .get(index)
            .and_then(|v| v.value.trim().parse().ok())
            .unwrap_or(0.0)
    }

    fn source(&self) -> &str {
        self.dimension_values
            .get(1)
            .map(|v| v.value.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("direct")
    }
}

impl Ga4Source {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, credentials: &Ga4Credentials) -> Self {
        Self {
            http,
            tokens,
            mode: resolve_mode(credentials),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    fn sign_assertion(&self, account: &ServiceAccount) -> Result<String, SourceError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: account.client_email.clone(),
            scope: SCOPE.to_string(),
            aud: self.token_url.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &account.key)
            .map_err(|e| SourceError::Auth(format!("failed to sign service account assertion: {}", e)))
    }

    async fn access_token(&self, account: &ServiceAccount) -> Result<String, SourceError> {
        if let Some(token) = self.tokens.get(PROVIDER).await {
            return Ok(token);
        }

        debug!("Requesting GA4 access token");
        let assertion = self.sign_assertion(account)?;
        let (token, expires_in) = request_access_token(
            &self.http,
            &self.token_url,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
        .await?;

        self.tokens.insert(PROVIDER, token.clone(), expires_in).await;
        Ok(token)
    }

    async fn run_report(&self, account: &ServiceAccount, range: &DateRange) -> Result<AnalyticsReport, SourceError> {
        let access_token = self.access_token(account).await?;
        let url = format!("{}/properties/{}:runReport", self.api_base, account.property_id);

        let body = json!({
            "dateRanges": [{
                "startDate": range.start.to_string(),
                "endDate": range.end.to_string(),
            }],
            "dimensions": [{"name": "date"}, {"name": "sessionSource"}],
            "metrics": METRICS.iter().map(|name| json!({"name": name})).collect::<Vec<_>>(),
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .json(&body)
            .timeout(SOURCE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            if response.status().as_u16() == 401 {
                self.tokens.invalidate(PROVIDER).await;
            }
            return Err(upstream_error("GA4", response).await);
        }

        let report: ReportResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("GA4 runReport: {}", e)))?;

        info!(rows = report.rows.len(), "Fetched GA4 report");
        Ok(normalize(report.rows))
    }
}

#[async_trait]
impl DataSource for Ga4Source {
    type Report = AnalyticsReport;

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, range: &DateRange) -> ProviderResult<AnalyticsReport> {
        let result = match &self.mode {
            Ga4Mode::Mock => Ok(mock_report()),
            Ga4Mode::Misconfigured(reason) => Err(SourceError::NotConfigured(reason.clone())),
            Ga4Mode::Live(account) => self.run_report(account, range).await,
        };
        settle(PROVIDER, result)
    }
}

fn resolve_mode(credentials: &Ga4Credentials) -> Ga4Mode {
    let property_id = non_empty(&credentials.property_id);
    let key_json = non_empty(&credentials.service_account_json);

    let (property_id, key_json) = match (property_id, key_json) {
        (None, None) => return Ga4Mode::Mock,
        (Some(p), Some(k)) => (p, k),
        (None, Some(_)) => return Ga4Mode::Misconfigured("GA4 property ID not configured".to_string()),
        (Some(_), None) => {
            return Ga4Mode::Misconfigured("GA4 service account key not configured".to_string())
        }
    };

    let key: ServiceAccountKey = match serde_json::from_str(key_json) {
        Ok(key) => key,
        Err(e) => return Ga4Mode::Misconfigured(format!("GA4 service account key is not valid JSON: {}", e)),
    };

    match EncodingKey::from_rsa_pem(key.private_key.as_bytes()) {
        Ok(encoding_key) => Ga4Mode::Live(ServiceAccount {
            property_id: property_id.to_string(),
            client_email: key.client_email,
            key: encoding_key,
        }),
        Err(e) => Ga4Mode::Misconfigured(format!("GA4 service account private key is invalid: {}", e)),
    }
}

fn normalize(rows: Vec<ReportRow>) -> AnalyticsReport {
    let mut sessions = 0.0;
    let mut users = 0.0;
    let mut pageviews = 0.0;
    let mut conversions = 0.0;
    let mut bounce_sum = 0.0;
    let mut duration_sum = 0.0;
    // Kept in first-seen order; the stable sort below leaves ties in that order.
    let mut sources: Vec<TrafficSourceRow> = Vec::new();

    for row in &rows {
        let row_sessions = row.metric(0);
        let row_users = row.metric(1);

        sessions += row_sessions;
        users += row_users;
        bounce_sum += row.metric(2);
        duration_sum += row.metric(3);
        conversions += row.metric(4);
        pageviews += row.metric(5);

        let name = row.source();
        match sources.iter_mut().find(|s| s.source == name) {
            Some(entry) => {
                entry.sessions += row_sessions as u64;
                entry.users += row_users as u64;
            }
            None => sources.push(TrafficSourceRow {
                source: name.to_string(),
                sessions: row_sessions as u64,
                users: row_users as u64,
            }),
        }
    }

    sources.sort_by(|a, b| b.sessions.cmp(&a.sessions));
    sources.truncate(TOP_N);

    let row_count = rows.len() as f64;
    AnalyticsReport {
        summary: AnalyticsSummary {
            total_sessions: sessions as u64,
            total_users: users as u64,
            total_pageviews: pageviews as u64,
            total_conversions: round2(conversions),
            // GA4 reports bounce rate as a fraction
            avg_bounce_rate: round2(ratio(bounce_sum, row_count) * 100.0),
            avg_session_duration: round2(ratio(duration_sum, row_count)),
            pages_per_session: round2(ratio(pageviews, sessions)),
        },
        top_sources: sources,
        note: None,
    }
}

fn mock_report() -> AnalyticsReport {
    let source = |name: &str, sessions, users| TrafficSourceRow {
        source: name.to_string(),
        sessions,
        users,
    };

    AnalyticsReport {
        summary: AnalyticsSummary {
            total_sessions: 12543,
            total_users: 9876,
            total_pageviews: 34567,
            total_conversions: 234.0,
            avg_bounce_rate: 42.35,
            avg_session_duration: 145.67,
            pages_per_session: 2.76,
        },
        top_sources: vec![
            source("google", 5432, 4321),
            source("direct", 3456, 2876),
            source("facebook", 1876, 1543),
            source("twitter", 987, 789),
            source("linkedin", 792, 654),
        ],
        note: Some("mock data - configure GA4 credentials for real data".to_string()),
    }
}
