//! Google Ads performance adapter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    flexible_f64, ratio, request_access_token, round2, settle, upstream_error, DataSource,
    SourceError, GOOGLE_TOKEN_URL, SOURCE_TIMEOUT, TOP_N,
};
use crate::models::{AdsReport, AdsSummary, CampaignRow, DateRange, ProviderResult};
use crate::settings::{non_empty, GoogleAdsCredentials};
use crate::token_cache::TokenCache;

const PROVIDER: &str = "google_ads";
const API_BASE: &str = "https://googleads.googleapis.com/v16";
/// Upper bound on result pages followed for one report.
const MAX_PAGES: usize = 10;

/// Fully configured account access.
#[derive(Debug, Clone)]
struct AdsAccount {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    developer_token: String,
    customer_id: String,
    login_customer_id: Option<String>,
}

#[derive(Debug, Clone)]
enum AdsMode {
    /// Nothing configured at all: serve labelled sample data
    Mock,
    /// Some fields set, others missing
    Incomplete(Vec<&'static str>),
    Live(AdsAccount),
}

/// Google Ads campaign performance source.
pub struct GoogleAdsSource {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    mode: AdsMode,
    token_url: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    #[serde(default)]
    campaign: CampaignField,
    #[serde(default)]
    metrics: MetricsField,
}

#[derive(Debug, Default, Deserialize)]
struct CampaignField {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsField {
    #[serde(default, deserialize_with = "flexible_f64")]
    impressions: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    clicks: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    cost_micros: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    conversions: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    conversions_value: f64,
}

impl GoogleAdsSource {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, credentials: &GoogleAdsCredentials) -> Self {
        Self {
            http,
            tokens,
            mode: resolve_mode(credentials),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    /// Point the adapter at different OAuth and API hosts.
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    async fn access_token(&self, account: &AdsAccount) -> Result<String, SourceError> {
        if let Some(token) = self.tokens.get(PROVIDER).await {
            return Ok(token);
        }

        debug!("Refreshing Google Ads access token");
        let (token, expires_in) = request_access_token(
            &self.http,
            &self.token_url,
            &[
                ("client_id", account.client_id.as_str()),
                ("client_secret", account.client_secret.as_str()),
                ("refresh_token", account.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
        )
        .await?;

        self.tokens.insert(PROVIDER, token.clone(), expires_in).await;
        Ok(token)
    }

    async fn fetch_performance(&self, account: &AdsAccount, range: &DateRange) -> Result<AdsReport, SourceError> {
        let access_token = self.access_token(account).await?;
        let url = format!(
            "{}/customers/{}/googleAds:search",
            self.api_base, account.customer_id
        );
        let query = build_query(range);

        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut body = json!({ "query": query });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }

            let mut request = self
                .http
                .post(&url)
                .bearer_auth(&access_token)
                .header("developer-token", &account.developer_token)
                .json(&body)
                .timeout(SOURCE_TIMEOUT);
            if let Some(login_id) = &account.login_customer_id {
                request = request.header("login-customer-id", login_id);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                if response.status().as_u16() == 401 {
                    self.tokens.invalidate(PROVIDER).await;
                }
                return Err(upstream_error("Google Ads", response).await);
            }

            let page: SearchResponse = response
                .json()
                .await
                .map_err(|e| SourceError::Malformed(format!("Google Ads search: {}", e)))?;
            rows.extend(page.results);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        info!(campaigns = rows.len(), "Fetched Google Ads performance");
        Ok(normalize(rows))
    }
}

#[async_trait]
impl DataSource for GoogleAdsSource {
    type Report = AdsReport;

    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, range: &DateRange) -> ProviderResult<AdsReport> {
        let result = match &self.mode {
            AdsMode::Mock => Ok(mock_report()),
            AdsMode::Incomplete(missing) => Err(SourceError::NotConfigured(format!(
                "Google Ads credentials not configured (missing {})",
                missing.join(", ")
            ))),
            AdsMode::Live(account) => self.fetch_performance(account, range).await,
        };
        settle(PROVIDER, result)
    }
}

fn resolve_mode(credentials: &GoogleAdsCredentials) -> AdsMode {
    let fields = [
        ("client_id", non_empty(&credentials.client_id)),
        ("client_secret", non_empty(&credentials.client_secret)),
        ("refresh_token", non_empty(&credentials.refresh_token)),
        ("developer_token", non_empty(&credentials.developer_token)),
        ("customer_id", non_empty(&credentials.customer_id)),
    ];

    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    if missing.len() == fields.len() {
        return AdsMode::Mock;
    }
    if !missing.is_empty() {
        return AdsMode::Incomplete(missing);
    }

    let value = |i: usize| fields[i].1.unwrap_or_default().to_string();
    AdsMode::Live(AdsAccount {
        client_id: value(0),
        client_secret: value(1),
        refresh_token: value(2),
        developer_token: value(3),
        customer_id: value(4).replace('-', ""),
        login_customer_id: non_empty(&credentials.login_customer_id).map(|id| id.replace('-', "")),
    })
}

fn build_query(range: &DateRange) -> String {
    format!(
        "SELECT campaign.id, campaign.name, metrics.impressions, metrics.clicks, \
         metrics.cost_micros, metrics.conversions, metrics.conversions_value \
         FROM campaign \
         WHERE segments.date BETWEEN '{}' AND '{}' \
         ORDER BY metrics.impressions DESC",
        range.start.format("%Y%m%d"),
        range.end.format("%Y%m%d")
    )
}

fn normalize(rows: Vec<SearchRow>) -> AdsReport {
    let mut impressions = 0.0;
    let mut clicks = 0.0;
    let mut cost = 0.0;
    let mut conversions = 0.0;
    let mut conversion_value = 0.0;
    let mut campaigns = Vec::new();

    for row in rows {
        let m = row.metrics;
        let row_cost = m.cost_micros / 1_000_000.0;

        impressions += m.impressions;
        clicks += m.clicks;
        cost += row_cost;
        conversions += m.conversions;
        conversion_value += m.conversions_value;

        if campaigns.len() < TOP_N {
            campaigns.push(CampaignRow {
                name: row.campaign.name.unwrap_or_else(|| "Unknown".to_string()),
                impressions: m.impressions as u64,
                clicks: m.clicks as u64,
                cost: round2(row_cost),
                conversions: m.conversions,
                ctr: round2(ratio(m.clicks, m.impressions) * 100.0),
                avg_cpc: round2(ratio(row_cost, m.clicks)),
            });
        }
    }

    AdsReport {
        summary: AdsSummary {
            total_impressions: impressions as u64,
            total_clicks: clicks as u64,
            total_cost: round2(cost),
            total_conversions: conversions,
            ctr: round2(ratio(clicks, impressions) * 100.0),
            avg_cpc: round2(ratio(cost, clicks)),
            roas: round2(ratio(conversion_value, cost)),
        },
        campaigns,
        note: None,
    }
}

fn mock_report() -> AdsReport {
    let campaign = |name: &str, impressions, clicks, cost, conversions, ctr| CampaignRow {
        name: name.to_string(),
        impressions,
        clicks,
        cost,
        conversions,
        ctr,
        avg_cpc: 0.43,
    };

    AdsReport {
        summary: AdsSummary {
            total_impressions: 45320,
            total_clicks: 2876,
            total_cost: 1234.56,
            total_conversions: 87.0,
            ctr: 6.35,
            avg_cpc: 0.43,
            roas: 3.82,
        },
        campaigns: vec![
            campaign("Brand Campaign", 23450, 1523, 654.32, 45.0, 6.49),
            campaign("Product Campaign", 21870, 1353, 580.24, 42.0, 6.19),
        ],
        note: Some("mock data - configure Google Ads API credentials for real data".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn full_credentials() -> GoogleAdsCredentials {
        GoogleAdsCredentials {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            refresh_token: Some("refresh".into()),
            developer_token: Some("dev-token".into()),
            customer_id: Some("123-456-7890".into()),
            login_customer_id: None,
        }
    }

    fn range() -> DateRange {
        DateRange::parse("2024-01-01", "2024-01-31").unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_serve_mock_data_without_network() {
        let source = GoogleAdsSource::new(
            reqwest::Client::new(),
            Arc::new(TokenCache::new()),
            &GoogleAdsCredentials::default(),
        )
        .with_endpoints("http://127.0.0.1:9/token", "http://127.0.0.1:9");

        let report = source.fetch(&range()).await;
        let report = report.ready().expect("mock report");
        assert!(report.note.as_deref().unwrap().starts_with("mock data"));
        assert_eq!(report.summary.total_impressions, 45320);
    }

    #[tokio::test]
    async fn test_partial_credentials_are_an_error_marker() {
        let credentials = GoogleAdsCredentials {
            developer_token: Some("dev-token".into()),
            ..Default::default()
        };
        let source = GoogleAdsSource::new(reqwest::Client::new(), Arc::new(TokenCache::new()), &credentials);

        let result = source.fetch(&range()).await;
        let error = result.error().expect("error marker");
        assert!(error.contains("not configured"));
        assert!(error.contains("refresh_token"));
    }

    #[tokio::test]
    async fn test_fetch_normalizes_campaign_metrics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/customers/1234567890/googleAds:search"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(header("developer-token", "dev-token"))
            .and(body_string_contains("BETWEEN '20240101' AND '20240131'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "campaign": {"id": "1", "name": "Brand"},
                        "metrics": {"impressions": "1000", "clicks": "50", "costMicros": "25000000",
                                    "conversions": 5.0, "conversionsValue": 100.0}
                    },
                    {
                        "campaign": {"id": "2", "name": "Retargeting"},
                        "metrics": {"impressions": "500", "clicks": "25", "costMicros": "25000000",
                                    "conversions": 1.0, "conversionsValue": 50.0}
                    }
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = Arc::new(TokenCache::new());
        let source = GoogleAdsSource::new(reqwest::Client::new(), tokens.clone(), &full_credentials())
            .with_endpoints(format!("{}/token", server.uri()), server.uri());

        let result = source.fetch(&range()).await;
        let report = result.ready().expect("ads report");
        assert_eq!(report.summary.total_impressions, 1500);
        assert_eq!(report.summary.total_clicks, 75);
        assert_eq!(report.summary.total_cost, 50.0);
        assert_eq!(report.summary.total_conversions, 6.0);
        assert_eq!(report.summary.ctr, 5.0);
        assert_eq!(report.summary.avg_cpc, 0.67);
        assert_eq!(report.summary.roas, 3.0);
        assert_eq!(report.campaigns[0].name, "Brand");
        assert_eq!(report.campaigns[1].avg_cpc, 1.0);
        assert!(report.note.is_none());

        // Second fetch reuses the cached access token.
        assert!(source.fetch(&range()).await.ready().is_some());
        assert_eq!(tokens.get(PROVIDER).await.as_deref(), Some("ya29.token"));
    }

    #[tokio::test]
    async fn test_api_error_becomes_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/customers/1234567890/googleAds:search"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "The caller does not have permission"}
            })))
            .mount(&server)
            .await;

        let source = GoogleAdsSource::new(reqwest::Client::new(), Arc::new(TokenCache::new()), &full_credentials())
            .with_endpoints(format!("{}/token", server.uri()), server.uri());

        let result = source.fetch(&range()).await;
        assert_eq!(
            result.error(),
            Some("Google Ads API error (HTTP 403): The caller does not have permission")
        );
    }

    #[tokio::test]
    async fn test_absurd_token_lifetime_becomes_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "t",
                "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/customers/1234567890/googleAds:search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .expect(0)
            .mount(&server)
            .await;

        let source = GoogleAdsSource::new(reqwest::Client::new(), Arc::new(TokenCache::new()), &full_credentials())
            .with_endpoints(format!("{}/token", server.uri()), server.uri());

        let result = tokio::spawn(async move { source.fetch(&range()).await })
            .await
            .expect("fetch must not panic");
        let error = result.error().expect("error marker");
        assert!(error.starts_with("Malformed response"));
    }

    #[test]
    fn test_campaign_rows_are_capped() {
        let rows = (0..15)
            .map(|i| SearchRow {
                campaign: CampaignField {
                    name: Some(format!("Campaign {}", i)),
                },
                metrics: MetricsField {
                    impressions: 100.0,
                    ..Default::default()
                },
            })
            .collect();

        let report = normalize(rows);
        assert_eq!(report.campaigns.len(), TOP_N);
        assert_eq!(report.summary.total_impressions, 1500);
        assert_eq!(report.campaigns[9].name, "Campaign 9");
    }
}
