//! Shared data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::llm::ModelId;
use crate::{Error, Result};

/// Caller's choice of model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelPreference {
    /// Pick a provider from the wording of the query
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "openai", alias = "gpt")]
    OpenAi,
}

impl ModelPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPreference::Auto => "auto",
            ModelPreference::Gemini => "gemini",
            ModelPreference::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ModelPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(ModelPreference::Auto),
            "gemini" => Ok(ModelPreference::Gemini),
            "openai" | "gpt" => Ok(ModelPreference::OpenAi),
            other => Err(Error::InvalidInput(format!("Unknown model '{}'", other))),
        }
    }
}

/// Query request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// ISO calendar date (`YYYY-MM-DD`)
    pub start_date: String,
    /// ISO calendar date (`YYYY-MM-DD`)
    pub end_date: String,
    #[serde(default)]
    pub model: ModelPreference,
}

impl QueryRequest {
    pub fn new(
        query: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        model: ModelPreference,
    ) -> Self {
        Self {
            query: query.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            model,
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse both ends as strict `YYYY-MM-DD` dates.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// The `days`-long window ending on `end`.
    pub fn trailing_days(end: NaiveDate, days: i64) -> Self {
        let start = end - chrono::Duration::days(days);
        Self { start, end }
    }
}

/// Strict ISO calendar date: must round-trip through `%Y-%m-%d` unchanged.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || Error::InvalidInput(format!("Invalid date format: '{}'", raw));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    if date.format("%Y-%m-%d").to_string() != raw {
        return Err(invalid());
    }
    Ok(date)
}

/// Outcome of one data-source fetch: a normalized report or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderResult<T> {
    Failed { error: String },
    Ready(T),
}

impl<T> ProviderResult<T> {
    pub fn failed(message: impl Into<String>) -> Self {
        ProviderResult::Failed {
            error: message.into(),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ProviderResult::Ready(report) => Some(report),
            ProviderResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProviderResult::Failed { error } => Some(error),
            ProviderResult::Ready(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProviderResult::Failed { .. })
    }
}

/// Paid-ads totals across all campaigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsSummary {
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_cost: f64,
    pub total_conversions: f64,
    /// Click-through rate, percent
    pub ctr: f64,
    pub avg_cpc: f64,
    /// Conversion value per unit of spend
    pub roas: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRow {
    pub name: String,
    pub impressions: u64,
    pub clicks: u64,
    pub cost: f64,
    pub conversions: f64,
    pub ctr: f64,
    pub avg_cpc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsReport {
    pub summary: AdsSummary,
    /// Top campaigns by impressions
    pub campaigns: Vec<CampaignRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Web-analytics totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_sessions: u64,
    pub total_users: u64,
    pub total_pageviews: u64,
    pub total_conversions: f64,
    /// Percent
    pub avg_bounce_rate: f64,
    /// Seconds
    pub avg_session_duration: f64,
    pub pages_per_session: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSourceRow {
    pub source: String,
    pub sessions: u64,
    pub users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub summary: AnalyticsSummary,
    /// Top traffic sources by sessions
    pub top_sources: Vec<TrafficSourceRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Content-site counts for the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSummary {
    pub site_url: String,
    pub total_posts: u64,
    pub total_pages: u64,
    pub total_comments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: u64,
    pub title: String,
    pub date: String,
    pub link: String,
    /// Approved comments on the post, when the count could be read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: u64,
    pub post: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_title: Option<String>,
    pub author: String,
    pub date: String,
    /// Plain-text excerpt of the comment
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteReport {
    pub summary: SiteSummary,
    /// Most recent posts in the period
    pub recent_posts: Vec<PostRow>,
    /// Most recent approved comments in the period
    #[serde(default)]
    pub recent_comments: Vec<CommentRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Everything fetched for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingDataset {
    pub ads: ProviderResult<AdsReport>,
    pub analytics: ProviderResult<AnalyticsReport>,
    pub site: ProviderResult<SiteReport>,
    pub date_range: DateRange,
}

/// Summary objects lifted from each source that succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads: Option<AdsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteSummary>,
}

impl MetricsSummary {
    pub fn from_dataset(dataset: &MarketingDataset) -> Self {
        Self {
            ads: dataset.ads.ready().map(|r| r.summary.clone()),
            analytics: dataset.analytics.ready().map(|r| r.summary.clone()),
            site: dataset.site.ready().map(|r| r.summary.clone()),
        }
    }
}

/// Generated insights plus the data they were generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedResponse {
    pub insights: String,
    pub raw_data: MarketingDataset,
    pub timestamp: DateTime<Utc>,
    pub metrics_summary: MetricsSummary,
}

impl FormattedResponse {
    pub fn new(insights: String, raw_data: MarketingDataset) -> Self {
        let metrics_summary = MetricsSummary::from_dataset(&raw_data);
        Self {
            insights,
            raw_data,
            timestamp: Utc::now(),
            metrics_summary,
        }
    }
}

/// Query response payload.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub cached: bool,
    pub data: FormattedResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<ModelId>,
}
