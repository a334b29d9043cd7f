//! Query orchestration: validate, consult the cache, fan out to the data
//! sources, pick a model, prompt it and memoize the formatted result.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{fingerprint, CacheStore, DEFAULT_TTL};
use crate::llm::{GenerationOptions, ModelId, ModelInfo, ModelProvider, UsageSnapshot};
use crate::models::{
    AdsReport, AnalyticsReport, DateRange, FormattedResponse, MarketingDataset, ModelPreference,
    QueryOutcome, QueryRequest, SiteReport,
};
use crate::prompt::PromptBuilder;
use crate::sources::DataSource;
use crate::{Error, Result};

/// Default end-to-end budget for one query.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(90);

const ANALYTIC_KEYWORDS: [&str; 6] = ["analytics", "data", "metrics", "statistics", "numbers", "performance"];
const CREATIVE_KEYWORDS: [&str; 6] = ["write", "create", "generate", "suggest", "recommend", "improve"];

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub cache_ttl: Duration,
    pub deadline: Duration,
    pub generation: GenerationOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            deadline: DEFAULT_DEADLINE,
            generation: GenerationOptions::default(),
        }
    }
}

/// The three marketing data providers.
#[derive(Clone)]
pub struct DataSources {
    pub ads: Arc<dyn DataSource<Report = AdsReport>>,
    pub analytics: Arc<dyn DataSource<Report = AnalyticsReport>>,
    pub site: Arc<dyn DataSource<Report = SiteReport>>,
}

#[derive(Clone)]
pub struct ModelProviders {
    pub gemini: Arc<dyn ModelProvider>,
    pub openai: Arc<dyn ModelProvider>,
}

impl ModelProviders {
    pub fn get(&self, id: ModelId) -> &Arc<dyn ModelProvider> {
        match id {
            ModelId::Gemini => &self.gemini,
            ModelId::OpenAi => &self.openai,
        }
    }

    fn all(&self) -> [&Arc<dyn ModelProvider>; 2] {
        [&self.gemini, &self.openai]
    }
}

/// Usage report for one model adapter.
#[derive(Debug, Clone, Serialize)]
pub struct ModelUsage {
    pub model: ModelId,
    pub info: ModelInfo,
    pub usage: UsageSnapshot,
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub query: String,
    pub range: DateRange,
    pub preference: ModelPreference,
    pub cache_key: String,
}

/// Check a request before any I/O happens.
pub fn validate(request: &QueryRequest) -> Result<ValidatedQuery> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidInput("Query cannot be empty".to_string()));
    }
    let range = DateRange::parse(&request.start_date, &request.end_date)?;

    Ok(ValidatedQuery {
        query: request.query.clone(),
        range,
        preference: request.model,
        cache_key: fingerprint(&request.query, &request.start_date, &request.end_date, request.model),
    })
}

/// Resolve a preference to a concrete model.
///
/// `Auto` scans the query for analytic wording first, then creative wording,
/// and falls back to Gemini.
pub fn select_model(query: &str, preference: ModelPreference) -> ModelId {
    match preference {
        ModelPreference::Gemini => ModelId::Gemini,
        ModelPreference::OpenAi => ModelId::OpenAi,
        ModelPreference::Auto => {
            let query = query.to_lowercase();
            if ANALYTIC_KEYWORDS.iter().any(|k| query.contains(k)) {
                ModelId::Gemini
            } else if CREATIVE_KEYWORDS.iter().any(|k| query.contains(k)) {
                ModelId::OpenAi
            } else {
                ModelId::Gemini
            }
        }
    }
}

/// Runs marketing queries end to end.
pub struct QueryOrchestrator {
    sources: DataSources,
    models: ModelProviders,
    cache: Arc<dyn CacheStore>,
    options: OrchestratorOptions,
}

impl QueryOrchestrator {
    pub fn new(
        sources: DataSources,
        models: ModelProviders,
        cache: Arc<dyn CacheStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            sources,
            models,
            cache,
            options,
        }
    }

    /// Answer a query, from the cache when possible.
    pub async fn process_query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let validated = validate(request)?;

        tokio::time::timeout(self.options.deadline, self.run(&validated))
            .await
            .map_err(|_| {
                warn!(
                    deadline_secs = self.options.deadline.as_secs(),
                    "Query exceeded its deadline"
                );
                Error::Timeout(self.options.deadline.as_secs())
            })?
    }

    async fn run(&self, query: &ValidatedQuery) -> Result<QueryOutcome> {
        if let Some(cached) = self.lookup(&query.cache_key).await {
            info!(cache_key = %query.cache_key, cached = true, "Serving cached insights");
            return Ok(QueryOutcome {
                cached: true,
                data: cached,
                model_used: None,
            });
        }

        let dataset = self.fetch_data(query.range).await;
        let model = select_model(&query.query, query.preference);
        let prompt = PromptBuilder::for_dataset(query.query.as_str(), &dataset)?.build();

        let provider = self.models.get(model);
        let insights = provider
            .generate(&prompt, &self.options.generation)
            .await
            .map_err(|e| {
                error!(model = %model, error = %e, "Model generation failed");
                Error::AiServiceUnavailable
            })?;

        let response = FormattedResponse::new(insights, dataset);
        self.store(&query.cache_key, &response).await;

        info!(
            query = %query.query,
            model = %model,
            start_date = %query.range.start,
            end_date = %query.range.end,
            cached = false,
            "Generated marketing insights"
        );

        Ok(QueryOutcome {
            cached: false,
            data: response,
            model_used: Some(model),
        })
    }

    /// Read and decode a cached response. Any failure counts as a miss.
    async fn lookup(&self, key: &str) -> Option<FormattedResponse> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, response: &FormattedResponse) {
        let encoded = match serde_json::to_string(response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode response for cache");
                return;
            }
        };

        if let Err(e) = self.cache.put(key, &encoded, self.options.cache_ttl).await {
            warn!(cache_key = key, error = %e, "Failed to store insights in cache");
        }
    }

    /// Fetch all three sources concurrently.
    pub async fn fetch_data(&self, range: DateRange) -> MarketingDataset {
        debug!(start = %range.start, end = %range.end, "Fetching marketing data");
        let (ads, analytics, site) = tokio::join!(
            self.sources.ads.fetch(&range),
            self.sources.analytics.fetch(&range),
            self.sources.site.fetch(&range)
        );

        MarketingDataset {
            ads,
            analytics,
            site,
            date_range: range,
        }
    }

    /// Remove every cached response.
    pub async fn clear_cache(&self) -> Result<u64> {
        let removed = self.cache.clear_all().await?;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Remove expired cache entries only.
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.cache.purge_expired().await?;
        info!(removed, "Expired cache entries purged");
        Ok(removed)
    }

    pub fn model_usage(&self) -> Vec<ModelUsage> {
        self.models
            .all()
            .iter()
            .map(|provider| ModelUsage {
                model: provider.id(),
                info: provider.model_info(),
                usage: provider.usage(),
            })
            .collect()
    }

    pub fn reset_usage(&self) {
        for provider in self.models.all() {
            provider.reset_usage();
        }
    }
}
