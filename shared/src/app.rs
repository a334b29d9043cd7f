//! Start-up wiring shared by the Lambda binaries.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStore, PgCacheStore};
use crate::delivery::{DeliveryChannel, EmailChannel, WebhookChannel};
use crate::llm::{GeminiProvider, OpenAiProvider};
use crate::orchestrator::{DataSources, ModelProviders, OrchestratorOptions, QueryOrchestrator};
use crate::reports::ReportService;
use crate::sources::{Ga4Source, GoogleAdsSource, WordPressSource};
use crate::token_cache::TokenCache;
use crate::{db, Config, Result, SecretStore, Settings};

/// Everything a handler needs, built once per Lambda instance.
pub struct App {
    pub config: Config,
    pub settings: Settings,
    pub orchestrator: Arc<QueryOrchestrator>,
    ses: aws_sdk_ses::Client,
    http: reqwest::Client,
}

impl App {
    /// Read configuration and secrets, connect to the database and assemble
    /// the orchestrator.
    pub async fn load() -> Result<Self> {
        let config = Config::from_env()?;
        let aws = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;

        let secrets = SecretStore::new(aws_sdk_secretsmanager::Client::new(&aws));
        let settings = secrets.load_settings(&config.settings_secret_arn).await?;
        let credentials = secrets.get_database_credentials(&config.db_secret_arn).await?;

        let pool = db::create_pool(&config, &credentials).await?;
        let cache = PgCacheStore::new(pool);
        cache.ensure_schema().await?;

        let http = reqwest::Client::builder().build()?;
        let orchestrator = build_orchestrator(&config, &settings, Arc::new(cache), http.clone());

        info!(region = %config.aws_region, "Application initialized");
        Ok(Self {
            ses: aws_sdk_ses::Client::new(&aws),
            config,
            settings,
            orchestrator: Arc::new(orchestrator),
            http,
        })
    }

    /// Report service with every configured delivery channel.
    pub fn report_service(&self) -> ReportService {
        let mut channels: Vec<Arc<dyn DeliveryChannel>> = Vec::new();

        match &self.config.report_email {
            Some(to) => channels.push(Arc::new(EmailChannel::new(
                self.ses.clone(),
                self.config.from_email.clone(),
                to.clone(),
            ))),
            None => warn!("REPORT_EMAIL not set, email delivery disabled"),
        }

        if let Some(url) = self.settings.slack_webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            channels.push(Arc::new(WebhookChannel::new(self.http.clone(), url)));
        }

        ReportService::new(
            self.orchestrator.clone(),
            channels,
            self.settings.enable_weekly_reports,
            self.settings.enable_monthly_reports,
        )
    }
}

/// Assemble the orchestrator from settings and an already-connected cache.
pub fn build_orchestrator(
    config: &Config,
    settings: &Settings,
    cache: Arc<dyn CacheStore>,
    http: reqwest::Client,
) -> QueryOrchestrator {
    let tokens = Arc::new(TokenCache::new());

    let sources = DataSources {
        ads: Arc::new(GoogleAdsSource::new(http.clone(), tokens.clone(), &settings.google_ads)),
        analytics: Arc::new(Ga4Source::new(http.clone(), tokens, &settings.ga4)),
        site: Arc::new(WordPressSource::new(http.clone(), &settings.site)),
    };
    let models = ModelProviders {
        gemini: Arc::new(GeminiProvider::new(http.clone(), settings.gemini_api_key.clone())),
        openai: Arc::new(
            OpenAiProvider::new(http, settings.openai_api_key.clone())
                .with_model(settings.openai_model.unwrap_or_default()),
        ),
    };
    let options = OrchestratorOptions {
        cache_ttl: config.cache_ttl,
        deadline: config.query_deadline,
        ..Default::default()
    };

    QueryOrchestrator::new(sources, models, cache, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::models::{ModelPreference, QueryRequest};
    use crate::Error;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            db_host: "localhost".into(),
            db_name: "marketing_insights".into(),
            db_secret_arn: "arn:db".into(),
            aws_region: "us-east-1".into(),
            settings_secret_arn: "arn:settings".into(),
            cache_ttl: Duration::from_secs(3600),
            query_deadline: Duration::from_secs(5),
            report_email: None,
            from_email: "reports@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_install_runs_on_sample_data_until_the_model_step() {
        let orchestrator = build_orchestrator(
            &config(),
            &Settings::default(),
            Arc::new(MemoryCacheStore::new()),
            reqwest::Client::new(),
        );

        let range = crate::models::DateRange::parse("2024-01-01", "2024-01-07").unwrap();
        let dataset = orchestrator.fetch_data(range).await;
        assert!(dataset.ads.ready().unwrap().note.is_some());
        assert!(dataset.analytics.ready().unwrap().note.is_some());
        assert!(dataset.site.ready().unwrap().note.is_some());

        // No API keys: the model step fails with the generic error.
        let request = QueryRequest::new("metrics", "2024-01-01", "2024-01-07", ModelPreference::Auto);
        let err = orchestrator.process_query(&request).await.unwrap_err();
        assert!(matches!(err, Error::AiServiceUnavailable));
    }

    #[test]
    fn test_openai_model_setting_reaches_the_adapter() {
        let settings = Settings::from_json(r#"{"openai_model": "gpt-4"}"#).unwrap();
        let orchestrator = build_orchestrator(
            &config(),
            &settings,
            Arc::new(MemoryCacheStore::new()),
            reqwest::Client::new(),
        );

        let usage = orchestrator.model_usage();
        let openai = usage
            .iter()
            .find(|u| u.model == crate::llm::ModelId::OpenAi)
            .expect("openai usage");
        assert_eq!(openai.info.name, "gpt-4");
        assert_eq!(openai.info.input_cost_per_1k, 0.03);
    }
}
