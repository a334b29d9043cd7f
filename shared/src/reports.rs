//! Scheduled marketing reports.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::delivery::{DeliveryChannel, ReportPayload};
use crate::models::{DateRange, ModelPreference, QueryRequest};
use crate::orchestrator::QueryOrchestrator;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCadence {
    Weekly,
    Monthly,
}

impl ReportCadence {
    pub fn window_days(&self) -> i64 {
        match self {
            ReportCadence::Weekly => 7,
            ReportCadence::Monthly => 30,
        }
    }

    pub fn query(&self) -> &'static str {
        match self {
            ReportCadence::Weekly => "Generate a comprehensive weekly marketing performance report",
            ReportCadence::Monthly => {
                "Generate a comprehensive monthly marketing performance report with trends and recommendations"
            }
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportCadence::Weekly => "Weekly Marketing Report",
            ReportCadence::Monthly => "Monthly Marketing Report",
        }
    }

    /// The canned query for the window ending on `today`.
    pub fn request(&self, today: NaiveDate) -> QueryRequest {
        let range = DateRange::trailing_days(today, self.window_days());
        QueryRequest::new(
            self.query(),
            range.start.to_string(),
            range.end.to_string(),
            ModelPreference::Auto,
        )
    }
}

/// Result of one dispatcher run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub generated: bool,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

pub struct ReportService {
    orchestrator: Arc<QueryOrchestrator>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    weekly_enabled: bool,
    monthly_enabled: bool,
}

impl ReportService {
    pub fn new(
        orchestrator: Arc<QueryOrchestrator>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        weekly_enabled: bool,
        monthly_enabled: bool,
    ) -> Self {
        Self {
            orchestrator,
            channels,
            weekly_enabled,
            monthly_enabled,
        }
    }

    pub async fn send_weekly_report(&self) -> Result<ReportOutcome> {
        self.run(ReportCadence::Weekly, Utc::now().date_naive()).await
    }

    pub async fn send_monthly_report(&self) -> Result<ReportOutcome> {
        self.run(ReportCadence::Monthly, Utc::now().date_naive()).await
    }

    fn enabled(&self, cadence: ReportCadence) -> bool {
        match cadence {
            ReportCadence::Weekly => self.weekly_enabled,
            ReportCadence::Monthly => self.monthly_enabled,
        }
    }

    /// Generate the report for `cadence` and hand it to every channel.
    ///
    /// A channel failure is logged and recorded; the remaining channels still run.
    pub async fn run(&self, cadence: ReportCadence, today: NaiveDate) -> Result<ReportOutcome> {
        if !self.enabled(cadence) {
            info!(?cadence, "Report cadence disabled, skipping");
            return Ok(ReportOutcome::default());
        }

        let outcome = self.orchestrator.process_query(&cadence.request(today)).await?;
        let payload = ReportPayload {
            title: cadence.title().to_string(),
            insights: outcome.data.insights,
            timestamp: outcome.data.timestamp,
        };

        let mut result = ReportOutcome {
            generated: true,
            ..Default::default()
        };

        for channel in &self.channels {
            match channel.deliver(&payload).await {
                Ok(()) => result.delivered.push(channel.name().to_string()),
                Err(e) => {
                    error!(channel = channel.name(), error = %e, "Report delivery failed");
                    result.failed.push(channel.name().to_string());
                }
            }
        }

        info!(
            ?cadence,
            delivered = result.delivered.len(),
            failed = result.failed.len(),
            "Report dispatched"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::llm::{GenerationOptions, ModelError, ModelId, ModelInfo, ModelProvider, UsageSnapshot};
    use crate::models::{AdsReport, AnalyticsReport, ProviderResult, SiteReport};
    use crate::orchestrator::{DataSources, ModelProviders, OrchestratorOptions};
    use crate::sources::DataSource;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Unavailable;

    #[async_trait]
    impl DataSource for Unavailable {
        type Report = AdsReport;

        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn fetch(&self, _range: &DateRange) -> ProviderResult<AdsReport> {
            ProviderResult::failed("not configured")
        }
    }

    struct NoAnalytics;

    #[async_trait]
    impl DataSource for NoAnalytics {
        type Report = AnalyticsReport;

        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn fetch(&self, _range: &DateRange) -> ProviderResult<AnalyticsReport> {
            ProviderResult::failed("not configured")
        }
    }

    struct NoSite;

    #[async_trait]
    impl DataSource for NoSite {
        type Report = SiteReport;

        fn name(&self) -> &'static str {
            "unavailable"
        }

        async fn fetch(&self, _range: &DateRange) -> ProviderResult<SiteReport> {
            ProviderResult::failed("not configured")
        }
    }

    /// Answers with the prompt's query line.
    struct EchoModel(ModelId);

    #[async_trait]
    impl ModelProvider for EchoModel {
        fn id(&self) -> ModelId {
            self.0
        }

        async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> std::result::Result<String, ModelError> {
            let query_line = prompt.lines().find(|l| l.starts_with("User Query:")).unwrap_or_default();
            Ok(query_line.to_string())
        }

        fn usage(&self) -> UsageSnapshot {
            UsageSnapshot::default()
        }

        fn reset_usage(&self) {}

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "echo",
                provider: "test",
                max_tokens: 0,
                input_cost_per_1k: 0.0,
                output_cost_per_1k: 0.0,
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        fail: bool,
        received: Mutex<Vec<ReportPayload>>,
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            if self.fail {
                "broken"
            } else {
                "recording"
            }
        }

        async fn deliver(&self, report: &ReportPayload) -> Result<()> {
            if self.fail {
                return Err(Error::Delivery("webhook returned 500".into()));
            }
            self.received.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn orchestrator() -> Arc<QueryOrchestrator> {
        Arc::new(QueryOrchestrator::new(
            DataSources {
                ads: Arc::new(Unavailable),
                analytics: Arc::new(NoAnalytics),
                site: Arc::new(NoSite),
            },
            ModelProviders {
                gemini: Arc::new(EchoModel(ModelId::Gemini)),
                openai: Arc::new(EchoModel(ModelId::OpenAi)),
            },
            Arc::new(MemoryCacheStore::new()),
            OrchestratorOptions::default(),
        ))
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn test_cadence_windows() {
        let weekly = ReportCadence::Weekly.request(today());
        assert_eq!(weekly.start_date, "2024-03-24");
        assert_eq!(weekly.end_date, "2024-03-31");

        let monthly = ReportCadence::Monthly.request(today());
        assert_eq!(monthly.start_date, "2024-03-01");
        assert!(monthly.query.contains("trends and recommendations"));

        let cadence: ReportCadence = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(cadence, ReportCadence::Monthly);
    }

    #[tokio::test]
    async fn test_report_reaches_every_working_channel() {
        let good = Arc::new(RecordingChannel::default());
        let broken = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![broken, good.clone()];
        let service = ReportService::new(orchestrator(), channels, true, true);

        let outcome = service.run(ReportCadence::Weekly, today()).await.unwrap();
        assert!(outcome.generated);
        assert_eq!(outcome.delivered, vec!["recording"]);
        assert_eq!(outcome.failed, vec!["broken"]);

        let received = good.received.lock().unwrap();
        assert_eq!(received[0].title, "Weekly Marketing Report");
        assert_eq!(
            received[0].insights,
            "User Query: Generate a comprehensive weekly marketing performance report"
        );
    }

    #[tokio::test]
    async fn test_disabled_cadence_is_skipped() {
        let channel = Arc::new(RecordingChannel::default());
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![channel.clone()];
        let service = ReportService::new(orchestrator(), channels, true, false);

        let outcome = service.run(ReportCadence::Monthly, today()).await.unwrap();
        assert_eq!(outcome, ReportOutcome::default());
        assert!(channel.received.lock().unwrap().is_empty());
    }
}
