//! Report Dispatcher Lambda - Sends scheduled marketing reports.
//!
//! Invoked by EventBridge with `{"cadence": "weekly"}` or `{"cadence": "monthly"}`.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Deserialize;
use shared::reports::ReportOutcome;
use shared::{App, ReportCadence, ReportService};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    cadence: ReportCadence,
}

async fn handler(service: Arc<ReportService>, event: LambdaEvent<ScheduledEvent>) -> Result<ReportOutcome, Error> {
    let cadence = event.payload.cadence;
    info!(?cadence, request_id = %event.context.request_id, "Dispatching scheduled report");

    let outcome = match cadence {
        ReportCadence::Weekly => service.send_weekly_report().await?,
        ReportCadence::Monthly => service.send_monthly_report().await?,
    };

    Ok(outcome)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let app = App::load().await?;
    let service = Arc::new(app.report_service());

    run(service_fn(move |event| {
        let service = service.clone();
        async move { handler(service, event).await }
    }))
    .await
}
