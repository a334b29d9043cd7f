//! Cache Admin Lambda - Maintenance operations on the insight cache and
//! model usage counters.
//!
//! Endpoints:
//! - DELETE /cache - Remove every cached response
//! - POST /cache/purge - Remove expired responses only
//! - GET /usage - Request, token and cost totals per model
//! - POST /usage/reset - Zero the usage counters

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Serialize;
use shared::http::{engine_error_response, error_response, json_response, ApiResponse};
use shared::App;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct RemovedResponse {
    removed: u64,
}

async fn handler(app: Arc<App>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!(method, path, "Cache admin request");

    match (method, path) {
        ("DELETE", "/cache") => match app.orchestrator.clear_cache().await {
            Ok(removed) => json_response(200, &ApiResponse::success(RemovedResponse { removed })),
            Err(e) => engine_error_response(&e),
        },
        ("POST", "/cache/purge") => match app.orchestrator.purge_expired().await {
            Ok(removed) => json_response(200, &ApiResponse::success(RemovedResponse { removed })),
            Err(e) => engine_error_response(&e),
        },
        ("GET", "/usage") => json_response(200, &ApiResponse::success(app.orchestrator.model_usage())),
        ("POST", "/usage/reset") => {
            app.orchestrator.reset_usage();
            json_response(200, &ApiResponse::success(app.orchestrator.model_usage()))
        }
        _ => error_response(404, "Not found"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let app = Arc::new(App::load().await?);

    run(service_fn(move |event| {
        let app = app.clone();
        async move { handler(app, event).await }
    }))
    .await
}
