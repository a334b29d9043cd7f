//! Query Lambda - Handles the /query endpoint.
//!
//! Endpoints:
//! - POST /query - Generate (or fetch cached) marketing insights

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{engine_error_response, error_response, json_response, ApiResponse};
use shared::{parse_body, App, QueryRequest};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn handler(app: Arc<App>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!(method, path, "Query request");

    match (method, path) {
        ("POST", "/query") => {
            let request: QueryRequest = parse_body!(event.body());

            match app.orchestrator.process_query(&request).await {
                Ok(outcome) => json_response(200, &ApiResponse::success(outcome)),
                Err(e) => engine_error_response(&e),
            }
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
