//! Reports API Lambda - organizer summaries.
//!
//! Endpoints:
//! - GET /reports/organizer?includeCancelled=&format= - Build the caller's
//!   program and appointment summary. `format=text` downloads the rendered
//!   document instead of the JSON line items.

use std::sync::Arc;

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::http::{error_response, json_response};
use shared::report::{ReportAggregator, ReportRenderer, TextRenderer};
use shared::try_domain;
use shared::{ApiResponse, Config, DocumentStore, DynamoStore};

/// Application state
struct AppState {
    aggregator: ReportAggregator,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);

        Ok(Self {
            aggregator: ReportAggregator::new(store, config.collections()),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Reports request: {} {}", method, path);

    match (method, path) {
        ("GET", "/reports/organizer") => {
            let identity = try_domain!(shared::extract_identity(&event));
            let params = event.query_string_parameters();
            let include_cancelled = params.first("includeCancelled") == Some("true");
            let as_text = params.first("format") == Some("text");

            let report = try_domain!(
                state
                    .aggregator
                    .build_organizer_report(&identity, include_cancelled, Utc::now())
                    .await
            );

            if as_text {
                let renderer = TextRenderer;
                let bytes = try_domain!(renderer.render(&report));
                return Ok(Response::builder()
                    .status(200)
                    .header("content-type", renderer.content_type())
                    .header(
                        "Content-Disposition",
                        "attachment; filename=\"organizer-report.txt\"",
                    )
                    .header("Access-Control-Allow-Origin", "*")
                    .body(Body::from(bytes))?);
            }

            json_response(200, &ApiResponse::success(report))
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

    let state = Arc::new(AppState::new().await?);
    let state_clone = state.clone();

    run(service_fn(move |event| {
        let state = state_clone.clone();
        async move { handler(state, event).await }
    }))
    .await
}
