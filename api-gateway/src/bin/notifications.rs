//! Notifications API Lambda - per-recipient notification management.
//!
//! Endpoints:
//! - GET /notifications?page=&limit= - List the caller's notifications
//! - POST /notifications/{id}/read - Mark one notification read
//! - POST /notifications/read-all - Mark all unread notifications read
//! - DELETE /notifications/{id} - Delete a notification

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::fanout::Fanout;
use shared::http::{error_response, json_response};
use shared::try_domain;
use shared::{ApiResponse, Config, DocumentStore, DynamoStore};

const DEFAULT_PAGE_SIZE: usize = 20;

/// Application state
struct AppState {
    fanout: Fanout,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);

        Ok(Self {
            fanout: Fanout::new(store, config.collections()),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Notifications request: {} {}", method, path);

    let identity = try_domain!(shared::extract_identity(&event));

    match (method, path) {
        ("GET", "/notifications") => {
            let params = event.query_string_parameters();
            let page: usize = params
                .first("page")
                .and_then(|p| p.parse().ok())
                .unwrap_or(1)
                .min(shared::fanout::MAX_PAGE);
            let page_size: usize = params
                .first("limit")
                .and_then(|l| l.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(shared::fanout::MAX_PAGE_SIZE);

            let listing = try_domain!(state.fanout.list(&identity, page, page_size).await);
            json_response(200, &ApiResponse::success(listing))
        }

        ("POST", "/notifications/read-all") => {
            let updated = try_domain!(state.fanout.mark_all_read(&identity).await);
            json_response(
                200,
                &ApiResponse::success(serde_json::json!({ "updated": updated })),
            )
        }

        ("POST", p) if p.starts_with("/notifications/") && p.ends_with("/read") => {
            let id = p
                .trim_start_matches("/notifications/")
                .trim_end_matches("/read");
            try_domain!(state.fanout.mark_read(id, &identity).await);
            json_response(200, &ApiResponse::success(serde_json::json!({ "id": id })))
        }

        ("DELETE", p) if p.starts_with("/notifications/") => {
            let id = p.trim_start_matches("/notifications/");
            try_domain!(state.fanout.delete(id, &identity).await);
            json_response(200, &ApiResponse::success(serde_json::json!({ "id": id })))
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
