//! Uploads API Lambda - pre-signed program image uploads.
//!
//! Endpoints:
//! - POST /uploads/images - Issue a short-lived signed PUT URL

use std::sync::Arc;

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::blob::{image_object_key, validate_image_type, BlobStore, S3BlobStore};
use shared::http::{error_response, json_response};
use shared::{parse_body, try_domain};
use shared::{ApiResponse, Config};

/// Upload URL request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    file_name: String,
    content_type: String,
    #[serde(default)]
    program_id: Option<String>,
}

/// Application state
struct AppState {
    blob: S3BlobStore,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let bucket = config.image_bucket.ok_or("IMAGE_BUCKET not set")?;

        Ok(Self {
            blob: S3BlobStore::from_env(bucket, config.aws_region).await,
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Uploads request: {} {}", method, path);

    match (method, path) {
        ("POST", "/uploads/images") => {
            // Uploads require a signed-in caller even though the key does
            // not embed their identity.
            try_domain!(shared::extract_identity(&event));
            let request: UploadRequest = parse_body!(event.body());

            try_domain!(validate_image_type(&request.content_type));
            let key = image_object_key(
                &request.file_name,
                request.program_id.as_deref(),
                Utc::now(),
            );

            let target = try_domain!(state.blob.upload_url(&key, &request.content_type).await);
            json_response(200, &ApiResponse::success(target))
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
