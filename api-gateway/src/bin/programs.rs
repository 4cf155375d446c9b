//! Programs API Lambda - CRUD operations for programs.
//!
//! Endpoints:
//! - POST /programs - Create a program
//! - GET /programs - List programs (cached)
//! - GET /programs/{id} - Get a single program
//! - PUT /programs/{id} - Update a program
//! - POST /programs/{id}/cancel - Cancel a program and cascade to appointments
//! - GET /faqs - List FAQ entries

use std::sync::Arc;
use std::time::Duration;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::cache::Cache;
use shared::fanout::Fanout;
use shared::http::{error_response, json_response};
use shared::ledger::AppointmentLedger;
use shared::registry::{ProgramDraft, ProgramRegistry};
use shared::{parse_body, try_domain};
use shared::{ApiResponse, Config, DocumentStore, DynamoStore, Program};

const PROGRAMS_CACHE_KEY: &str = "programs";
const FAQS_CACHE_KEY: &str = "faqs";
const LIST_CACHE_TTL: Duration = Duration::from_secs(300);

/// Application state
struct AppState {
    registry: ProgramRegistry,
    ledger: AppointmentLedger,
    fanout: Fanout,
    store: Arc<dyn DocumentStore>,
    faqs_table: String,
    list_cache: Cache<Vec<Program>>,
    faq_cache: Cache<Vec<serde_json::Value>>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);
        let collections = config.collections();

        Ok(Self {
            registry: ProgramRegistry::new(store.clone(), collections.clone()),
            ledger: AppointmentLedger::new(store.clone(), collections.clone()),
            fanout: Fanout::new(store.clone(), collections),
            store,
            faqs_table: config.faqs_table,
            list_cache: Cache::new(),
            faq_cache: Cache::new(),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Programs request: {} {}", method, path);

    match (method, path) {
        ("POST", "/programs") => {
            let identity = try_domain!(shared::extract_identity(&event));
            let draft: ProgramDraft = parse_body!(event.body());

            let program = try_domain!(state.registry.create_program(draft, &identity).await);
            state.list_cache.invalidate(PROGRAMS_CACHE_KEY).await;
            json_response(201, &ApiResponse::success(program))
        }

        ("GET", "/programs") => {
            let programs = try_domain!(
                state
                    .list_cache
                    .get_or_populate(PROGRAMS_CACHE_KEY, LIST_CACHE_TTL, || async {
                        state.registry.list_programs().await
                    })
                    .await
            );
            json_response(200, &ApiResponse::success(programs))
        }

        ("GET", "/faqs") => {
            let faqs = try_domain!(
                state
                    .faq_cache
                    .get_or_populate(FAQS_CACHE_KEY, LIST_CACHE_TTL, || async {
                        state.store.list(&state.faqs_table).await
                    })
                    .await
            );
            json_response(200, &ApiResponse::success(faqs))
        }

        ("POST", p) if p.starts_with("/programs/") && p.ends_with("/cancel") => {
            let id = p
                .trim_start_matches("/programs/")
                .trim_end_matches("/cancel");
            let identity = try_domain!(shared::extract_identity(&event));

            let summary = try_domain!(
                state
                    .registry
                    .cancel_program(id, &identity, &state.ledger, &state.fanout)
                    .await
            );
            state.list_cache.invalidate(PROGRAMS_CACHE_KEY).await;
            json_response(200, &ApiResponse::success(summary))
        }

        ("GET", p) if p.starts_with("/programs/") => {
            let id = p.trim_start_matches("/programs/");
            let program = try_domain!(state.registry.get_program(id).await);
            json_response(200, &ApiResponse::success(program))
        }

        ("PUT", p) if p.starts_with("/programs/") => {
            let id = p.trim_start_matches("/programs/").to_string();
            let identity = try_domain!(shared::extract_identity(&event));
            let draft: ProgramDraft = parse_body!(event.body());

            let program = try_domain!(state.registry.update_program(&id, draft, &identity).await);
            state.list_cache.invalidate(PROGRAMS_CACHE_KEY).await;
            json_response(200, &ApiResponse::success(program))
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
