//! Search API Lambda - program discovery.
//!
//! Endpoints:
//! - GET /programs/search - Filter and rank active programs
//! - GET /programs/featured - Curated shelf of standout programs
//!
//! Both endpoints read the active program list through a short TTL cache;
//! filtering and ranking happen in-process on the cached list.

use std::sync::Arc;
use std::time::Duration;

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::cache::Cache;
use shared::http::{error_response, json_response};
use shared::registry::ProgramRegistry;
use shared::search::{featured, search, SearchFilters};
use shared::try_domain;
use shared::{ApiResponse, Config, DocumentStore, DynamoStore, Program};

const ACTIVE_CACHE_KEY: &str = "active-programs";
const ACTIVE_CACHE_TTL: Duration = Duration::from_secs(300);
const FEATURED_LIMIT: usize = 6;

/// Application state
struct AppState {
    registry: ProgramRegistry,
    active_cache: Cache<Vec<Program>>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);

        Ok(Self {
            registry: ProgramRegistry::new(store, config.collections()),
            active_cache: Cache::new(),
        })
    }

    async fn active_programs(&self) -> shared::Result<Vec<Program>> {
        self.active_cache
            .get_or_populate(ACTIVE_CACHE_KEY, ACTIVE_CACHE_TTL, || async {
                let mut programs = self.registry.list_programs().await?;
                programs.retain(Program::is_active);
                Ok(programs)
            })
            .await
    }
}

fn filters_from_query(event: &Request) -> SearchFilters {
    let params = event.query_string_parameters();
    SearchFilters {
        query: params.first("query").map(str::to_string),
        sport: params.first("sport").map(str::to_string),
        age_group: params.first("ageGroup").map(str::to_string),
        max_cost: params.first("maxCost").map(str::to_string),
        accessibility: params
            .first("accessibility")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Search request: {} {}", method, path);

    match (method, path) {
        ("GET", "/programs/search") => {
            let filters = filters_from_query(&event);
            let programs = try_domain!(state.active_programs().await);
            let results = search(programs, &filters);
            json_response(200, &ApiResponse::success(results))
        }

        ("GET", "/programs/featured") => {
            let limit: usize = event
                .query_string_parameters()
                .first("limit")
                .and_then(|l| l.parse().ok())
                .unwrap_or(FEATURED_LIMIT);

            let programs = try_domain!(state.active_programs().await);
            let shelf = featured(programs, limit);
            json_response(200, &ApiResponse::success(shelf))
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
