//! Appointments API Lambda - booking operations for members.
//!
//! Endpoints:
//! - POST /appointments - Book onto a program
//! - GET /appointments - List the caller's appointments
//! - PUT /appointments/{id} - Change an appointment's time slots
//! - POST /appointments/{id}/cancel - Cancel an appointment

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::events::{announce_notification, EventPublisher, SnsPublisher};
use shared::fanout::Fanout;
use shared::http::{error_response, json_response};
use shared::ledger::AppointmentLedger;
use shared::models::ScheduleSlot;
use shared::{parse_body, try_domain};
use shared::{ApiResponse, Config, DocumentStore, DynamoStore};

/// Book appointment request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAppointmentRequest {
    program_id: String,
    time_slots: Vec<ScheduleSlot>,
}

/// Update appointment request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAppointmentRequest {
    time_slots: Vec<ScheduleSlot>,
}

/// Application state
struct AppState {
    ledger: AppointmentLedger,
    fanout: Fanout,
    publisher: Option<SnsPublisher>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);
        let collections = config.collections();

        let publisher = match config.events_topic_arn {
            Some(arn) => Some(SnsPublisher::from_env(arn).await),
            None => None,
        };

        Ok(Self {
            ledger: AppointmentLedger::new(store.clone(), collections.clone()),
            fanout: Fanout::new(store, collections),
            publisher,
        })
    }

    fn publisher(&self) -> Option<&dyn EventPublisher> {
        self.publisher.as_ref().map(|p| p as &dyn EventPublisher)
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let method = event.method().as_str();
    let raw_path = event.uri().path();
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);

    info!("Appointments request: {} {}", method, path);

    match (method, path) {
        ("POST", "/appointments") => {
            let identity = try_domain!(shared::extract_identity(&event));
            let request: CreateAppointmentRequest = parse_body!(event.body());

            let appointment = try_domain!(
                state
                    .ledger
                    .create_appointment(&request.program_id, &identity, request.time_slots)
                    .await
            );
            json_response(201, &ApiResponse::success(appointment))
        }

        ("GET", "/appointments") => {
            let identity = try_domain!(shared::extract_identity(&event));
            let appointments = try_domain!(state.ledger.list_for_member(&identity).await);
            json_response(200, &ApiResponse::success(appointments))
        }

        ("POST", p) if p.starts_with("/appointments/") && p.ends_with("/cancel") => {
            let id = p
                .trim_start_matches("/appointments/")
                .trim_end_matches("/cancel");
            let identity = try_domain!(shared::extract_identity(&event));

            let cancellation = try_domain!(
                state
                    .ledger
                    .cancel_appointment(id, &identity, &state.fanout)
                    .await
            );

            // The organizer alert is already durable; email delivery rides
            // on the topic and never blocks the response.
            if let Some(notification_id) = &cancellation.organizer_notification_id {
                announce_notification(
                    state.publisher(),
                    notification_id,
                    "Appointment cancelled",
                )
                .await;
            }

            json_response(200, &ApiResponse::success(cancellation))
        }

        ("PUT", p) if p.starts_with("/appointments/") => {
            let id = p.trim_start_matches("/appointments/").to_string();
            let identity = try_domain!(shared::extract_identity(&event));
            let request: UpdateAppointmentRequest = parse_body!(event.body());

            try_domain!(
                state
                    .ledger
                    .update_appointment(&id, request.time_slots, &identity)
                    .await
            );
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
