//! Notification Emailer Lambda - delivers notification emails.
//!
//! This Lambda is triggered by SNS and:
//! 1. Receives notification IDs from SNS messages
//! 2. Fetches notification details from the document store
//! 3. Sends the email to the notification's recipient
//!
//! The notification document is already durable by the time the event
//! fires, so failures here cost an email, never data.

use std::sync::Arc;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shared::events::NotificationCreated;
use shared::fanout::Fanout;
use shared::mailer::{EmailMessage, Mailer, SesMailer};
use shared::{Config, DocumentStore, DynamoStore};

/// SNS Event wrapper
#[derive(Debug, Deserialize)]
struct SnsEvent {
    #[serde(rename = "Records")]
    records: Vec<SnsRecord>,
}

#[derive(Debug, Deserialize)]
struct SnsRecord {
    #[serde(rename = "Sns")]
    sns: SnsMessage,
}

#[derive(Debug, Deserialize)]
struct SnsMessage {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Serialize)]
struct EmailerResponse {
    emails_sent: u32,
    errors: u32,
}

struct AppState {
    fanout: Fanout,
    mailer: SesMailer,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|e| format!("Invalid configuration: {}", e))?;
        let store: Arc<dyn DocumentStore> = Arc::new(DynamoStore::from_env().await);

        Ok(Self {
            fanout: Fanout::new(store, config.collections()),
            mailer: SesMailer::from_env(config.from_email).await,
        })
    }
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<serde_json::Value>,
) -> Result<EmailerResponse, Error> {
    let sns_event: SnsEvent = serde_json::from_value(event.payload)
        .map_err(|e| format!("Invalid SNS event: {}", e))?;

    let mut emails_sent = 0;
    let mut errors = 0;

    for record in sns_event.records {
        let created: NotificationCreated = match serde_json::from_str(&record.sns.message) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Invalid notification event payload");
                errors += 1;
                continue;
            }
        };

        let notification = match state.fanout.load(&created.notification_id).await {
            Ok(Some(n)) => n,
            Ok(None) => {
                warn!(
                    notification_id = %created.notification_id,
                    "Notification not found, skipping email"
                );
                errors += 1;
                continue;
            }
            Err(e) => {
                error!(
                    notification_id = %created.notification_id,
                    error = %e,
                    "Failed to fetch notification"
                );
                errors += 1;
                continue;
            }
        };

        let message = EmailMessage::from_notification(
            &notification.email,
            &notification.notification_title,
            &notification.notification_text,
        );

        match state.mailer.send(&message).await {
            Ok(delivery_id) => {
                info!(
                    notification_id = %notification.id,
                    delivery_id = %delivery_id,
                    "Notification email sent"
                );
                emails_sent += 1;
            }
            Err(e) => {
                error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to send notification email"
                );
                errors += 1;
            }
        }
    }

    let response = EmailerResponse {
        emails_sent,
        errors,
    };

    info!(
        sent = response.emails_sent,
        errors = response.errors,
        "Notification emailer complete"
    );

    Ok(response)
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
