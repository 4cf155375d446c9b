//! Post-commit event publication.
//!
//! Notification writes commit first; the email trigger hears about them
//! through a topic. Publish failures are logged and dropped so a broken
//! topic never surfaces as an API error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Emitted once per persisted notification that should become an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationCreated {
    pub notification_id: String,
    pub title: String,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn notification_created(&self, event: &NotificationCreated) -> Result<()>;
}

pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPublisher {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }

    pub async fn from_env(topic_arn: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sns::Client::new(&config), topic_arn)
    }
}

#[async_trait]
impl EventPublisher for SnsPublisher {
    async fn notification_created(&self, event: &NotificationCreated) -> Result<()> {
        let payload = serde_json::to_string(event)?;

        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(payload)
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("Failed to publish event: {}", e)))?;

        Ok(())
    }
}

/// Fire-and-forget helper for handlers. `publisher` is `None` when no
/// topic is configured.
pub async fn announce_notification(
    publisher: Option<&dyn EventPublisher>,
    notification_id: &str,
    title: &str,
) {
    let Some(publisher) = publisher else {
        return;
    };

    let event = NotificationCreated {
        notification_id: notification_id.to_string(),
        title: title.to_string(),
    };

    if let Err(e) = publisher.notification_created(&event).await {
        warn!(notification_id, error = %e, "Failed to publish notification event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyPublisher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn notification_created(&self, _event: &NotificationCreated) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Dependency("topic unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn announce_swallows_publish_errors() {
        let publisher = FlakyPublisher {
            calls: AtomicUsize::new(0),
        };
        announce_notification(Some(&publisher), "n1", "Appointment cancelled").await;
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn announce_without_publisher_is_a_no_op() {
        announce_notification(None, "n1", "Appointment cancelled").await;
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = NotificationCreated {
            notification_id: "n1".to_string(),
            title: "Program has been cancelled: Tennis".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: NotificationCreated = serde_json::from_str(&json).unwrap();
        assert_eq!(back.notification_id, "n1");
    }
}
