//! Notification fan-out.
//!
//! Owns the notification collection. Other components never write
//! notification documents themselves; they ask this module for batch
//! operations (so the cancellation cascade commits atomically) or call
//! [`Fanout::notify`] for standalone, best-effort writes.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::auth::Identity;
use crate::models::{Notification, Program};
use crate::store::{Collections, DocumentStore, WriteOp};
use crate::{Error, Result};

/// One page of a recipient's notifications, newest first.
#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub page: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Upper bounds on client-supplied pagination; keeps the offset
/// arithmetic in range for arbitrary query-string input.
pub const MAX_PAGE: usize = 10_000;
pub const MAX_PAGE_SIZE: usize = 100;

pub struct Fanout {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl Fanout {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    fn notification_doc(
        &self,
        id: &str,
        recipient: &str,
        title: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Value {
        serde_json::to_value(Notification {
            id: id.to_string(),
            email: recipient.to_string(),
            notification_title: title.to_string(),
            notification_text: text.to_string(),
            read: false,
            created_at: now,
            read_at: None,
        })
        .unwrap_or(Value::Null)
    }

    /// Build one notification write for inclusion in an atomic batch.
    /// Returns the pre-generated notification id alongside the operation.
    pub fn notification_op(
        &self,
        recipient: &str,
        title: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> (String, WriteOp) {
        let id = self.store.new_id();
        let op = WriteOp::Set {
            collection: self.collections.notifications.clone(),
            id: id.clone(),
            doc: self.notification_doc(&id, recipient, title, text, now),
        };
        (id, op)
    }

    /// Notifications for a program cancellation: exactly one per distinct
    /// affected member, regardless of how many appointments each held.
    pub fn program_cancelled_ops(
        &self,
        program: &Program,
        member_emails: &[String],
        now: DateTime<Utc>,
    ) -> Vec<WriteOp> {
        let recipients: BTreeSet<&String> = member_emails.iter().collect();
        let title = format!("Program has been cancelled: {}", program.title);
        let text = format!(
            "Your booked program has been cancelled: {}. All appointments for this program have been removed.",
            program.title
        );

        recipients
            .into_iter()
            .map(|email| self.notification_op(email, &title, &text, now).1)
            .collect()
    }

    /// Append one notification outside a batch. Never fails the caller:
    /// the triggering mutation is already durable, so a failed write here
    /// degrades to a logged warning.
    pub async fn notify(&self, recipient: &str, title: &str, text: &str) -> Option<String> {
        let id = self.store.new_id();
        let doc = self.notification_doc(&id, recipient, title, text, Utc::now());

        match self
            .store
            .set(&self.collections.notifications, &id, doc)
            .await
        {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "Failed to write notification");
                None
            }
        }
    }

    async fn owned_notification(&self, id: &str, owner: &Identity) -> Result<Notification> {
        let doc = self
            .store
            .get(&self.collections.notifications, id)
            .await?
            .ok_or_else(|| Error::NotFound("Notification not found".to_string()))?;
        let notification: Notification = serde_json::from_value(doc)?;

        if notification.email != owner.email {
            return Err(Error::Auth(
                "You can only manage your own notifications".to_string(),
            ));
        }
        Ok(notification)
    }

    /// Mark one notification read.
    pub async fn mark_read(&self, id: &str, owner: &Identity) -> Result<()> {
        self.owned_notification(id, owner).await?;

        self.store
            .update(
                &self.collections.notifications,
                id,
                serde_json::json!({
                    "read": true,
                    "readAt": Utc::now(),
                }),
            )
            .await
    }

    /// Mark every unread notification of `owner` read. Returns how many
    /// were updated.
    pub async fn mark_all_read(&self, owner: &Identity) -> Result<usize> {
        let docs = self
            .store
            .query_eq(
                &self.collections.notifications,
                "email",
                &Value::String(owner.email.clone()),
            )
            .await?;

        let now = Utc::now();
        let ops: Vec<WriteOp> = docs
            .iter()
            .filter(|doc| doc.get("read") == Some(&Value::Bool(false)))
            .filter_map(|doc| doc.get("id").and_then(Value::as_str))
            .map(|id| WriteOp::Update {
                collection: self.collections.notifications.clone(),
                id: id.to_string(),
                fields: serde_json::json!({ "read": true, "readAt": now }),
            })
            .collect();

        let updated = ops.len();
        if updated > 0 {
            self.store.commit(ops).await?;
        }
        Ok(updated)
    }

    /// Delete one notification.
    pub async fn delete(&self, id: &str, owner: &Identity) -> Result<()> {
        self.owned_notification(id, owner).await?;
        self.store.delete(&self.collections.notifications, id).await
    }

    /// Load one notification by id without an ownership check. Used by the
    /// email trigger, which acts on behalf of the recipient.
    pub async fn load(&self, id: &str) -> Result<Option<Notification>> {
        match self.store.get(&self.collections.notifications, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// A recipient's notifications, newest first, paginated client-side
    /// over the full result set. `page` starts at 1; both arguments are
    /// clamped to [`MAX_PAGE`] / [`MAX_PAGE_SIZE`].
    pub async fn list(&self, owner: &Identity, page: usize, page_size: usize) -> Result<NotificationPage> {
        let page = page.clamp(1, MAX_PAGE);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let docs = self
            .store
            .query_eq(
                &self.collections.notifications,
                "email",
                &Value::String(owner.email.clone()),
            )
            .await?;

        let mut notifications: Vec<Notification> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed notification document");
                    None
                }
            })
            .collect();

        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = notifications.len();
        let offset = (page - 1) * page_size;
        let has_more = total > page * page_size;
        let notifications = notifications
            .into_iter()
            .skip(offset)
            .take(page_size)
            .collect();

        Ok(NotificationPage {
            notifications,
            total,
            page,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fanout_with_store() -> (Arc<MemoryStore>, Fanout) {
        let store = Arc::new(MemoryStore::new());
        let fanout = Fanout::new(store.clone(), Collections::default());
        (store, fanout)
    }

    fn program(title: &str) -> Program {
        serde_json::from_value(serde_json::json!({
            "id": "p1",
            "title": title,
            "sport": "Tennis",
            "organizer_email": "org@example.com",
            "description": "d",
            "cost": 0,
            "status": "active",
            "createdAt": "2026-08-01T00:00:00Z",
            "updatedAt": "2026-08-01T00:00:00Z",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn cancellation_ops_deduplicate_recipients() {
        let (_, fanout) = fanout_with_store();
        let members = vec![
            "a@example.com".to_string(),
            "b@example.com".to_string(),
            "a@example.com".to_string(),
        ];

        let ops = fanout.program_cancelled_ops(&program("Social Tennis"), &members, Utc::now());
        assert_eq!(ops.len(), 2);
    }

    #[tokio::test]
    async fn notify_failure_degrades_to_none() {
        let (store, fanout) = fanout_with_store();
        store.set_fail_writes(true);

        let id = fanout.notify("a@example.com", "t", "b").await;
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let (_, fanout) = fanout_with_store();
        for i in 0..5 {
            fanout
                .notify("a@example.com", &format!("n{}", i), "body")
                .await
                .unwrap();
        }
        fanout.notify("other@example.com", "x", "body").await.unwrap();

        let owner = Identity::from_email("a@example.com");
        let first = fanout.list(&owner, 1, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.notifications.len(), 2);
        assert!(first.has_more);

        let last = fanout.list(&owner, 3, 2).await.unwrap();
        assert_eq!(last.notifications.len(), 1);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn absurd_page_values_are_clamped_not_overflowed() {
        let (_, fanout) = fanout_with_store();
        fanout.notify("a@example.com", "t", "b").await.unwrap();

        let owner = Identity::from_email("a@example.com");
        let page = fanout.list(&owner, usize::MAX, usize::MAX).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.notifications.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.page, MAX_PAGE);
    }

    #[tokio::test]
    async fn read_management_enforces_ownership() {
        let (_, fanout) = fanout_with_store();
        let id = fanout
            .notify("a@example.com", "title", "body")
            .await
            .unwrap();

        let intruder = Identity::from_email("mallory@example.com");
        assert!(matches!(
            fanout.mark_read(&id, &intruder).await,
            Err(Error::Auth(_))
        ));
        assert!(matches!(
            fanout.delete(&id, &intruder).await,
            Err(Error::Auth(_))
        ));

        let owner = Identity::from_email("a@example.com");
        fanout.mark_read(&id, &owner).await.unwrap();
        let page = fanout.list(&owner, 1, 10).await.unwrap();
        assert!(page.notifications[0].read);
        assert!(page.notifications[0].read_at.is_some());

        fanout.delete(&id, &owner).await.unwrap();
        assert!(fanout.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_unread() {
        let (_, fanout) = fanout_with_store();
        let owner = Identity::from_email("a@example.com");

        let first = fanout.notify("a@example.com", "one", "b").await.unwrap();
        fanout.notify("a@example.com", "two", "b").await.unwrap();
        fanout.mark_read(&first, &owner).await.unwrap();

        assert_eq!(fanout.mark_all_read(&owner).await.unwrap(), 1);
        assert_eq!(fanout.mark_all_read(&owner).await.unwrap(), 0);
    }
}
