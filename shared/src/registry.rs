//! Program registry: create, update and cancel programs.
//!
//! All mutations are organizer-gated through `assert_owner`. Updates are
//! wholesale replacements of the stored document (no partial merge), with
//! only `id`, `createdAt` and `status` carried over from the stored copy.
//! Cancellation is terminal and cascades to appointments and
//! notifications in one atomic batch.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{assert_owner, Identity};
use crate::ledger::AppointmentLedger;
use crate::fanout::Fanout;
use crate::models::{
    coerce_number, Contact, Equipment, Program, ProgramStatus, ScheduleSlot, Venue,
};
use crate::store::{Collections, DocumentStore, WriteOp};
use crate::{Error, Result};

/// Incoming program payload. Numeric fields arrive as JSON numbers or
/// numeric strings and are coerced during validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramDraft {
    pub title: Option<String>,
    pub sport: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "ageGroups")]
    pub age_groups: Option<Vec<String>>,
    pub cost: Option<Value>,
    #[serde(rename = "costUnit")]
    pub cost_unit: Option<String>,
    pub accessibility: Option<Vec<String>>,
    #[serde(rename = "inclusivityTags")]
    pub inclusivity_tags: Option<Vec<String>>,
    pub schedule: Option<Vec<ScheduleSlot>>,
    pub venue: Option<Venue>,
    pub equipment: Option<Equipment>,
    pub contact: Option<Contact>,
    pub images: Option<Vec<String>>,
    #[serde(rename = "maxParticipants")]
    pub max_participants: Option<Value>,
}

/// Outcome of a program cancellation cascade.
#[derive(Debug, Serialize)]
pub struct CancellationSummary {
    #[serde(rename = "programId")]
    pub program_id: String,
    #[serde(rename = "appointmentsCancelled")]
    pub appointments_cancelled: usize,
    #[serde(rename = "participantsNotified")]
    pub participants_notified: usize,
}

struct ValidatedDraft {
    title: String,
    sport: String,
    description: String,
    age_groups: Vec<String>,
    cost: f64,
    cost_unit: String,
    accessibility: Vec<String>,
    inclusivity_tags: Vec<String>,
    schedule: Vec<ScheduleSlot>,
    venue: Venue,
    equipment: Equipment,
    contact: Contact,
    images: Vec<String>,
    max_participants: u32,
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(Error::Validation(format!(
            "Missing required field: {}",
            field
        ))),
    }
}

fn validate_draft(draft: ProgramDraft) -> Result<ValidatedDraft> {
    let title = required_text(draft.title, "title")?;
    let sport = required_text(draft.sport, "sport")?;
    let description = required_text(draft.description, "description")?;
    let age_groups = draft
        .age_groups
        .ok_or_else(|| Error::Validation("Missing required field: ageGroups".to_string()))?;
    let cost_value = draft
        .cost
        .ok_or_else(|| Error::Validation("Missing required field: cost".to_string()))?;
    let cost_unit = required_text(draft.cost_unit, "costUnit")?;

    let cost = coerce_number(&cost_value, "cost")?;
    if cost < 0.0 {
        return Err(Error::Validation("Cost cannot be negative".to_string()));
    }

    let max_participants = match draft.max_participants {
        Some(value) => {
            let n = coerce_number(&value, "maxParticipants")?;
            if n < 0.0 {
                return Err(Error::Validation(
                    "Field 'maxParticipants' cannot be negative".to_string(),
                ));
            }
            n as u32
        }
        None => 0,
    };

    Ok(ValidatedDraft {
        title,
        sport,
        description,
        age_groups,
        cost,
        cost_unit,
        accessibility: draft.accessibility.unwrap_or_default(),
        inclusivity_tags: draft.inclusivity_tags.unwrap_or_default(),
        schedule: draft.schedule.unwrap_or_default(),
        venue: draft.venue.unwrap_or_default(),
        equipment: draft.equipment.unwrap_or_default(),
        contact: draft.contact.unwrap_or_default(),
        images: draft.images.unwrap_or_default(),
        max_participants,
    })
}

pub struct ProgramRegistry {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl ProgramRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    async fn stored_program(&self, id: &str) -> Result<Program> {
        let doc = self
            .store
            .get(&self.collections.programs, id)
            .await?
            .ok_or_else(|| Error::NotFound("Program not found".to_string()))?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Create a new active program owned by `organizer`.
    pub async fn create_program(
        &self,
        draft: ProgramDraft,
        organizer: &Identity,
    ) -> Result<Program> {
        if organizer.email.trim().is_empty() {
            return Err(Error::Auth("Organizer identity is required".to_string()));
        }

        let fields = validate_draft(draft)?;
        let now = Utc::now();

        let program = Program {
            id: self.store.new_id(),
            title: fields.title,
            sport: fields.sport,
            organizer_email: organizer.email.clone(),
            description: fields.description,
            age_groups: fields.age_groups,
            cost: fields.cost,
            cost_unit: fields.cost_unit,
            accessibility: fields.accessibility,
            inclusivity_tags: fields.inclusivity_tags,
            schedule: fields.schedule,
            venue: fields.venue,
            equipment: fields.equipment,
            contact: fields.contact,
            images: fields.images,
            max_participants: fields.max_participants,
            status: ProgramStatus::Active,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };

        self.store
            .set(
                &self.collections.programs,
                &program.id,
                serde_json::to_value(&program)?,
            )
            .await?;

        info!(program_id = %program.id, sport = %program.sport, "Program created");
        Ok(program)
    }

    /// Replace a program wholesale. Only `id`, `createdAt` and `status`
    /// survive from the stored document.
    pub async fn update_program(
        &self,
        id: &str,
        draft: ProgramDraft,
        requester: &Identity,
    ) -> Result<Program> {
        let existing = self.stored_program(id).await?;
        assert_owner(&existing.organizer_email, requester)?;

        let fields = validate_draft(draft)?;

        let program = Program {
            id: existing.id,
            title: fields.title,
            sport: fields.sport,
            organizer_email: existing.organizer_email,
            description: fields.description,
            age_groups: fields.age_groups,
            cost: fields.cost,
            cost_unit: fields.cost_unit,
            accessibility: fields.accessibility,
            inclusivity_tags: fields.inclusivity_tags,
            schedule: fields.schedule,
            venue: fields.venue,
            equipment: fields.equipment,
            contact: fields.contact,
            images: fields.images,
            max_participants: fields.max_participants,
            status: existing.status,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            cancelled_at: existing.cancelled_at,
        };

        self.store
            .set(
                &self.collections.programs,
                &program.id,
                serde_json::to_value(&program)?,
            )
            .await?;

        info!(program_id = %program.id, "Program updated");
        Ok(program)
    }

    /// Cancel a program and cascade: every confirmed appointment is
    /// cancelled and each distinct affected member gets one notification,
    /// all in a single atomic batch. The organizer initiated the
    /// cancellation and is not notified.
    ///
    /// The batch commits as one store transaction, and DynamoDB caps
    /// those at 100 writes. A program with more than roughly 50
    /// confirmed appointments exceeds the cap and the cancellation is
    /// rejected whole, leaving every record untouched.
    pub async fn cancel_program(
        &self,
        id: &str,
        requester: &Identity,
        ledger: &AppointmentLedger,
        fanout: &Fanout,
    ) -> Result<CancellationSummary> {
        let program = self.stored_program(id).await?;
        assert_owner(&program.organizer_email, requester)?;

        if program.status == ProgramStatus::Cancelled {
            return Err(Error::Conflict("Program is already cancelled".to_string()));
        }

        let now = Utc::now();
        let (appointment_ops, members) = ledger.bulk_cancel_ops(id, now).await?;
        let notification_ops = fanout.program_cancelled_ops(&program, &members, now);

        let appointments_cancelled = appointment_ops.len();
        let participants_notified = notification_ops.len();

        let mut ops = appointment_ops;
        ops.extend(notification_ops);
        ops.push(WriteOp::Update {
            collection: self.collections.programs.clone(),
            id: id.to_string(),
            fields: serde_json::json!({
                "status": ProgramStatus::Cancelled,
                "cancelledAt": now,
                "updatedAt": now,
            }),
        });

        self.store.commit(ops).await?;

        info!(
            program_id = %id,
            appointments_cancelled,
            participants_notified,
            "Program cancelled"
        );

        Ok(CancellationSummary {
            program_id: id.to_string(),
            appointments_cancelled,
            participants_notified,
        })
    }

    /// Fetch one program.
    pub async fn get_program(&self, id: &str) -> Result<Program> {
        self.stored_program(id).await
    }

    /// Every program document, skipping any that fail to parse.
    pub async fn list_programs(&self) -> Result<Vec<Program>> {
        let docs = self.store.list(&self.collections.programs).await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(program) => Some(program),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed program document");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn services() -> (Arc<MemoryStore>, ProgramRegistry, AppointmentLedger, Fanout) {
        let store = Arc::new(MemoryStore::new());
        let collections = Collections::default();
        (
            store.clone(),
            ProgramRegistry::new(store.clone(), collections.clone()),
            AppointmentLedger::new(store.clone(), collections.clone()),
            Fanout::new(store, collections),
        )
    }

    fn tennis_draft() -> ProgramDraft {
        serde_json::from_value(json!({
            "title": "Social Tennis",
            "sport": "Tennis",
            "description": "Friendly weekly hits",
            "ageGroups": ["adults"],
            "cost": "0",
            "costUnit": "per session",
            "maxParticipants": "12",
        }))
        .unwrap()
    }

    fn organizer() -> Identity {
        Identity::from_email("org@example.com")
    }

    #[tokio::test]
    async fn create_coerces_numeric_strings() {
        let (_, registry, _, _) = services();
        let program = registry
            .create_program(tennis_draft(), &organizer())
            .await
            .unwrap();
        assert_eq!(program.cost, 0.0);
        assert_eq!(program.max_participants, 12);
        assert!(program.is_active());
    }

    #[tokio::test]
    async fn create_rejects_missing_fields_and_bad_numbers() {
        let (_, registry, _, _) = services();

        let mut draft = tennis_draft();
        draft.cost_unit = None;
        assert!(matches!(
            registry.create_program(draft, &organizer()).await,
            Err(Error::Validation(_))
        ));

        let mut draft = tennis_draft();
        draft.cost = Some(json!("priceless"));
        assert!(matches!(
            registry.create_program(draft, &organizer()).await,
            Err(Error::Validation(_))
        ));

        let mut draft = tennis_draft();
        draft.cost = Some(json!(-5));
        assert!(matches!(
            registry.create_program(draft, &organizer()).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_requires_organizer_identity() {
        let (_, registry, _, _) = services();
        let nobody = Identity::from_email("");
        assert!(matches!(
            registry.create_program(tennis_draft(), &nobody).await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn update_rejects_non_owner() {
        let (_, registry, _, _) = services();
        let program = registry
            .create_program(tennis_draft(), &organizer())
            .await
            .unwrap();

        let intruder = Identity::from_email("mallory@example.com");
        assert!(matches!(
            registry
                .update_program(&program.id, tennis_draft(), &intruder)
                .await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn update_replaces_wholesale_but_preserves_creation_and_status() {
        let (_, registry, _, _) = services();
        let created = registry
            .create_program(tennis_draft(), &organizer())
            .await
            .unwrap();

        let mut draft = tennis_draft();
        draft.title = Some("Evening Tennis".to_string());
        draft.accessibility = Some(vec!["wheelchair-access".to_string()]);
        let updated = registry
            .update_program(&created.id, draft, &organizer())
            .await
            .unwrap();

        assert_eq!(updated.title, "Evening Tennis");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.status, ProgramStatus::Active);
        assert_eq!(updated.accessibility, vec!["wheelchair-access"]);
    }

    #[tokio::test]
    async fn cancel_cascades_and_deduplicates_notifications() {
        let (store, registry, ledger, fanout) = services();
        let program = registry
            .create_program(tennis_draft(), &organizer())
            .await
            .unwrap();

        let slot = vec![ScheduleSlot {
            day: "Monday".to_string(),
            start_time: "18:00".to_string(),
            end_time: "19:00".to_string(),
            date: None,
        }];

        // Two members; one books once, the cascade should still notify
        // each member exactly once even with multiple appointments.
        let alice = Identity::from_email("alice@example.com");
        let bob = Identity::from_email("bob@example.com");
        ledger
            .create_appointment(&program.id, &alice, slot.clone())
            .await
            .unwrap();
        let bob_appt = ledger
            .create_appointment(&program.id, &bob, slot.clone())
            .await
            .unwrap();
        // A cancelled appointment must not produce a notification.
        ledger
            .cancel_appointment(&bob_appt.id, &bob, &fanout)
            .await
            .unwrap();
        ledger
            .create_appointment(&program.id, &bob, slot)
            .await
            .unwrap();

        let summary = registry
            .cancel_program(&program.id, &organizer(), &ledger, &fanout)
            .await
            .unwrap();

        assert_eq!(summary.appointments_cancelled, 2);
        assert_eq!(summary.participants_notified, 2);

        let stored = registry.get_program(&program.id).await.unwrap();
        assert_eq!(stored.status, ProgramStatus::Cancelled);
        assert!(stored.cancelled_at.is_some());

        // No confirmed appointments remain.
        let remaining = store
            .query_eq("appointments", "status", &json!("confirmed"))
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn cancel_twice_conflicts_without_extra_notifications() {
        let (store, registry, ledger, fanout) = services();
        let program = registry
            .create_program(tennis_draft(), &organizer())
            .await
            .unwrap();

        let alice = Identity::from_email("alice@example.com");
        ledger
            .create_appointment(
                &program.id,
                &alice,
                vec![ScheduleSlot::default()],
            )
            .await
            .unwrap();

        registry
            .cancel_program(&program.id, &organizer(), &ledger, &fanout)
            .await
            .unwrap();
        let notifications_after_first = store.list("notifications").await.unwrap().len();

        let err = registry
            .cancel_program(&program.id, &organizer(), &ledger, &fanout)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(
            store.list("notifications").await.unwrap().len(),
            notifications_after_first
        );
    }

    #[tokio::test]
    async fn cancel_unknown_program_is_not_found() {
        let (_, registry, ledger, fanout) = services();
        assert!(matches!(
            registry
                .cancel_program("ghost", &organizer(), &ledger, &fanout)
                .await,
            Err(Error::NotFound(_))
        ));
    }
}
