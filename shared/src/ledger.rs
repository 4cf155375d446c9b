//! Appointment ledger: bookings against programs.
//!
//! Uniqueness of one confirmed appointment per member per program is a
//! read-then-write check, not a store-level constraint. Two racing
//! bookings for the same member can both land; that window is accepted
//! and documented, and sequential double bookings are rejected.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{assert_owner, Identity};
use crate::fanout::Fanout;
use crate::models::{
    derived_slot_fields, Appointment, AppointmentStatus, CancelledBy, Program, ScheduleSlot,
};
use crate::store::{Collections, DocumentStore, WriteOp};
use crate::{Error, Result};

/// Minimal program block joined onto a member's appointment listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramSummary {
    pub id: String,
    pub title: String,
    pub sport: String,
}

/// One appointment with its program details, as returned to members.
#[derive(Debug, Serialize)]
pub struct MemberAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub program: ProgramSummary,
}

/// Outcome of a member-initiated cancellation.
#[derive(Debug, Serialize)]
pub struct AppointmentCancellation {
    #[serde(rename = "appointmentId")]
    pub appointment_id: String,
    /// Id of the organizer's alert notification, when one was created.
    /// Callers publish it for best-effort email delivery.
    #[serde(rename = "organizerNotificationId")]
    pub organizer_notification_id: Option<String>,
}

pub struct AppointmentLedger {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl AppointmentLedger {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    async fn stored_appointment(&self, id: &str) -> Result<Appointment> {
        let doc = self
            .store
            .get(&self.collections.appointments, id)
            .await?
            .ok_or_else(|| Error::NotFound("Appointment not found".to_string()))?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn program(&self, id: &str) -> Result<Option<Program>> {
        match self.store.get(&self.collections.programs, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Book a member onto an active program.
    pub async fn create_appointment(
        &self,
        program_id: &str,
        member: &Identity,
        time_slots: Vec<ScheduleSlot>,
    ) -> Result<Appointment> {
        if program_id.trim().is_empty() {
            return Err(Error::Validation(
                "Missing required field: program_id".to_string(),
            ));
        }
        if member.email.trim().is_empty() {
            return Err(Error::Auth("Member identity is required".to_string()));
        }
        if time_slots.is_empty() {
            return Err(Error::Validation(
                "At least one time slot must be selected".to_string(),
            ));
        }

        let program = self
            .program(program_id)
            .await?
            .ok_or_else(|| Error::NotFound("Program not found".to_string()))?;
        if !program.is_active() {
            return Err(Error::State(
                "Program is not open for booking".to_string(),
            ));
        }

        // Best-effort uniqueness: query before insert. Concurrent racing
        // bookings can both pass this check.
        let existing = self
            .store
            .query_eq(
                &self.collections.appointments,
                "program_id",
                &Value::String(program_id.to_string()),
            )
            .await?;
        let already_booked = existing.iter().any(|doc| {
            doc.get("user_email").and_then(Value::as_str) == Some(member.email.as_str())
                && doc.get("status").and_then(Value::as_str) == Some("confirmed")
        });
        if already_booked {
            return Err(Error::Conflict(
                "You already have a confirmed appointment for this program".to_string(),
            ));
        }

        let (date, start_time, end_time) = derived_slot_fields(&time_slots);
        let now = Utc::now();
        let appointment = Appointment {
            id: self.store.new_id(),
            program_id: program_id.to_string(),
            user_email: member.email.clone(),
            user_name: member.name.clone(),
            time_slot: time_slots,
            date,
            start_time,
            end_time,
            status: AppointmentStatus::Confirmed,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };

        self.store
            .set(
                &self.collections.appointments,
                &appointment.id,
                serde_json::to_value(&appointment)?,
            )
            .await?;

        info!(
            appointment_id = %appointment.id,
            program_id = %program_id,
            "Appointment created"
        );
        Ok(appointment)
    }

    /// Replace an appointment's chosen time slots.
    pub async fn update_appointment(
        &self,
        id: &str,
        time_slots: Vec<ScheduleSlot>,
        requester: &Identity,
    ) -> Result<()> {
        if time_slots.is_empty() {
            return Err(Error::Validation(
                "At least one time slot must be selected".to_string(),
            ));
        }

        let appointment = self.stored_appointment(id).await?;
        assert_owner(&appointment.user_email, requester)?;

        let (date, start_time, end_time) = derived_slot_fields(&time_slots);
        self.store
            .update(
                &self.collections.appointments,
                id,
                serde_json::json!({
                    "time_slot": time_slots,
                    "date": date,
                    "startTime": start_time,
                    "endTime": end_time,
                    "updatedAt": Utc::now(),
                }),
            )
            .await?;

        info!(appointment_id = %id, "Appointment updated");
        Ok(())
    }

    /// Cancel a member's own appointment. The appointment flip, the
    /// member's confirmation notification and the organizer's alert
    /// notification commit in one batch; email delivery happens after the
    /// fact via the returned notification id.
    pub async fn cancel_appointment(
        &self,
        id: &str,
        requester: &Identity,
        fanout: &Fanout,
    ) -> Result<AppointmentCancellation> {
        let appointment = self.stored_appointment(id).await?;
        assert_owner(&appointment.user_email, requester)?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Err(Error::Conflict(
                "Appointment is already cancelled".to_string(),
            ));
        }

        let program = self.program(&appointment.program_id).await?;
        let program_title = program
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_else(|| "Unknown Program".to_string());

        let now = Utc::now();
        let mut ops = vec![WriteOp::Update {
            collection: self.collections.appointments.clone(),
            id: id.to_string(),
            fields: serde_json::json!({
                "status": AppointmentStatus::Cancelled,
                "cancelledBy": CancelledBy::Member,
                "cancelledAt": now,
                "updatedAt": now,
            }),
        }];

        let (_, member_op) = fanout.notification_op(
            &appointment.user_email,
            &format!("Appointment cancelled: {}", program_title),
            &format!(
                "You have successfully cancelled your appointment for: {}. If you change your mind, you can book again from the program details page.",
                program_title
            ),
            now,
        );
        ops.push(member_op);

        let organizer_notification_id = match program.as_ref() {
            Some(p) => {
                let (notification_id, organizer_op) = fanout.notification_op(
                    &p.organizer_email,
                    &format!("Booking cancelled: {}", p.title),
                    &format!(
                        "{} has cancelled their appointment for: {}.",
                        appointment.user_email, p.title
                    ),
                    now,
                );
                ops.push(organizer_op);
                Some(notification_id)
            }
            None => {
                warn!(
                    appointment_id = %id,
                    program_id = %appointment.program_id,
                    "Program missing; organizer will not be notified"
                );
                None
            }
        };

        self.store.commit(ops).await?;

        info!(
            appointment_id = %id,
            program_id = %appointment.program_id,
            "Appointment cancelled"
        );

        Ok(AppointmentCancellation {
            appointment_id: id.to_string(),
            organizer_notification_id,
        })
    }

    /// Write operations cancelling every confirmed appointment of a
    /// program, plus the distinct affected member emails. Consumed by the
    /// program cancellation cascade so everything commits in one batch.
    pub async fn bulk_cancel_ops(
        &self,
        program_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Vec<WriteOp>, Vec<String>)> {
        let docs = self
            .store
            .query_eq(
                &self.collections.appointments,
                "program_id",
                &Value::String(program_id.to_string()),
            )
            .await?;

        let mut ops = Vec::new();
        let mut members = Vec::new();
        let mut seen = HashSet::new();

        for doc in &docs {
            if doc.get("status").and_then(Value::as_str) != Some("confirmed") {
                continue;
            }
            let Some(appointment_id) = doc.get("id").and_then(Value::as_str) else {
                warn!(program_id = %program_id, "Skipping appointment without id");
                continue;
            };

            ops.push(WriteOp::Update {
                collection: self.collections.appointments.clone(),
                id: appointment_id.to_string(),
                fields: serde_json::json!({
                    "status": AppointmentStatus::Cancelled,
                    "cancelledBy": CancelledBy::Organizer,
                    "cancelledAt": now,
                    "updatedAt": now,
                }),
            });

            if let Some(email) = doc.get("user_email").and_then(Value::as_str) {
                if seen.insert(email.to_string()) {
                    members.push(email.to_string());
                }
            }
        }

        Ok((ops, members))
    }

    /// A member's non-cancelled appointments joined with their program,
    /// newest first. Missing program documents degrade to a placeholder
    /// block rather than failing the listing.
    pub async fn list_for_member(&self, member: &Identity) -> Result<Vec<MemberAppointment>> {
        let docs = self
            .store
            .query_eq(
                &self.collections.appointments,
                "user_email",
                &Value::String(member.email.clone()),
            )
            .await?;

        let mut results = Vec::new();
        for doc in docs {
            let appointment: Appointment = match serde_json::from_value(doc) {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed appointment document");
                    continue;
                }
            };
            if appointment.status == AppointmentStatus::Cancelled {
                continue;
            }

            let program = match self.program(&appointment.program_id).await {
                Ok(Some(p)) => ProgramSummary {
                    id: p.id,
                    title: p.title,
                    sport: p.sport,
                },
                Ok(None) => {
                    warn!(program_id = %appointment.program_id, "Program document not found");
                    ProgramSummary {
                        id: appointment.program_id.clone(),
                        title: format!("Program {}", appointment.program_id),
                        sport: "Unknown Sport".to_string(),
                    }
                }
                Err(e) => {
                    warn!(program_id = %appointment.program_id, error = %e, "Error fetching program details");
                    ProgramSummary {
                        id: appointment.program_id.clone(),
                        title: "Error Loading Program".to_string(),
                        sport: "Unknown Sport".to_string(),
                    }
                }
            };

            results.push(MemberAppointment {
                appointment,
                program,
            });
        }

        results.sort_by(|a, b| b.appointment.created_at.cmp(&a.appointment.created_at));
        Ok(results)
    }
}
