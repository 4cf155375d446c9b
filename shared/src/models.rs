//! Domain documents: programs, appointments, notifications.
//!
//! Field names follow the stored document shape, so serde renames are
//! explicit wherever the wire name differs from Rust convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Program lifecycle status. Cancelled is terminal and cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    Active,
    Cancelled,
}

/// Appointment lifecycle status. Cancelled is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

/// Who initiated an appointment cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Member,
    Organizer,
}

/// One recurring session or booked slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSlot {
    #[serde(default)]
    pub day: String,
    #[serde(rename = "startTime", default)]
    pub start_time: String,
    #[serde(rename = "endTime", default)]
    pub end_time: String,
    /// Concrete date for booked slots; recurring schedule entries omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Venue {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub suburb: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Equipment {
    #[serde(default)]
    pub provided: bool,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// An organizer-listed recurring sports activity open for booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub title: String,
    pub sport: String,
    pub organizer_email: String,
    pub description: String,
    #[serde(rename = "ageGroups", default)]
    pub age_groups: Vec<String>,
    pub cost: f64,
    #[serde(rename = "costUnit", default)]
    pub cost_unit: String,
    #[serde(default)]
    pub accessibility: Vec<String>,
    #[serde(rename = "inclusivityTags", default)]
    pub inclusivity_tags: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default)]
    pub venue: Venue,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "maxParticipants", default)]
    pub max_participants: u32,
    pub status: ProgramStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "cancelledAt", default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Program {
    pub fn is_active(&self) -> bool {
        self.status == ProgramStatus::Active
    }
}

/// A member's booking against a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub program_id: String,
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub time_slot: Vec<ScheduleSlot>,
    /// Derived from the first slot at booking time; empty when absent.
    #[serde(default)]
    pub date: String,
    #[serde(rename = "startTime", default)]
    pub start_time: String,
    #[serde(rename = "endTime", default)]
    pub end_time: String,
    pub status: AppointmentStatus,
    #[serde(rename = "cancelledBy", default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<CancelledBy>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "cancelledAt", default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }
}

/// A message addressed to one recipient, created by the fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Recipient email; the ownership key for read-management operations
    pub email: String,
    pub notification_title: String,
    pub notification_text: String,
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "readAt", default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// Derive the flat `date`/`startTime`/`endTime` fields from the first
/// booked slot, defaulting to empty strings when absent.
pub fn derived_slot_fields(slots: &[ScheduleSlot]) -> (String, String, String) {
    match slots.first() {
        Some(slot) => (
            slot.date.clone().unwrap_or_default(),
            slot.start_time.clone(),
            slot.end_time.clone(),
        ),
        None => (String::new(), String::new(), String::new()),
    }
}

/// Coerce a JSON value to a number, accepting numbers and numeric strings.
pub fn coerce_number(value: &Value, field: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::Validation(format!("Field '{}' is not a valid number", field))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Validation(format!("Field '{}' is not a valid number", field))),
        _ => Err(Error::Validation(format!(
            "Field '{}' is not a valid number",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_number_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_number(&json!(12.5), "cost").unwrap(), 12.5);
        assert_eq!(coerce_number(&json!("30"), "cost").unwrap(), 30.0);
        assert!(coerce_number(&json!("free"), "cost").is_err());
        assert!(coerce_number(&json!([1]), "cost").is_err());
    }

    #[test]
    fn derived_fields_default_to_empty() {
        assert_eq!(
            derived_slot_fields(&[]),
            (String::new(), String::new(), String::new())
        );

        let slots = vec![ScheduleSlot {
            day: "Monday".to_string(),
            start_time: "09:00".to_string(),
            end_time: "10:00".to_string(),
            date: None,
        }];
        let (date, start, end) = derived_slot_fields(&slots);
        assert_eq!(date, "");
        assert_eq!(start, "09:00");
        assert_eq!(end, "10:00");
    }

    #[test]
    fn program_document_shape_uses_wire_names() {
        let doc = json!({
            "id": "p1",
            "title": "Social Tennis",
            "sport": "Tennis",
            "organizer_email": "org@example.com",
            "description": "Weekly hits",
            "ageGroups": ["adults"],
            "cost": 0,
            "costUnit": "per session",
            "inclusivityTags": ["beginner-friendly"],
            "maxParticipants": 12,
            "status": "active",
            "createdAt": "2026-08-01T00:00:00Z",
            "updatedAt": "2026-08-01T00:00:00Z",
        });
        let program: Program = serde_json::from_value(doc).unwrap();
        assert!(program.is_active());
        assert_eq!(program.age_groups, vec!["adults"]);
        assert_eq!(program.inclusivity_tags, vec!["beginner-friendly"]);

        let back = serde_json::to_value(&program).unwrap();
        assert!(back.get("ageGroups").is_some());
        assert!(back.get("maxParticipants").is_some());
        assert!(back.get("cancelledAt").is_none());
    }
}
