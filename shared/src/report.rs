//! Organizer report aggregation.
//!
//! Produces an ordered sequence of line items; turning those into a
//! downloadable document is the renderer's job, behind [`ReportRenderer`].

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::auth::Identity;
use crate::models::{Appointment, AppointmentStatus, Program, ProgramStatus};
use crate::store::{Collections, DocumentStore};
use crate::{Error, Result};

/// One line of the report, in render order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportItem {
    SectionHeader { text: String },
    KeyValue { label: String, value: String },
    TableHeader { columns: Vec<String> },
    TableRow { cells: Vec<String> },
}

#[derive(Debug, Serialize)]
pub struct OrganizerReport {
    #[serde(rename = "organizerEmail")]
    pub organizer_email: String,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "totalPrograms")]
    pub total_programs: usize,
    #[serde(rename = "totalAppointments")]
    pub total_appointments: usize,
    pub items: Vec<ReportItem>,
}

/// Renders a report line-item sequence into a downloadable byte stream.
/// The PDF implementation lives outside the core; [`TextRenderer`] is the
/// plain-text fallback.
pub trait ReportRenderer {
    fn render(&self, report: &OrganizerReport) -> Result<Vec<u8>>;
    fn content_type(&self) -> &'static str;
}

/// Plain-text rendering, one line per item.
pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn render(&self, report: &OrganizerReport) -> Result<Vec<u8>> {
        let mut out = String::new();
        for item in &report.items {
            match item {
                ReportItem::SectionHeader { text } => {
                    out.push_str(&format!("\n== {} ==\n", text));
                }
                ReportItem::KeyValue { label, value } => {
                    out.push_str(&format!("{}: {}\n", label, value));
                }
                ReportItem::TableHeader { columns } => {
                    out.push_str(&format!("{}\n", columns.join(" | ")));
                }
                ReportItem::TableRow { cells } => {
                    out.push_str(&format!("{}\n", cells.join(" | ")));
                }
            }
        }
        Ok(out.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}

/// First instant of the calendar month containing `now`.
fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first_day = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    DateTime::from_naive_utc_and_offset(first_day.and_time(NaiveTime::MIN), Utc)
}

pub struct ReportAggregator {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    async fn organizer_programs(
        &self,
        organizer: &Identity,
        include_cancelled: bool,
    ) -> Result<Vec<Program>> {
        let docs = self
            .store
            .query_eq(
                &self.collections.programs,
                "organizer_email",
                &Value::String(organizer.email.clone()),
            )
            .await?;

        let mut programs: Vec<Program> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed program document");
                    None
                }
            })
            .filter(|p: &Program| include_cancelled || p.status == ProgramStatus::Active)
            .collect();

        programs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(programs)
    }

    async fn confirmed_appointments(&self, program_id: &str) -> Result<Vec<Appointment>> {
        let docs = self
            .store
            .query_eq(
                &self.collections.appointments,
                "program_id",
                &Value::String(program_id.to_string()),
            )
            .await?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(a) => Some(a),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed appointment document");
                    None
                }
            })
            .filter(|a: &Appointment| a.status == AppointmentStatus::Confirmed)
            .collect())
    }

    /// Build the organizer's summary: program and appointment totals plus
    /// per-program detail, with monthly counts relative to `now`.
    pub async fn build_organizer_report(
        &self,
        organizer: &Identity,
        include_cancelled: bool,
        now: DateTime<Utc>,
    ) -> Result<OrganizerReport> {
        if organizer.email.trim().is_empty() {
            return Err(Error::Auth("Organizer identity is required".to_string()));
        }

        let programs = self.organizer_programs(organizer, include_cancelled).await?;
        let since = month_start(now);

        let mut items = vec![
            ReportItem::SectionHeader {
                text: "Organizer Report".to_string(),
            },
            ReportItem::KeyValue {
                label: "Organizer".to_string(),
                value: organizer.email.clone(),
            },
            ReportItem::KeyValue {
                label: "Generated".to_string(),
                value: now.to_rfc3339(),
            },
        ];

        let mut total_appointments = 0;
        let mut sections = Vec::new();

        for program in &programs {
            let appointments = self.confirmed_appointments(&program.id).await?;
            let monthly = appointments
                .iter()
                .filter(|a| a.created_at >= since)
                .count();
            total_appointments += appointments.len();

            sections.push(ReportItem::SectionHeader {
                text: format!("{} ({})", program.title, program.sport),
            });
            sections.push(ReportItem::KeyValue {
                label: "Status".to_string(),
                value: match program.status {
                    ProgramStatus::Active => "active".to_string(),
                    ProgramStatus::Cancelled => "cancelled".to_string(),
                },
            });
            sections.push(ReportItem::KeyValue {
                label: "Confirmed appointments".to_string(),
                value: appointments.len().to_string(),
            });
            sections.push(ReportItem::KeyValue {
                label: "Booked this month".to_string(),
                value: monthly.to_string(),
            });

            if !appointments.is_empty() {
                sections.push(ReportItem::TableHeader {
                    columns: vec![
                        "Member".to_string(),
                        "Date".to_string(),
                        "Start".to_string(),
                        "End".to_string(),
                        "Booked".to_string(),
                    ],
                });
                for appointment in &appointments {
                    sections.push(ReportItem::TableRow {
                        cells: vec![
                            appointment.user_email.clone(),
                            appointment.date.clone(),
                            appointment.start_time.clone(),
                            appointment.end_time.clone(),
                            appointment.created_at.to_rfc3339(),
                        ],
                    });
                }
            }
        }

        items.push(ReportItem::KeyValue {
            label: "Total programs".to_string(),
            value: programs.len().to_string(),
        });
        items.push(ReportItem::KeyValue {
            label: "Total confirmed appointments".to_string(),
            value: total_appointments.to_string(),
        });
        items.extend(sections);

        Ok(OrganizerReport {
            organizer_email: organizer.email.clone(),
            generated_at: now,
            total_programs: programs.len(),
            total_appointments,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn seed_program(id: &str, status: &str) -> Value {
        json!({
            "id": id,
            "title": format!("Program {}", id),
            "sport": "Tennis",
            "organizer_email": "org@example.com",
            "description": "d",
            "cost": 0,
            "status": status,
            "createdAt": "2026-07-01T00:00:00Z",
            "updatedAt": "2026-07-01T00:00:00Z",
        })
    }

    fn seed_appointment(id: &str, program_id: &str, status: &str, created_at: &str) -> Value {
        json!({
            "id": id,
            "program_id": program_id,
            "user_email": format!("{}@example.com", id),
            "status": status,
            "createdAt": created_at,
            "updatedAt": created_at,
        })
    }

    async fn aggregator_with_fixture() -> ReportAggregator {
        let store = Arc::new(MemoryStore::new());
        store.set("programs", "p1", seed_program("p1", "active")).await.unwrap();
        store.set("programs", "p2", seed_program("p2", "active")).await.unwrap();
        store.set("programs", "p3", seed_program("p3", "cancelled")).await.unwrap();

        // p1: three confirmed (one from last month) and one cancelled.
        store
            .set("appointments", "a1", seed_appointment("a1", "p1", "confirmed", "2026-08-03T10:00:00Z"))
            .await
            .unwrap();
        store
            .set("appointments", "a2", seed_appointment("a2", "p1", "confirmed", "2026-08-10T10:00:00Z"))
            .await
            .unwrap();
        store
            .set("appointments", "a3", seed_appointment("a3", "p1", "confirmed", "2026-07-20T10:00:00Z"))
            .await
            .unwrap();
        store
            .set("appointments", "a4", seed_appointment("a4", "p1", "cancelled", "2026-08-11T10:00:00Z"))
            .await
            .unwrap();

        ReportAggregator::new(store, Collections::default())
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn totals_count_only_confirmed_appointments() {
        let aggregator = aggregator_with_fixture().await;
        let report = aggregator
            .build_organizer_report(&Identity::from_email("org@example.com"), false, fixed_now())
            .await
            .unwrap();

        assert_eq!(report.total_programs, 2);
        assert_eq!(report.total_appointments, 3);
    }

    #[tokio::test]
    async fn monthly_count_starts_at_first_of_month() {
        let aggregator = aggregator_with_fixture().await;
        let report = aggregator
            .build_organizer_report(&Identity::from_email("org@example.com"), false, fixed_now())
            .await
            .unwrap();

        let monthly = report
            .items
            .iter()
            .find_map(|item| match item {
                ReportItem::KeyValue { label, value } if label == "Booked this month" => {
                    Some(value.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(monthly, "2");
    }

    #[tokio::test]
    async fn include_cancelled_adds_cancelled_programs() {
        let aggregator = aggregator_with_fixture().await;
        let report = aggregator
            .build_organizer_report(&Identity::from_email("org@example.com"), true, fixed_now())
            .await
            .unwrap();
        assert_eq!(report.total_programs, 3);
    }

    #[tokio::test]
    async fn text_renderer_emits_one_line_per_item() {
        let aggregator = aggregator_with_fixture().await;
        let report = aggregator
            .build_organizer_report(&Identity::from_email("org@example.com"), false, fixed_now())
            .await
            .unwrap();

        let bytes = TextRenderer.render(&report).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("== Organizer Report =="));
        assert!(text.contains("Total programs: 2"));
    }

    #[test]
    fn month_start_is_midnight_on_the_first() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 17, 30, 0).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
        );
    }
}
