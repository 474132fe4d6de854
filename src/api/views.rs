//! JSON shapes returned by the HTTP layer. Instants are RFC 3339 in UTC;
//! `date`/`time` pairs are salon-local wall-clock values.

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use ulid::Ulid;

use crate::calendar::BusinessCalendar;
use crate::engine::Alternative;
use crate::model::{Appointment, AppointmentStatus, Ms};

pub fn iso(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Ulid,
    pub salon_id: Ulid,
    pub staff_id: Ulid,
    pub location_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub status: AppointmentStatus,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub buffer_minutes: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<Appointment> for AppointmentView {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            salon_id: a.salon_id,
            staff_id: a.staff_id,
            location_id: a.location_id,
            service_id: a.service_id,
            client_id: a.client_id,
            status: a.status,
            start_time: iso(a.span.start),
            end_time: iso(a.span.end),
            duration_minutes: a.duration_minutes(),
            buffer_minutes: a.buffer_ms / 60_000,
            first_name: a.client.first_name,
            last_name: a.client.last_name,
            email: a.client.email,
            notes: a.notes,
            created_at: iso(a.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeView {
    pub time: String,
    pub date: String,
    pub staff_id: Ulid,
    pub staff_name: String,
    pub start_time: String,
}

impl From<&Alternative> for AlternativeView {
    fn from(alt: &Alternative) -> Self {
        Self {
            time: alt.time.clone(),
            date: alt.date.clone(),
            staff_id: alt.staff_id,
            staff_name: alt.staff_name.clone(),
            start_time: iso(alt.start),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub time: String,
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityView {
    pub date: String,
    pub staff_id: Ulid,
    pub service_id: Ulid,
    pub location_id: Ulid,
    pub slots: Vec<SlotView>,
}

impl SlotView {
    pub fn new(calendar: &BusinessCalendar, start: Ms) -> Self {
        let time = calendar.format_local(start).map(|(_, time)| time).unwrap_or_default();
        Self {
            time,
            start_time: iso(start),
        }
    }
}
