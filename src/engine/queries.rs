use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::BusinessCalendar;
use crate::model::*;
use crate::observability::SLOT_QUERIES_TOTAL;

use super::availability::Slots;
use super::{Engine, EngineError, NotFoundKind, SharedCalendar};

#[derive(Debug, Clone, Copy)]
pub struct SlotQuery {
    pub staff_id: Ulid,
    pub service_id: Ulid,
    pub location_id: Option<Ulid>,
    pub date: NaiveDate,
}

/// Free start times for one query, with the timezone needed to render them.
#[derive(Debug, Clone)]
pub struct DaySlots {
    pub calendar: BusinessCalendar,
    pub location_id: Ulid,
    pub slots: Slots,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentFilter {
    pub staff_id: Option<Ulid>,
    /// Salon-local date the appointment starts on.
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
}

impl Engine {
    /// Start times a booking for `query` would currently be accepted at.
    /// Read-only: repeated calls with no booking in between agree.
    pub async fn available_slots(&self, query: &SlotQuery) -> Result<DaySlots, EngineError> {
        metrics::counter!(SLOT_QUERIES_TOTAL).increment(1);
        let salon = self.salon().await?;
        let ctx = self
            .resolve(salon, query.staff_id, query.service_id, query.location_id)
            .await?;
        let slots = self.slots_for(&ctx, &ctx.staff, query.date).await;
        Ok(DaySlots {
            calendar: ctx.calendar,
            location_id: ctx.location.id,
            slots,
        })
    }

    pub async fn get(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let not_found = EngineError::NotFound(NotFoundKind::Appointment);
        let Some(staff_id) = self.staff_for_appointment(id) else {
            return Err(not_found);
        };
        let Some(calendar) = self.existing_calendar(staff_id) else {
            return Err(not_found);
        };
        let guard = calendar.read().await;
        guard.get(id).cloned().ok_or(not_found)
    }

    /// Appointments matching `filter`, ordered by start time then id.
    pub async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, EngineError> {
        let day = match filter.date {
            Some(date) => {
                let salon = self.salon().await?;
                Some(BusinessCalendar::for_salon(&salon).day_span(date))
            }
            None => None,
        };

        let calendars: Vec<SharedCalendar> = match filter.staff_id {
            Some(staff_id) => self.existing_calendar(staff_id).into_iter().collect(),
            None => self.calendars.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for calendar in calendars {
            let guard = calendar.read().await;
            out.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| day.is_none_or(|d| d.start <= a.span.start && a.span.start < d.end))
                    .filter(|a| filter.status.is_none_or(|s| a.status == s))
                    .cloned(),
            );
        }
        out.sort_by_key(|a| (a.span.start, a.id));
        Ok(out)
    }
}
