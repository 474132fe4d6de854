use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use ulid::Ulid;

use crate::calendar::BusinessCalendar;
use crate::catalog::{CatalogError, Location, Salon, Service, Staff};
use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, BOOKING_DURATION_SECONDS};

use super::alternatives::Alternative;
use super::availability::booking_window;
use super::conflict::has_conflict;
use super::{Engine, EngineError, NotFoundKind};

/// Booking request exactly as the client sent it. Every field is optional
/// here so that missing fields can be reported together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub service_id: Option<String>,
    pub staff_id: Option<String>,
    pub location_id: Option<String>,
    pub start_time: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleDraft {
    pub start_time: Option<String>,
    /// Defaults to the appointment's current staff member.
    pub staff_id: Option<String>,
    /// Defaults to the appointment's current location.
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// Wire names of every required field that was absent or blank.
    MissingFields(Vec<&'static str>),
    /// The service is unknown, inactive, or not offered by the staff member.
    InvalidService,
    MalformedField {
        field: &'static str,
        problem: &'static str,
    },
}

/// Why a well-formed request falls outside what the salon will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    BookingDisabled,
    TooSoon { earliest: Ms },
    TooFarAhead { latest: Ms },
    /// Not inside the location's open hours and the staff member's working hours.
    OutsideHours,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::BookingDisabled => f.write_str("online booking is disabled for this salon"),
            UnavailableReason::TooSoon { .. } => f.write_str("requested time is inside the minimum notice period"),
            UnavailableReason::TooFarAhead { .. } => f.write_str("requested time is beyond the advance booking window"),
            UnavailableReason::OutsideHours => f.write_str("requested time is outside working hours"),
        }
    }
}

/// Result of a booking attempt. Business rejections are values here;
/// infrastructure failures are the `Err` side of [`Engine::book`].
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Booked(Appointment),
    /// Another booking holds the staff member at that time.
    Conflict { alternatives: Vec<Alternative> },
    Unavailable {
        reason: UnavailableReason,
        alternatives: Vec<Alternative>,
    },
    Invalid(InvalidReason),
    NotFound(NotFoundKind),
}

impl BookingOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BookingOutcome::Booked(_) => "booked",
            BookingOutcome::Conflict { .. } => "time_conflict",
            BookingOutcome::Unavailable { .. } => "slot_unavailable",
            BookingOutcome::Invalid(InvalidReason::InvalidService) => "invalid_service",
            BookingOutcome::Invalid(_) => "invalid",
            BookingOutcome::NotFound(_) => "not_found",
        }
    }
}

/// Internal short-circuit for the booking paths: either a business outcome
/// to hand back as `Ok`, or an engine failure.
pub(super) enum Rejection {
    Outcome(BookingOutcome),
    Failed(EngineError),
}

impl From<BookingOutcome> for Rejection {
    fn from(outcome: BookingOutcome) -> Self {
        Rejection::Outcome(outcome)
    }
}

impl From<EngineError> for Rejection {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(kind) => Rejection::Outcome(BookingOutcome::NotFound(kind)),
            EngineError::InvalidService => Rejection::Outcome(BookingOutcome::Invalid(InvalidReason::InvalidService)),
            other => Rejection::Failed(other),
        }
    }
}

impl From<CatalogError> for Rejection {
    fn from(e: CatalogError) -> Self {
        Rejection::Failed(e.into())
    }
}

fn settle(result: Result<Appointment, Rejection>) -> Result<BookingOutcome, EngineError> {
    match result {
        Ok(appointment) => Ok(BookingOutcome::Booked(appointment)),
        Err(Rejection::Outcome(outcome)) => Ok(outcome),
        Err(Rejection::Failed(e)) => Err(e),
    }
}

/// A validated booking request.
#[derive(Debug, Clone)]
pub(super) struct BookingRequest {
    pub service_id: Ulid,
    pub staff_id: Ulid,
    pub location_id: Option<Ulid>,
    pub start: Ms,
    pub client: ClientInfo,
    pub notes: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn malformed(field: &'static str, problem: &'static str) -> BookingOutcome {
    BookingOutcome::Invalid(InvalidReason::MalformedField { field, problem })
}

/// RFC 3339 instants are taken as-is; a date-time without an offset is read
/// as wall-clock time in the salon's timezone.
pub(super) fn parse_start(raw: &str, calendar: &BusinessCalendar) -> Option<Ms> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| calendar.local_to_ms(naive.date(), naive.time()))
}

fn parse_optional_id(raw: &Option<String>, missing: NotFoundKind) -> Result<Option<Ulid>, BookingOutcome> {
    present(raw)
        .map(|s| Ulid::from_string(s).map_err(|_| BookingOutcome::NotFound(missing)))
        .transpose()
}

impl BookingDraft {
    pub(super) fn validate(&self, calendar: &BusinessCalendar) -> Result<BookingRequest, BookingOutcome> {
        let required = [
            ("serviceId", &self.service_id),
            ("staffId", &self.staff_id),
            ("startTime", &self.start_time),
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| present(value).is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(BookingOutcome::Invalid(InvalidReason::MissingFields(missing)));
        }
        let field = |value: &Option<String>| present(value).unwrap_or_default().to_string();

        let service_id = Ulid::from_string(&field(&self.service_id))
            .map_err(|_| BookingOutcome::Invalid(InvalidReason::InvalidService))?;
        let staff_id = Ulid::from_string(&field(&self.staff_id))
            .map_err(|_| BookingOutcome::NotFound(NotFoundKind::Staff))?;
        let location_id = parse_optional_id(&self.location_id, NotFoundKind::Location)?;
        let start = parse_start(&field(&self.start_time), calendar)
            .ok_or_else(|| malformed("startTime", "must be an ISO-8601 date-time"))?;

        let first_name = field(&self.first_name);
        let last_name = field(&self.last_name);
        let email = field(&self.email).to_lowercase();
        if first_name.len() > MAX_NAME_LEN {
            return Err(malformed("firstName", "is too long"));
        }
        if last_name.len() > MAX_NAME_LEN {
            return Err(malformed("lastName", "is too long"));
        }
        if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
            return Err(malformed("email", "must be an email address"));
        }
        let notes = present(&self.notes).map(str::to_string);
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(malformed("notes", "is too long"));
        }

        Ok(BookingRequest {
            service_id,
            staff_id,
            location_id,
            start,
            client: ClientInfo {
                first_name,
                last_name,
                email,
            },
            notes,
        })
    }
}

/// Everything a booking decision reads from the catalog, resolved once.
#[derive(Debug, Clone)]
pub(super) struct BookingContext {
    pub salon: Salon,
    pub calendar: BusinessCalendar,
    pub staff: Staff,
    pub service: Service,
    pub location: Location,
}

impl BookingContext {
    pub fn service_span(&self, start: Ms) -> Span {
        Span::new(start, start + Ms::from(self.service.duration_minutes) * MINUTE_MS)
    }

    pub fn buffer_ms(&self) -> Ms {
        Ms::from(self.service.buffer_minutes) * MINUTE_MS
    }

    /// Duration plus buffer.
    pub fn occupied_ms(&self) -> Ms {
        Ms::from(self.service.duration_minutes + self.service.buffer_minutes) * MINUTE_MS
    }

    pub fn step_ms(&self) -> Ms {
        Ms::from(self.salon.policy.booking_slot_interval.max(MIN_SLOT_INTERVAL_MINUTES)) * MINUTE_MS
    }
}

impl Engine {
    pub(super) async fn salon(&self) -> Result<Salon, EngineError> {
        self.catalog
            .salon(self.salon_id)
            .await?
            .ok_or(EngineError::NotFound(NotFoundKind::Salon))
    }

    /// Resolve staff, service and location for `salon`. An omitted location
    /// falls back to the first location the staff member is assigned to.
    pub(super) async fn resolve(
        &self,
        salon: Salon,
        staff_id: Ulid,
        service_id: Ulid,
        location_id: Option<Ulid>,
    ) -> Result<BookingContext, EngineError> {
        let staff = self
            .catalog
            .staff(salon.id, staff_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or(EngineError::NotFound(NotFoundKind::Staff))?;
        let service = self
            .catalog
            .service(salon.id, service_id)
            .await?
            .filter(|s| {
                s.is_active
                    && s.duration_minutes > 0
                    && s.duration_minutes <= MAX_SERVICE_MINUTES
                    && staff.performs(s.id)
            })
            .ok_or(EngineError::InvalidService)?;

        let location = match location_id {
            Some(id) => {
                let location = self
                    .catalog
                    .location(salon.id, id)
                    .await?
                    .ok_or(EngineError::NotFound(NotFoundKind::Location))?;
                if !staff.works_at(location.id) {
                    return Err(EngineError::NotFound(NotFoundKind::StaffLocation));
                }
                location
            }
            None => {
                let mut found = None;
                for id in &staff.locations {
                    if let Some(location) = self.catalog.location(salon.id, *id).await? {
                        found = Some(location);
                        break;
                    }
                }
                found.ok_or(EngineError::NotFound(NotFoundKind::Location))?
            }
        };

        Ok(BookingContext {
            calendar: BusinessCalendar::for_salon(&salon),
            salon,
            staff,
            service,
            location,
        })
    }

    /// Booking-window and working-hours checks. Appointments are not consulted.
    pub(super) fn check_bookable(&self, ctx: &BookingContext, start: Ms) -> Result<(), UnavailableReason> {
        let policy = &ctx.salon.policy;
        if !policy.booking_enabled {
            return Err(UnavailableReason::BookingDisabled);
        }
        let (earliest, latest) = booking_window(policy, self.now_ms());
        if start < earliest {
            return Err(UnavailableReason::TooSoon { earliest });
        }
        if start > latest {
            return Err(UnavailableReason::TooFarAhead { latest });
        }
        let occupied = Span::new(start, start + ctx.occupied_ms());
        let fits = ctx
            .calendar
            .date_of(start)
            .and_then(|date| ctx.calendar.bookable(&ctx.location, &ctx.staff, date))
            .is_some_and(|day| day.windows.iter().any(|w| w.contains_span(&occupied)));
        if fits { Ok(()) } else { Err(UnavailableReason::OutsideHours) }
    }

    async fn ensure_bookable(&self, ctx: &BookingContext, start: Ms) -> Result<(), Rejection> {
        let Err(reason) = self.check_bookable(ctx, start) else {
            return Ok(());
        };
        let alternatives = match reason {
            UnavailableReason::BookingDisabled => Vec::new(),
            _ => self.alternatives(ctx, start).await,
        };
        Err(BookingOutcome::Unavailable { reason, alternatives }.into())
    }

    async fn conflict(&self, ctx: &BookingContext, start: Ms) -> Rejection {
        let alternatives = self.alternatives(ctx, start).await;
        BookingOutcome::Conflict { alternatives }.into()
    }

    /// Book an appointment. For any one staff member and overlapping time,
    /// exactly one concurrent caller gets `Booked`; the rest get `Conflict`
    /// with alternatives.
    pub async fn book(&self, draft: BookingDraft) -> Result<BookingOutcome, EngineError> {
        let started = std::time::Instant::now();
        let result = settle(self.try_book(draft).await);

        let label = result.as_ref().map_or("error", BookingOutcome::label);
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => label).increment(1);
        metrics::histogram!(BOOKING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        match &result {
            Ok(BookingOutcome::Booked(a)) => tracing::info!(
                salon = %self.salon_id,
                appointment = %a.id,
                staff = %a.staff_id,
                start = a.span.start,
                "appointment booked"
            ),
            Ok(outcome) => tracing::debug!(salon = %self.salon_id, outcome = label, "booking rejected: {outcome:?}"),
            Err(e) => tracing::warn!(salon = %self.salon_id, "booking failed: {e}"),
        }
        result
    }

    async fn try_book(&self, draft: BookingDraft) -> Result<Appointment, Rejection> {
        let salon = self.salon().await?;
        let request = draft.validate(&BusinessCalendar::for_salon(&salon))?;
        let ctx = self
            .resolve(salon, request.staff_id, request.service_id, request.location_id)
            .await?;
        self.ensure_bookable(&ctx, request.start).await?;
        let client_id = self.catalog.resolve_client(ctx.salon.id, &request.client).await?;

        let appointment = Appointment {
            id: Ulid::new(),
            salon_id: ctx.salon.id,
            staff_id: ctx.staff.id,
            location_id: ctx.location.id,
            service_id: ctx.service.id,
            client_id,
            span: ctx.service_span(request.start),
            buffer_ms: ctx.buffer_ms(),
            status: AppointmentStatus::Confirmed,
            client: request.client,
            notes: request.notes,
            created_at: self.now_ms(),
        };

        let mut txn = self.begin(&[ctx.staff.id]).await?;
        if has_conflict(&txn, ctx.staff.id, &appointment.occupied(), None) {
            drop(txn);
            return Err(self.conflict(&ctx, request.start).await);
        }
        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        self.commit(&mut txn, &event).await?;
        Ok(appointment)
    }

    /// Move a confirmed appointment to `status`. Only `confirmed` has
    /// outgoing transitions.
    pub async fn transition(&self, id: Ulid, status: AppointmentStatus) -> Result<Appointment, EngineError> {
        let staff_id = self
            .staff_for_appointment(id)
            .ok_or(EngineError::NotFound(NotFoundKind::Appointment))?;
        let mut txn = self.begin(&[staff_id]).await?;
        let current = txn
            .calendar(staff_id)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or(EngineError::NotFound(NotFoundKind::Appointment))?;
        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: status,
            });
        }
        self.commit(&mut txn, &Event::StatusChanged { id, staff_id, status })
            .await?;
        tracing::info!(salon = %self.salon_id, appointment = %id, %status, "appointment status changed");
        Ok(Appointment { status, ..current })
    }

    /// Cancel `id` and book its replacement as one event. The replacement
    /// gets a new id; the original stays on record as cancelled.
    pub async fn reschedule(&self, id: Ulid, draft: RescheduleDraft) -> Result<BookingOutcome, EngineError> {
        let result = settle(self.try_reschedule(id, draft).await);
        if let Ok(BookingOutcome::Booked(a)) = &result {
            tracing::info!(salon = %self.salon_id, previous = %id, appointment = %a.id, "appointment rescheduled");
        }
        result
    }

    async fn try_reschedule(&self, id: Ulid, draft: RescheduleDraft) -> Result<Appointment, Rejection> {
        let current = self.get(id).await?;
        if current.status != AppointmentStatus::Confirmed {
            return Err(Rejection::Failed(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: AppointmentStatus::Cancelled,
            }));
        }
        let salon = self.salon().await?;
        let calendar = BusinessCalendar::for_salon(&salon);
        let raw_start = present(&draft.start_time)
            .ok_or(BookingOutcome::Invalid(InvalidReason::MissingFields(vec!["startTime"])))?;
        let start = parse_start(raw_start, &calendar)
            .ok_or_else(|| malformed("startTime", "must be an ISO-8601 date-time"))?;
        let staff_id = parse_optional_id(&draft.staff_id, NotFoundKind::Staff)?.unwrap_or(current.staff_id);
        let location_id = parse_optional_id(&draft.location_id, NotFoundKind::Location)?.unwrap_or(current.location_id);

        let ctx = self
            .resolve(salon, staff_id, current.service_id, Some(location_id))
            .await?;
        self.ensure_bookable(&ctx, start).await?;

        let mut txn = self.begin(&[current.staff_id, ctx.staff.id]).await?;
        match txn.calendar(current.staff_id).and_then(|c| c.get(id)).map(|a| a.status) {
            Some(AppointmentStatus::Confirmed) => {}
            Some(from) => {
                return Err(Rejection::Failed(EngineError::InvalidTransition {
                    id,
                    from,
                    to: AppointmentStatus::Cancelled,
                }));
            }
            None => return Err(BookingOutcome::NotFound(NotFoundKind::Appointment).into()),
        }

        let replacement = Appointment {
            id: Ulid::new(),
            staff_id: ctx.staff.id,
            location_id: ctx.location.id,
            span: ctx.service_span(start),
            buffer_ms: ctx.buffer_ms(),
            status: AppointmentStatus::Confirmed,
            created_at: self.now_ms(),
            ..current.clone()
        };
        let exclude = (ctx.staff.id == current.staff_id).then_some(id);
        if has_conflict(&txn, ctx.staff.id, &replacement.occupied(), exclude) {
            drop(txn);
            return Err(self.conflict(&ctx, start).await);
        }
        let event = Event::Rescheduled {
            previous_id: id,
            previous_staff_id: current.staff_id,
            appointment: replacement.clone(),
        };
        self.commit(&mut txn, &event).await?;
        Ok(replacement)
    }
}
