use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Overlapping part of two spans, if any.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| Span::new(start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Only `confirmed` has outgoing transitions; every other state is a sink.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
            )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// The appointment record. `span` is `[startTime, endTime)`; the staff member
/// stays occupied for `buffer_ms` after `span.end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub salon_id: Ulid,
    pub staff_id: Ulid,
    pub location_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub span: Span,
    pub buffer_ms: Ms,
    pub status: AppointmentStatus,
    pub client: ClientInfo,
    pub notes: Option<String>,
    pub created_at: Ms,
}

impl Appointment {
    /// `[start, end + buffer)`, the span no other booking may overlap.
    pub fn occupied(&self) -> Span {
        Span::new(self.span.start, self.span.end + self.buffer_ms)
    }

    /// Cancelled appointments are history only and never block a slot.
    pub fn is_blocking(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn duration_minutes(&self) -> i64 {
        self.span.duration_ms() / 60_000
    }
}

/// All appointments for one staff member, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct StaffCalendar {
    pub staff_id: Ulid,
    pub appointments: Vec<Appointment>,
}

impl StaffCalendar {
    pub fn new(staff_id: Ulid) -> Self {
        Self {
            staff_id,
            appointments: Vec::new(),
        }
    }

    /// Insert appointment maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.span.start <= appointment.span.start);
        self.appointments.insert(pos, appointment);
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Appointments whose occupied span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.occupied().end > query.start)
    }

    /// Occupied spans of non-cancelled appointments touching `query`, sorted by start.
    pub fn busy_spans(&self, query: &Span) -> Vec<Span> {
        self.overlapping(query)
            .filter(|a| a.is_blocking())
            .map(Appointment::occupied)
            .collect()
    }
}

/// WAL record format. Flat, no nesting beyond the appointment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked {
        appointment: Appointment,
    },
    StatusChanged {
        id: Ulid,
        staff_id: Ulid,
        status: AppointmentStatus,
    },
    /// Cancel `previous_id` and book `appointment` as one record.
    Rescheduled {
        previous_id: Ulid,
        previous_staff_id: Ulid,
        appointment: Appointment,
    },
}

impl Event {
    /// Staff calendars touched by this event, deduplicated.
    pub fn staff_ids(&self) -> Vec<Ulid> {
        match self {
            Event::AppointmentBooked { appointment } => vec![appointment.staff_id],
            Event::StatusChanged { staff_id, .. } => vec![*staff_id],
            Event::Rescheduled {
                previous_staff_id,
                appointment,
                ..
            } => {
                if *previous_staff_id == appointment.staff_id {
                    vec![appointment.staff_id]
                } else {
                    vec![*previous_staff_id, appointment.staff_id]
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_appointment(staff_id: Ulid, start: Ms, end: Ms) -> Appointment {
    Appointment {
        id: Ulid::new(),
        salon_id: Ulid::nil(),
        staff_id,
        location_id: Ulid::nil(),
        service_id: Ulid::nil(),
        client_id: Ulid::nil(),
        span: Span::new(start, end),
        buffer_ms: 0,
        status: AppointmentStatus::Confirmed,
        client: ClientInfo {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
        },
        notes: None,
        created_at: 0,
    }
}
