use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{AppointmentStatus, Event, Span};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Booked,
    StatusChanged,
    /// A replacement appointment landed on this calendar.
    Rescheduled,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Booked => "booked",
            ChangeKind::StatusChanged => "status_changed",
            ChangeKind::Rescheduled => "rescheduled",
        }
    }
}

/// What one committed event changed on one staff member's calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffChange {
    pub kind: ChangeKind,
    pub appointment_id: Ulid,
    pub previous_id: Option<Ulid>,
    pub status: AppointmentStatus,
    /// Present when the change places an appointment on the calendar.
    pub span: Option<Span>,
}

impl StaffChange {
    /// The change `event` makes to `staff_id`'s calendar, if any.
    ///
    /// A reschedule across staff shows up as a cancellation on the old
    /// calendar and a `Rescheduled` on the new one.
    pub fn for_staff(event: &Event, staff_id: Ulid) -> Option<Self> {
        match event {
            Event::AppointmentBooked { appointment } if appointment.staff_id == staff_id => Some(Self {
                kind: ChangeKind::Booked,
                appointment_id: appointment.id,
                previous_id: None,
                status: appointment.status,
                span: Some(appointment.span),
            }),
            Event::StatusChanged { id, staff_id: owner, status } if *owner == staff_id => Some(Self {
                kind: ChangeKind::StatusChanged,
                appointment_id: *id,
                previous_id: None,
                status: *status,
                span: None,
            }),
            Event::Rescheduled {
                previous_id,
                appointment,
                ..
            } if appointment.staff_id == staff_id => Some(Self {
                kind: ChangeKind::Rescheduled,
                appointment_id: appointment.id,
                previous_id: Some(*previous_id),
                status: appointment.status,
                span: Some(appointment.span),
            }),
            Event::Rescheduled {
                previous_id,
                previous_staff_id,
                ..
            } if *previous_staff_id == staff_id => Some(Self {
                kind: ChangeKind::StatusChanged,
                appointment_id: *previous_id,
                previous_id: None,
                status: AppointmentStatus::Cancelled,
                span: None,
            }),
            _ => None,
        }
    }
}

/// Broadcast hub for calendar changes, one channel per staff member.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<StaffChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, staff_id: Ulid) -> broadcast::Receiver<StaffChange> {
        self.channels
            .entry(staff_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan a committed event out to every staff member it touches.
    /// Staff nobody is watching are skipped.
    pub fn publish(&self, event: &Event) {
        for staff_id in event.staff_ids() {
            let Some(sender) = self.channels.get(&staff_id) else {
                continue;
            };
            if let Some(change) = StaffChange::for_staff(event, staff_id) {
                let _ = sender.send(change);
            }
        }
    }
}
