mod alternatives;
mod availability;
mod booking;
mod conflict;
mod error;
mod queries;
#[cfg(test)]
mod tests;

pub use alternatives::Alternative;
pub use availability::{booking_window, by_proximity, merge_overlapping, subtract_intervals, SlotRules, Slots};
pub use booking::{BookingDraft, BookingOutcome, InvalidReason, RescheduleDraft, UnavailableReason};
pub use error::{EngineError, NotFoundKind};
pub use queries::{AppointmentFilter, DaySlots, SlotQuery};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::catalog::CatalogRepository;
use crate::clock::SharedClock;
use crate::limits::MAX_APPOINTMENTS_PER_STAFF;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{TXN_RETRIES_TOTAL, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<StaffCalendar>>;

/// Linear backoff unit between calendar lock attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long one attempt waits for all staff calendar locks.
    pub txn_timeout: Duration,
    /// Extra attempts after the first lock timeout.
    pub txn_max_retries: u32,
    /// Alternatives returned with a rejected booking.
    pub alternatives_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            txn_timeout: Duration::from_millis(2_000),
            txn_max_retries: 3,
            alternatives_limit: 5,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    /// Rewrite the log as one `AppointmentBooked` per appointment.
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Waits for one append, drains whatever else is already queued, then makes
/// the whole batch durable with a single fsync before answering every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, mut batch: Vec<PendingAppend>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(path = %wal.path().display(), "WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    // Every caller in a failed batch is told it failed, so none of its
    // bytes may survive to be replayed.
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        tracing::error!(path = %wal.path().display(), "WAL rollback failed: {e}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let _ = response.send(compact(wal));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// Fold the log into its current state and rewrite it. Runs on the writer
/// task, so no append can land between the read and the swap.
fn compact(wal: &mut Wal) -> io::Result<()> {
    let events = Wal::replay(wal.path())?;
    let before = events.len();
    let mut calendars: Vec<StaffCalendar> = rebuild_calendars(&events).into_values().collect();
    calendars.sort_by_key(|c| c.staff_id);
    let snapshot: Vec<Event> = calendars
        .into_iter()
        .flat_map(|c| c.appointments)
        .map(|appointment| Event::AppointmentBooked { appointment })
        .collect();
    Wal::write_compact_file(wal.path(), &snapshot)?;
    wal.swap_compact_file()?;
    tracing::info!(path = %wal.path().display(), before, after = snapshot.len(), "compacted WAL");
    Ok(())
}

/// Apply an event to one calendar. The caller holds the calendar's lock
/// (or owns it outright during replay).
fn apply_to_calendar(cal: &mut StaffCalendar, event: &Event) {
    match event {
        Event::AppointmentBooked { appointment } => {
            if appointment.staff_id == cal.staff_id {
                cal.insert(appointment.clone());
            }
        }
        Event::StatusChanged { id, staff_id, status } => {
            if *staff_id == cal.staff_id
                && let Some(a) = cal.get_mut(*id) {
                    a.status = *status;
                }
        }
        Event::Rescheduled {
            previous_id,
            previous_staff_id,
            appointment,
        } => {
            if *previous_staff_id == cal.staff_id
                && let Some(previous) = cal.get_mut(*previous_id) {
                    previous.status = AppointmentStatus::Cancelled;
                }
            if appointment.staff_id == cal.staff_id {
                cal.insert(appointment.clone());
            }
        }
    }
}

fn rebuild_calendars(events: &[Event]) -> HashMap<Ulid, StaffCalendar> {
    let mut calendars: HashMap<Ulid, StaffCalendar> = HashMap::new();
    for event in events {
        for staff_id in event.staff_ids() {
            let cal = calendars
                .entry(staff_id)
                .or_insert_with(|| StaffCalendar::new(staff_id));
            apply_to_calendar(cal, event);
        }
    }
    calendars
}

/// Exclusive hold on a set of staff calendars, acquired in id order.
///
/// Conflict checks and commits go through a transaction, so for any one
/// staff member they are serialized. Dropping it releases every lock.
pub struct CalendarTxn {
    guards: Vec<OwnedRwLockWriteGuard<StaffCalendar>>,
}

impl CalendarTxn {
    pub fn calendar(&self, staff_id: Ulid) -> Option<&StaffCalendar> {
        self.guards.iter().find(|g| g.staff_id == staff_id).map(|g| &**g)
    }

    fn calendar_mut(&mut self, staff_id: Ulid) -> Option<&mut StaffCalendar> {
        self.guards
            .iter_mut()
            .find(|g| g.staff_id == staff_id)
            .map(|g| &mut **g)
    }
}

/// Booking engine for one salon: in-memory staff calendars backed by a WAL.
pub struct Engine {
    pub salon_id: Ulid,
    pub(super) catalog: Arc<dyn CatalogRepository>,
    calendars: DashMap<Ulid, SharedCalendar>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Appointment id → staff id. An appointment never changes staff.
    appointment_index: DashMap<Ulid, Ulid>,
    pub(super) settings: EngineSettings,
    clock: SharedClock,
}

impl Engine {
    pub fn new(
        salon_id: Ulid,
        wal_path: PathBuf,
        catalog: Arc<dyn CatalogRepository>,
        notify: Arc<NotifyHub>,
        clock: SharedClock,
        settings: EngineSettings,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        // Replay builds plain calendars first; nothing else can see them yet.
        let calendars = DashMap::new();
        let appointment_index = DashMap::new();
        for (staff_id, cal) in rebuild_calendars(&events) {
            for a in &cal.appointments {
                appointment_index.insert(a.id, staff_id);
            }
            calendars.insert(staff_id, Arc::new(RwLock::new(cal)));
        }
        tracing::debug!(salon = %salon_id, events = events.len(), staff = calendars.len(), "replayed WAL");

        Ok(Self {
            salon_id,
            catalog,
            calendars,
            wal_tx,
            notify,
            appointment_index,
            settings,
            clock,
        })
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.utc().timestamp_millis()
    }

    /// The calendar for a staff member, created empty on first use. The
    /// entry API makes concurrent first uses agree on a single lock.
    fn calendar(&self, staff_id: Ulid) -> SharedCalendar {
        self.calendars
            .entry(staff_id)
            .or_insert_with(|| Arc::new(RwLock::new(StaffCalendar::new(staff_id))))
            .value()
            .clone()
    }

    pub(super) fn existing_calendar(&self, staff_id: Ulid) -> Option<SharedCalendar> {
        self.calendars.get(&staff_id).map(|e| e.value().clone())
    }

    pub(super) fn staff_for_appointment(&self, id: Ulid) -> Option<Ulid> {
        self.appointment_index.get(&id).map(|e| *e.value())
    }

    /// Lock the calendars of every listed staff member. Each attempt is
    /// bounded by `txn_timeout`; a timed-out attempt releases what it took
    /// and retries with linear backoff before giving up with `Timeout`.
    pub async fn begin(&self, staff_ids: &[Ulid]) -> Result<CalendarTxn, EngineError> {
        let mut ids = staff_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut attempt = 0u32;
        loop {
            match self.try_begin(&ids).await {
                Ok(txn) => return Ok(txn),
                Err(EngineError::Timeout) if attempt < self.settings.txn_max_retries => {
                    attempt += 1;
                    metrics::counter!(TXN_RETRIES_TOTAL).increment(1);
                    tracing::warn!(salon = %self.salon_id, attempt, "calendar lock timed out, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_begin(&self, sorted_ids: &[Ulid]) -> Result<CalendarTxn, EngineError> {
        let deadline = tokio::time::Instant::now() + self.settings.txn_timeout;
        let mut guards = Vec::with_capacity(sorted_ids.len());
        for staff_id in sorted_ids {
            let guard = tokio::time::timeout_at(deadline, self.calendar(*staff_id).write_owned())
                .await
                .map_err(|_| EngineError::Timeout)?;
            guards.push(guard);
        }
        Ok(CalendarTxn { guards })
    }

    /// WAL-append, then apply to the locked calendars, then notify. Nothing
    /// is applied unless the append is durable.
    pub(super) async fn commit(&self, txn: &mut CalendarTxn, event: &Event) -> Result<(), EngineError> {
        let staff_ids = event.staff_ids();
        if let Event::AppointmentBooked { appointment } | Event::Rescheduled { appointment, .. } = event {
            let full = txn
                .calendar(appointment.staff_id)
                .is_some_and(|c| c.appointments.len() >= MAX_APPOINTMENTS_PER_STAFF);
            if full {
                return Err(EngineError::LimitExceeded("too many appointments for staff member"));
            }
        }

        self.wal_append(event).await?;
        for staff_id in &staff_ids {
            match txn.calendar_mut(*staff_id) {
                Some(cal) => apply_to_calendar(cal, event),
                None => debug_assert!(false, "commit outside the transaction's calendars"),
            }
        }
        if let Event::AppointmentBooked { appointment } | Event::Rescheduled { appointment, .. } = event {
            self.appointment_index.insert(appointment.id, appointment.staff_id);
        }
        self.notify.publish(event);
        Ok(())
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
