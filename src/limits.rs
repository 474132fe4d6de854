use crate::model::Ms;

pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_SLUG_LEN: usize = 64;

/// Appointments (including cancelled history) kept per staff calendar.
pub const MAX_APPOINTMENTS_PER_STAFF: usize = 100_000;

/// Largest encoded WAL record. A longer length prefix marks a corrupt tail.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

pub const MAX_ALTERNATIVES: usize = 50;
/// Upper bound on days scanned for alternatives, whatever the salon's advance window.
pub const MAX_ALTERNATIVE_SCAN_DAYS: u32 = 62;

pub const MIN_SLOT_INTERVAL_MINUTES: u32 = 5;
pub const MAX_SERVICE_MINUTES: u32 = 24 * 60;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;
