use ulid::Ulid;

use crate::model::*;

use super::CalendarTxn;

/// First non-cancelled appointment whose occupied span overlaps `candidate`.
///
/// `candidate` must already include the new booking's buffer. `exclude`
/// skips one appointment, used when rescheduling within the same calendar.
pub(crate) fn find_conflict(calendar: &StaffCalendar, candidate: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    calendar
        .overlapping(candidate)
        .filter(|a| a.is_blocking() && Some(a.id) != exclude)
        .find(|a| a.occupied().overlaps(candidate))
        .map(|a| a.id)
}

/// Conflict check under the transaction's write lock. Only a check made
/// through a live [`CalendarTxn`] may decide whether to commit.
pub(crate) fn has_conflict(txn: &CalendarTxn, staff_id: Ulid, candidate: &Span, exclude: Option<Ulid>) -> bool {
    match txn.calendar(staff_id) {
        Some(calendar) => find_conflict(calendar, candidate, exclude).is_some(),
        None => {
            debug_assert!(false, "conflict check on a calendar outside the transaction");
            true
        }
    }
}
