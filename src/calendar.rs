//! Open hours and working hours for a given local date.
//!
//! Every conversion between wall-clock time and [`Ms`] goes through the
//! salon's timezone. Nothing here touches appointments.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeDelta};
use chrono_tz::Tz;

use crate::catalog::{Location, Salon, Staff};
use crate::engine::{merge_overlapping, subtract_intervals};
use crate::model::{Ms, Span};

/// Bookable time for one staff member at one location on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookableDay {
    /// Start of the slot grid: the earliest moment both location and staff are available,
    /// before time off is removed.
    pub anchor: Ms,
    /// Disjoint windows, sorted.
    pub windows: Vec<Span>,
}

#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    tz: Tz,
}

impl BusinessCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn for_salon(salon: &Salon) -> Self {
        Self::new(salon.timezone)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Local date + wall-clock time → Unix millis.
    ///
    /// Ambiguous times (DST fall-back) take the earlier instant; times inside a
    /// DST gap are shifted forward by one hour.
    pub fn local_to_ms(&self, date: NaiveDate, time: NaiveTime) -> Ms {
        let naive = date.and_time(time);
        match naive.and_local_timezone(self.tz) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.timestamp_millis(),
            LocalResult::None => (naive + TimeDelta::hours(1))
                .and_local_timezone(self.tz)
                .earliest()
                .map(|dt| dt.timestamp_millis())
                .unwrap_or_else(|| naive.and_utc().timestamp_millis()),
        }
    }

    /// Local calendar date containing `ms`.
    pub fn date_of(&self, ms: Ms) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&self.tz).date_naive())
    }

    /// `("YYYY-MM-DD", "HH:MM")` in local time.
    pub fn format_local(&self, ms: Ms) -> Option<(String, String)> {
        DateTime::from_timestamp_millis(ms).map(|dt| {
            let local = dt.with_timezone(&self.tz);
            (
                local.format("%Y-%m-%d").to_string(),
                local.format("%H:%M").to_string(),
            )
        })
    }

    /// Local midnight to next local midnight.
    pub fn day_span(&self, date: NaiveDate) -> Span {
        let next = date.succ_opt().unwrap_or(date);
        let start = self.local_to_ms(date, NaiveTime::MIN);
        let end = self.local_to_ms(next, NaiveTime::MIN);
        Span::new(start, end.max(start + 1))
    }

    fn window(&self, date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Option<Span> {
        if close <= open {
            return None;
        }
        let start = self.local_to_ms(date, open);
        let end = self.local_to_ms(date, close);
        (start < end).then(|| Span::new(start, end))
    }

    /// The location's open hours on `date`, or `None` when it is closed.
    pub fn open_window(&self, location: &Location, date: NaiveDate) -> Option<Span> {
        let dow = day_of_week(date);
        location
            .hours
            .iter()
            .find(|h| h.day_of_week == dow)
            .filter(|h| !h.is_closed)
            .and_then(|h| self.window(date, h.open_time, h.close_time))
    }

    /// Working hours on `date` with time off removed. Empty when the staff
    /// member is inactive, off that day, or on leave for the whole window.
    pub fn staff_windows(&self, staff: &Staff, date: NaiveDate) -> Vec<Span> {
        let base = self.staff_base_windows(staff, date);
        if base.is_empty() {
            return base;
        }
        let mut off: Vec<Span> = staff.time_off.iter().filter_map(|t| t.span()).collect();
        off.sort_by_key(|s| s.start);
        subtract_intervals(&base, &merge_overlapping(&off))
    }

    fn staff_base_windows(&self, staff: &Staff, date: NaiveDate) -> Vec<Span> {
        if !staff.is_active {
            return Vec::new();
        }
        let dow = day_of_week(date);
        let mut windows: Vec<Span> = staff
            .availability
            .iter()
            .filter(|a| a.day_of_week == dow && a.is_available)
            .filter_map(|a| self.window(date, a.start_time, a.end_time))
            .collect();
        windows.sort_by_key(|s| s.start);
        merge_overlapping(&windows)
    }

    /// Location hours ∩ staff hours, minus time off.
    pub fn bookable(&self, location: &Location, staff: &Staff, date: NaiveDate) -> Option<BookableDay> {
        if !staff.works_at(location.id) {
            return None;
        }
        let open = self.open_window(location, date)?;
        let anchor = self
            .staff_base_windows(staff, date)
            .iter()
            .find_map(|w| w.intersect(&open))?
            .start;
        let windows: Vec<Span> = self
            .staff_windows(staff, date)
            .iter()
            .filter_map(|w| w.intersect(&open))
            .collect();
        if windows.is_empty() {
            return None;
        }
        Some(BookableDay { anchor, windows })
    }
}

/// 0 = Sunday … 6 = Saturday.
fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}
