use crate::catalog::BookingPolicy;
use crate::limits::{DAY_MS, HOUR_MS};
use crate::model::*;

/// Earliest and latest bookable start for `now`; both bounds are inclusive.
pub fn booking_window(policy: &BookingPolicy, now: Ms) -> (Ms, Ms) {
    (
        now + Ms::from(policy.booking_min_notice_hours) * HOUR_MS,
        now + Ms::from(policy.booking_max_advance_days) * DAY_MS,
    )
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted and disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Span::new(current_start, b.end));
        }
    }

    result
}

/// Round `t` up onto the grid `anchor + k * step`.
fn align_up(t: Ms, anchor: Ms, step: Ms) -> Ms {
    let off = (t - anchor).rem_euclid(step);
    if off == 0 { t } else { t + (step - off) }
}

/// Grid and booking-window parameters for one slot walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRules {
    pub anchor: Ms,
    /// Grid step, > 0.
    pub step: Ms,
    /// Service duration plus buffer, > 0.
    pub occupied: Ms,
    pub earliest: Ms,
    pub latest: Ms,
}

/// Candidate start times for one staff member on one day, in chronological order.
///
/// Lazy: each `next` walks the grid only as far as the next free start.
/// Restartable: clone it, or call [`Slots::rewind`].
#[derive(Debug, Clone)]
pub struct Slots {
    windows: Vec<Span>,
    /// Merged occupied spans of existing appointments.
    busy: Vec<Span>,
    rules: SlotRules,
    window_idx: usize,
    cursor: Ms,
}

impl Slots {
    pub fn new(windows: Vec<Span>, busy: Vec<Span>, rules: SlotRules) -> Self {
        debug_assert!(rules.step > 0 && rules.occupied > 0);
        Self {
            windows,
            busy,
            rules,
            window_idx: 0,
            cursor: Ms::MIN,
        }
    }

    pub fn empty() -> Self {
        Self::new(
            Vec::new(),
            Vec::new(),
            SlotRules {
                anchor: 0,
                step: 1,
                occupied: 1,
                earliest: 0,
                latest: 0,
            },
        )
    }

    pub fn rewind(&mut self) {
        self.window_idx = 0;
        self.cursor = Ms::MIN;
    }

    fn is_busy(&self, candidate: &Span) -> bool {
        let idx = self.busy.partition_point(|b| b.end <= candidate.start);
        self.busy.get(idx).is_some_and(|b| b.start < candidate.end)
    }
}

impl Iterator for Slots {
    type Item = Ms;

    fn next(&mut self) -> Option<Ms> {
        while let Some(window) = self.windows.get(self.window_idx).copied() {
            let from = window.start.max(self.cursor).max(self.rules.earliest);
            let start = align_up(from, self.rules.anchor, self.rules.step);
            if start > self.rules.latest {
                self.window_idx = self.windows.len();
                return None;
            }
            let candidate = Span::new(start, start + self.rules.occupied);
            if candidate.end > window.end {
                self.window_idx += 1;
                continue;
            }
            self.cursor = start + self.rules.step;
            if !self.is_busy(&candidate) {
                return Some(start);
            }
        }
        None
    }
}

/// Order slots by distance from `target`, earlier first on ties, so the
/// nearest slots before and after the target interleave.
pub fn by_proximity(slots: impl IntoIterator<Item = Ms>, target: Ms) -> Vec<Ms> {
    let mut sorted: Vec<Ms> = slots.into_iter().collect();
    sorted.sort_by_key(|s| ((s - target).abs(), *s));
    sorted
}
