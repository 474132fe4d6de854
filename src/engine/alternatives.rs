use chrono::{Days, NaiveDate};

use crate::catalog::Staff;
use crate::limits::{MAX_ALTERNATIVES, MAX_ALTERNATIVE_SCAN_DAYS};
use crate::model::Ms;
use crate::observability::ALTERNATIVES_RETURNED;

use super::availability::{booking_window, by_proximity, merge_overlapping, SlotRules, Slots};
use super::booking::BookingContext;
use super::Engine;

/// A bookable slot offered instead of the one requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub start: Ms,
    /// `YYYY-MM-DD`, salon local.
    pub date: String,
    /// `HH:MM`, salon local.
    pub time: String,
    pub staff_id: ulid::Ulid,
    pub staff_name: String,
}

impl Engine {
    /// Free slots for `staff` on `date` under the context's service and policy.
    pub(super) async fn slots_for(&self, ctx: &BookingContext, staff: &Staff, date: NaiveDate) -> Slots {
        if !ctx.salon.policy.booking_enabled {
            return Slots::empty();
        }
        let Some(day) = ctx.calendar.bookable(&ctx.location, staff, date) else {
            return Slots::empty();
        };
        let (earliest, latest) = booking_window(&ctx.salon.policy, self.now_ms());
        let rules = SlotRules {
            anchor: day.anchor,
            step: ctx.step_ms(),
            occupied: ctx.occupied_ms(),
            earliest,
            latest,
        };
        let busy = match self.existing_calendar(staff.id) {
            Some(calendar) => {
                let span = ctx.calendar.day_span(date);
                merge_overlapping(&calendar.read().await.busy_spans(&span))
            }
            None => Vec::new(),
        };
        Slots::new(day.windows, busy, rules)
    }

    /// Up to `alternatives_limit` free slots near `requested`: the same staff
    /// member that day by proximity, then other qualified staff that day by
    /// proximity, then following days in order, same staff member first.
    ///
    /// Must not be called while holding a [`super::CalendarTxn`]. Catalog
    /// failures are logged and shorten the list rather than failing the call.
    pub(super) async fn alternatives(&self, ctx: &BookingContext, requested: Ms) -> Vec<Alternative> {
        let limit = self.settings.alternatives_limit.min(MAX_ALTERNATIVES);
        let mut found = Vec::with_capacity(limit);
        if limit > 0 {
            self.collect_alternatives(ctx, requested, limit, &mut found).await;
        }
        metrics::histogram!(ALTERNATIVES_RETURNED).record(found.len() as f64);
        found
    }

    async fn collect_alternatives(&self, ctx: &BookingContext, requested: Ms, limit: usize, found: &mut Vec<Alternative>) {
        let Some(date) = ctx.calendar.date_of(requested) else {
            return;
        };

        let own = by_proximity(self.slots_for(ctx, &ctx.staff, date).await, requested);
        if push(ctx, found, own.into_iter().map(|s| (s, &ctx.staff)), limit) {
            return;
        }

        let others: Vec<Staff> = match self
            .catalog
            .staff_for_service(ctx.salon.id, ctx.service.id, ctx.location.id)
            .await
        {
            Ok(list) => list.into_iter().filter(|s| s.id != ctx.staff.id).collect(),
            Err(e) => {
                tracing::warn!(salon = %ctx.salon.id, "alternatives: staff lookup failed: {e}");
                Vec::new()
            }
        };

        // Ties keep the catalog's name order.
        let mut same_day: Vec<(Ms, usize)> = Vec::new();
        for (rank, staff) in others.iter().enumerate() {
            same_day.extend(self.slots_for(ctx, staff, date).await.map(|s| (s, rank)));
        }
        same_day.sort_by_key(|&(s, rank)| ((s - requested).abs(), s, rank));
        if push(ctx, found, same_day.into_iter().map(|(s, rank)| (s, &others[rank])), limit) {
            return;
        }

        let (_, latest) = booking_window(&ctx.salon.policy, self.now_ms());
        let horizon = ctx.salon.policy.booking_max_advance_days.min(MAX_ALTERNATIVE_SCAN_DAYS);
        let candidates: Vec<&Staff> = std::iter::once(&ctx.staff).chain(others.iter()).collect();
        for offset in 1..=u64::from(horizon) {
            let Some(day) = date.checked_add_days(Days::new(offset)) else {
                break;
            };
            if ctx.calendar.day_span(day).start > latest {
                break;
            }
            let mut slots: Vec<(Ms, usize)> = Vec::new();
            for (rank, staff) in candidates.iter().enumerate() {
                slots.extend(self.slots_for(ctx, staff, day).await.map(|s| (s, rank)));
            }
            // Same staff member first, then the rest chronologically.
            slots.sort_by_key(|&(s, rank)| (rank.min(1), s, rank));
            if push(ctx, found, slots.into_iter().map(|(s, rank)| (s, candidates[rank])), limit) {
                return;
            }
        }
    }
}

/// Append until `limit` is reached. Returns true once full.
fn push<'a>(
    ctx: &BookingContext,
    found: &mut Vec<Alternative>,
    slots: impl Iterator<Item = (Ms, &'a Staff)>,
    limit: usize,
) -> bool {
    for (start, staff) in slots {
        if found.len() >= limit {
            break;
        }
        let Some((date, time)) = ctx.calendar.format_local(start) else {
            continue;
        };
        found.push(Alternative {
            start,
            date,
            time,
            staff_id: staff.id,
            staff_name: staff.display_name(),
        });
    }
    found.len() >= limit
}
