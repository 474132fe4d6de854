use std::time::Duration;

use crate::model::*;
use crate::notify::ChangeKind;
use crate::testkit::*;

use super::*;

fn booked(outcome: BookingOutcome) -> Appointment {
    match outcome {
        BookingOutcome::Booked(a) => a,
        other => panic!("expected Booked, got {other:?}"),
    }
}

fn conflict_alternatives(outcome: BookingOutcome) -> Vec<Alternative> {
    match outcome {
        BookingOutcome::Conflict { alternatives } => alternatives,
        other => panic!("expected Conflict, got {other:?}"),
    }
}

fn unavailable(outcome: BookingOutcome) -> (UnavailableReason, Vec<Alternative>) {
    match outcome {
        BookingOutcome::Unavailable { reason, alternatives } => (reason, alternatives),
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

async fn book_ok(engine: &Engine, staff: ulid::Ulid, service: ulid::Ulid, start: Ms) -> Appointment {
    booked(engine.book(draft(staff, service, start)).await.unwrap())
}

/// Book every Cut slot a staff member has on Tuesday.
async fn fill_tuesday(engine: &Engine, staff: ulid::Ulid) -> usize {
    let slots: Vec<Ms> = engine
        .available_slots(&SlotQuery {
            staff_id: staff,
            service_id: cut(),
            location_id: None,
            date: date(2030, 3, 5),
        })
        .await
        .unwrap()
        .slots
        .collect();
    for &start in &slots {
        book_ok(engine, staff, cut(), start).await;
    }
    slots.len()
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn book_creates_confirmed_appointment() {
    let h = Harness::new("book_creates");
    let a = book_ok(&h.engine, alice(), color(), tomorrow(10, 0)).await;

    assert_eq!(a.status, AppointmentStatus::Confirmed);
    assert_eq!(a.salon_id, salon_id());
    assert_eq!(a.staff_id, alice());
    assert_eq!(a.location_id, location_id());
    assert_eq!(a.span, Span::new(tomorrow(10, 0), tomorrow(11, 0)));
    assert_eq!(a.buffer_ms, 15 * 60_000);
    assert_eq!(a.occupied(), Span::new(tomorrow(10, 0), tomorrow(11, 15)));
    assert_eq!(a.client.email, "jo@example.com");
    assert_eq!(a.created_at, now().timestamp_millis());

    assert_eq!(h.engine.get(a.id).await.unwrap(), a);
}

#[tokio::test]
async fn repeat_client_resolves_to_same_record() {
    let h = Harness::new("repeat_client");
    let first = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    let mut d = draft(bob(), cut(), tomorrow(10, 0));
    d.email = Some("  JO@example.com ".into());
    let second = booked(h.engine.book(d).await.unwrap());
    assert_eq!(first.client_id, second.client_id);
}

#[tokio::test]
async fn missing_fields_are_all_reported() {
    let h = Harness::new("missing_fields");
    let outcome = h.engine.book(BookingDraft::default()).await.unwrap();
    assert_eq!(
        outcome,
        BookingOutcome::Invalid(InvalidReason::MissingFields(vec![
            "serviceId",
            "staffId",
            "startTime",
            "firstName",
            "lastName",
            "email"
        ]))
    );

    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.first_name = Some("   ".into());
    d.email = None;
    assert_eq!(
        h.engine.book(d).await.unwrap(),
        BookingOutcome::Invalid(InvalidReason::MissingFields(vec!["firstName", "email"]))
    );
}

#[tokio::test]
async fn malformed_fields_are_rejected() {
    let h = Harness::new("malformed_fields");
    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.start_time = Some("next tuesday".into());
    assert!(matches!(
        h.engine.book(d).await.unwrap(),
        BookingOutcome::Invalid(InvalidReason::MalformedField { field: "startTime", .. })
    ));

    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.email = Some("not-an-email".into());
    assert!(matches!(
        h.engine.book(d).await.unwrap(),
        BookingOutcome::Invalid(InvalidReason::MalformedField { field: "email", .. })
    ));
}

#[tokio::test]
async fn naive_start_time_is_salon_local() {
    let h = Harness::new("naive_start");
    let mut d = draft(alice(), cut(), 0);
    d.start_time = Some("2030-03-05T10:00".into());
    let a = booked(h.engine.book(d).await.unwrap());
    assert_eq!(a.span.start, tomorrow(10, 0));
}

#[tokio::test]
async fn invalid_service_variants() {
    let h = Harness::new("invalid_service");
    for service in [perm(), ulid::Ulid::new()] {
        assert_eq!(
            h.engine.book(draft(alice(), service, tomorrow(10, 0))).await.unwrap(),
            BookingOutcome::Invalid(InvalidReason::InvalidService)
        );
    }
    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.service_id = Some("garbage".into());
    assert_eq!(
        h.engine.book(d).await.unwrap(),
        BookingOutcome::Invalid(InvalidReason::InvalidService)
    );
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let h = Harness::new("not_found");
    assert_eq!(
        h.engine.book(draft(ulid::Ulid::new(), cut(), tomorrow(10, 0))).await.unwrap(),
        BookingOutcome::NotFound(NotFoundKind::Staff)
    );
    // Inactive staff are not bookable.
    assert_eq!(
        h.engine.book(draft(carol(), cut(), tomorrow(10, 0))).await.unwrap(),
        BookingOutcome::NotFound(NotFoundKind::Staff)
    );
    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.location_id = Some(ulid::Ulid::new().to_string());
    assert_eq!(
        h.engine.book(d).await.unwrap(),
        BookingOutcome::NotFound(NotFoundKind::Location)
    );
}

#[tokio::test]
async fn omitted_location_uses_staff_location() {
    let h = Harness::new("omitted_location");
    let mut d = draft(alice(), cut(), tomorrow(10, 0));
    d.location_id = None;
    let a = booked(h.engine.book(d).await.unwrap());
    assert_eq!(a.location_id, location_id());
}

// ── Conflicts ────────────────────────────────────────────

#[tokio::test]
async fn second_booking_conflicts_with_nearest_alternatives() {
    let h = Harness::new("second_conflicts");
    book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;

    let alts = conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    let starts: Vec<Ms> = alts.iter().map(|a| a.start).collect();
    assert_eq!(
        starts,
        vec![
            tomorrow(9, 30),
            tomorrow(10, 30),
            tomorrow(9, 0),
            tomorrow(11, 0),
            tomorrow(11, 30)
        ]
    );
    let first = &alts[0];
    assert_eq!(first.date, "2030-03-05");
    assert_eq!(first.time, "09:30");
    assert_eq!(first.staff_id, alice());
    assert_eq!(first.staff_name, "Alice Adams");
}

#[tokio::test]
async fn partial_overlap_and_buffer_conflict() {
    let h = Harness::new("partial_overlap");
    // Color occupies 10:00–11:15 including buffer.
    book_ok(&h.engine, alice(), color(), tomorrow(10, 0)).await;

    for start in [tomorrow(10, 30), tomorrow(11, 0)] {
        conflict_alternatives(h.engine.book(draft(alice(), cut(), start)).await.unwrap());
    }
    // Back-to-back before, and after the buffer.
    book_ok(&h.engine, alice(), cut(), tomorrow(9, 30)).await;
    book_ok(&h.engine, alice(), cut(), tomorrow(11, 30)).await;
}

#[tokio::test]
async fn new_booking_buffer_cannot_overrun_next_appointment() {
    let h = Harness::new("buffer_overrun");
    book_ok(&h.engine, alice(), cut(), tomorrow(11, 0)).await;
    // Color at 10:00 would occupy until 11:15.
    conflict_alternatives(h.engine.book(draft(alice(), color(), tomorrow(10, 0))).await.unwrap());
    book_ok(&h.engine, alice(), color(), tomorrow(9, 0)).await;
}

#[tokio::test]
async fn other_staff_offered_when_requested_staff_is_full() {
    let h = Harness::new("other_staff_alts");
    assert_eq!(fill_tuesday(&h.engine, alice()).await, 16);

    let alts = conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    assert_eq!(alts.len(), 5);
    assert!(alts.iter().all(|a| a.staff_id == bob() && a.staff_name == "Bob Brown"));
    assert_eq!(alts[0].start, tomorrow(10, 0));
    assert_eq!(alts[1].start, tomorrow(10, 30));
}

#[tokio::test]
async fn later_days_offered_when_everyone_is_full() {
    let h = Harness::new("later_day_alts");
    fill_tuesday(&h.engine, alice()).await;
    fill_tuesday(&h.engine, bob()).await;

    let alts = conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    assert_eq!(alts.len(), 5);
    // Wednesday, same staff member first, in time order.
    assert!(alts.iter().all(|a| a.date == "2030-03-06" && a.staff_id == alice()));
    assert_eq!(alts[0].time, "09:00");
    assert_eq!(alts[1].time, "09:30");
}

#[tokio::test]
async fn nearest_alternative_is_bookable() {
    let h = Harness::new("alts_bookable");
    book_ok(&h.engine, alice(), color(), tomorrow(10, 0)).await;
    let alts = conflict_alternatives(h.engine.book(draft(alice(), color(), tomorrow(10, 0))).await.unwrap());
    // 09:00 and 09:30 would run into the 10:00 booking.
    assert_eq!(alts[0].start, tomorrow(11, 30));
    book_ok(&h.engine, alts[0].staff_id, color(), alts[0].start).await;
}

#[tokio::test]
async fn alternatives_limit_is_respected() {
    let settings = EngineSettings {
        alternatives_limit: 2,
        ..EngineSettings::default()
    };
    let h = Harness::with_settings("alts_limit", settings);
    book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    let alts = conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    assert_eq!(alts.len(), 2);
}

#[tokio::test]
async fn cancellation_frees_the_slot() {
    let h = Harness::new("cancel_frees");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    h.engine.transition(a.id, AppointmentStatus::Cancelled).await.unwrap();
    let again = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    assert_ne!(again.id, a.id);
}

#[tokio::test]
async fn completed_and_no_show_keep_blocking() {
    let h = Harness::new("sinks_block");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    h.engine.transition(a.id, AppointmentStatus::NoShow).await.unwrap();
    conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_slot_has_exactly_one_winner() {
    let h = Harness::new("one_winner");
    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            let mut d = draft(alice(), cut(), tomorrow(10, 0));
            d.email = Some(format!("client{i}@example.com"));
            engine.book(d).await.unwrap()
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            BookingOutcome::Booked(_) => winners += 1,
            BookingOutcome::Conflict { alternatives } => {
                losers += 1;
                assert!(!alternatives.is_empty());
                assert!(alternatives
                    .iter()
                    .all(|a| !(a.staff_id == alice() && a.start == tomorrow(10, 0))));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!((winners, losers), (1, 19));

    let listed = h
        .engine
        .list(&AppointmentFilter {
            staff_id: Some(alice()),
            ..AppointmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_starts_never_double_book() {
    let h = Harness::new("overlap_race");
    let starts = [tomorrow(10, 0), tomorrow(10, 30), tomorrow(11, 0)];
    let mut handles = Vec::new();
    for round in 0..5 {
        for &start in &starts {
            let engine = h.engine.clone();
            // Color spans 75 minutes, so every pair here overlaps.
            handles.push(tokio::spawn(async move {
                let mut d = draft(alice(), color(), start);
                d.email = Some(format!("r{round}-{start}@example.com"));
                engine.book(d).await.unwrap()
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let booked = h
        .engine
        .list(&AppointmentFilter {
            staff_id: Some(alice()),
            ..AppointmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(booked.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_staff_book_in_parallel() {
    let h = Harness::new("parallel_staff");
    let a = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap() })
    };
    let b = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.book(draft(bob(), cut(), tomorrow(10, 0))).await.unwrap() })
    };
    booked(a.await.unwrap());
    booked(b.await.unwrap());
}

#[tokio::test]
async fn held_calendar_times_out() {
    let settings = EngineSettings {
        txn_timeout: Duration::from_millis(30),
        txn_max_retries: 1,
        ..EngineSettings::default()
    };
    let h = Harness::with_settings("lock_timeout", settings);
    let txn = h.engine.begin(&[alice()]).await.unwrap();

    let err = h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout));
    assert!(err.is_retryable());

    drop(txn);
    book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
}

// ── Booking window and hours ─────────────────────────────

#[tokio::test]
async fn minimum_notice_boundary() {
    let h = Harness::new("min_notice");
    // now + 2h = 12:00 today
    book_ok(&h.engine, alice(), cut(), at(2030, 3, 4, 12, 0)).await;

    let (reason, _) = unavailable(h.engine.book(draft(bob(), cut(), at(2030, 3, 4, 11, 59))).await.unwrap());
    assert_eq!(
        reason,
        UnavailableReason::TooSoon {
            earliest: at(2030, 3, 4, 12, 0)
        }
    );
}

#[tokio::test]
async fn too_soon_offers_later_same_day_slots() {
    let h = Harness::new("too_soon_alts");
    let (_, alts) = unavailable(h.engine.book(draft(alice(), cut(), at(2030, 3, 4, 11, 0))).await.unwrap());
    assert!(!alts.is_empty());
    assert!(alts.iter().all(|a| a.start >= at(2030, 3, 4, 12, 0)));
    assert_eq!(alts[0].start, at(2030, 3, 4, 12, 0));
}

#[tokio::test]
async fn maximum_advance_boundary() {
    let h = Harness::new("max_advance");
    // now + 30 days = Wednesday 2030-04-03 10:00
    let last_day = SlotQuery {
        staff_id: alice(),
        service_id: cut(),
        location_id: Some(location_id()),
        date: date(2030, 4, 3),
    };
    let offered: Vec<Ms> = h.engine.available_slots(&last_day).await.unwrap().slots.collect();
    assert_eq!(offered, vec![at(2030, 4, 3, 9, 0), at(2030, 4, 3, 9, 30), at(2030, 4, 3, 10, 0)]);

    let (reason, _) = unavailable(h.engine.book(draft(alice(), cut(), at(2030, 4, 3, 10, 1))).await.unwrap());
    assert!(matches!(reason, UnavailableReason::TooFarAhead { .. }));

    book_ok(&h.engine, alice(), cut(), at(2030, 4, 3, 10, 0)).await;

    let (reason, alts) = unavailable(h.engine.book(draft(alice(), cut(), at(2030, 4, 4, 10, 0))).await.unwrap());
    assert!(matches!(reason, UnavailableReason::TooFarAhead { .. }));
    assert!(alts.is_empty());
}

#[tokio::test]
async fn outside_working_hours_is_unavailable() {
    let h = Harness::new("outside_hours");
    for start in [tomorrow(17, 0), tomorrow(16, 45), tomorrow(8, 30)] {
        let (reason, _) = unavailable(h.engine.book(draft(alice(), cut(), start)).await.unwrap());
        assert_eq!(reason, UnavailableReason::OutsideHours);
    }
    // Sunday: location closed.
    let (reason, alts) = unavailable(h.engine.book(draft(bob(), cut(), at(2030, 3, 10, 11, 0))).await.unwrap());
    assert_eq!(reason, UnavailableReason::OutsideHours);
    // Monday is the next open day.
    assert_eq!(alts[0].date, "2030-03-11");
}

#[tokio::test]
async fn booking_disabled_rejects_without_alternatives() {
    let seed = SEED.replace("\"bookingSlotInterval\": 30", "\"bookingSlotInterval\": 30, \"bookingEnabled\": false");
    let h = Harness::with_seed("booking_disabled", &seed);
    let (reason, alts) = unavailable(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    assert_eq!(reason, UnavailableReason::BookingDisabled);
    assert!(alts.is_empty());
}

// ── Availability ─────────────────────────────────────────

fn tuesday(staff: ulid::Ulid, service: ulid::Ulid) -> SlotQuery {
    SlotQuery {
        staff_id: staff,
        service_id: service,
        location_id: Some(location_id()),
        date: date(2030, 3, 5),
    }
}

#[tokio::test]
async fn slots_follow_working_hours_and_duration() {
    let h = Harness::new("slots_hours");
    let cut_slots: Vec<Ms> = h.engine.available_slots(&tuesday(alice(), cut())).await.unwrap().slots.collect();
    assert_eq!(cut_slots.len(), 16);
    assert_eq!(cut_slots[0], tomorrow(9, 0));
    assert_eq!(*cut_slots.last().unwrap(), tomorrow(16, 30));

    // 75 minutes occupied: the last start that fits is 15:30.
    let color_slots: Vec<Ms> = h.engine.available_slots(&tuesday(alice(), color())).await.unwrap().slots.collect();
    assert_eq!(color_slots.len(), 14);
    assert_eq!(*color_slots.last().unwrap(), tomorrow(15, 30));

    // Bob starts at 10:00.
    let bob_slots: Vec<Ms> = h.engine.available_slots(&tuesday(bob(), cut())).await.unwrap().slots.collect();
    assert_eq!(bob_slots[0], tomorrow(10, 0));
}

#[tokio::test]
async fn slots_respect_notice_and_closures() {
    let h = Harness::new("slots_notice");
    let today = SlotQuery {
        date: date(2030, 3, 4),
        ..tuesday(alice(), cut())
    };
    let slots: Vec<Ms> = h.engine.available_slots(&today).await.unwrap().slots.collect();
    assert_eq!(slots.first(), Some(&at(2030, 3, 4, 12, 0)));
    assert_eq!(slots.len(), 10);

    let sunday = SlotQuery {
        date: date(2030, 3, 10),
        ..tuesday(bob(), cut())
    };
    assert_eq!(h.engine.available_slots(&sunday).await.unwrap().slots.count(), 0);

    let beyond = SlotQuery {
        date: date(2030, 4, 10),
        ..tuesday(alice(), cut())
    };
    assert_eq!(h.engine.available_slots(&beyond).await.unwrap().slots.count(), 0);
}

#[tokio::test]
async fn slots_exclude_booked_time_and_are_stable() {
    let h = Harness::new("slots_booked");
    book_ok(&h.engine, alice(), color(), tomorrow(10, 0)).await;

    let first: Vec<Ms> = h.engine.available_slots(&tuesday(alice(), cut())).await.unwrap().slots.collect();
    let second: Vec<Ms> = h.engine.available_slots(&tuesday(alice(), cut())).await.unwrap().slots.collect();
    assert_eq!(first, second);
    // 10:00, 10:30 and 11:00 are covered by service plus buffer.
    assert_eq!(first.len(), 13);
    assert!(first.contains(&tomorrow(9, 30)));
    assert!(!first.contains(&tomorrow(11, 0)));
    assert!(first.contains(&tomorrow(11, 30)));
}

#[tokio::test]
async fn slot_query_errors() {
    let h = Harness::new("slot_errors");
    assert!(matches!(
        h.engine.available_slots(&tuesday(alice(), perm())).await,
        Err(EngineError::InvalidService)
    ));
    assert!(matches!(
        h.engine.available_slots(&tuesday(ulid::Ulid::new(), cut())).await,
        Err(EngineError::NotFound(NotFoundKind::Staff))
    ));
}

// ── Lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn status_transitions_only_leave_confirmed() {
    let h = Harness::new("transitions");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    let done = h.engine.transition(a.id, AppointmentStatus::Completed).await.unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    let err = h.engine.transition(a.id, AppointmentStatus::Cancelled).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled,
            ..
        }
    ));
    assert!(matches!(
        h.engine.transition(ulid::Ulid::new(), AppointmentStatus::Cancelled).await,
        Err(EngineError::NotFound(NotFoundKind::Appointment))
    ));
}

fn move_to(start: Ms) -> RescheduleDraft {
    RescheduleDraft {
        start_time: Some(iso(start)),
        ..RescheduleDraft::default()
    }
}

#[tokio::test]
async fn reschedule_within_own_time_excludes_original() {
    let h = Harness::new("reschedule_self");
    let original = book_ok(&h.engine, alice(), color(), tomorrow(10, 0)).await;

    let moved = booked(h.engine.reschedule(original.id, move_to(tomorrow(10, 30))).await.unwrap());
    assert_ne!(moved.id, original.id);
    assert_eq!(moved.span.start, tomorrow(10, 30));
    assert_eq!(moved.client_id, original.client_id);
    assert_eq!(
        h.engine.get(original.id).await.unwrap().status,
        AppointmentStatus::Cancelled
    );
    // The freed 10:00 slot is too short for Color now, but fine for a Cut.
    book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
}

#[tokio::test]
async fn reschedule_to_other_staff() {
    let h = Harness::new("reschedule_other");
    let original = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    let draft = RescheduleDraft {
        staff_id: Some(bob().to_string()),
        ..move_to(tomorrow(14, 0))
    };
    let moved = booked(h.engine.reschedule(original.id, draft).await.unwrap());
    assert_eq!(moved.staff_id, bob());
    assert_eq!(
        h.engine.get(original.id).await.unwrap().status,
        AppointmentStatus::Cancelled
    );
    book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
}

#[tokio::test]
async fn reschedule_into_conflict_keeps_original() {
    let h = Harness::new("reschedule_conflict");
    let original = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    book_ok(&h.engine, alice(), cut(), tomorrow(14, 0)).await;

    conflict_alternatives(h.engine.reschedule(original.id, move_to(tomorrow(14, 0))).await.unwrap());
    assert_eq!(
        h.engine.get(original.id).await.unwrap().status,
        AppointmentStatus::Confirmed
    );
}

#[tokio::test]
async fn reschedule_requires_confirmed_and_start() {
    let h = Harness::new("reschedule_guards");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;

    assert_eq!(
        h.engine.reschedule(a.id, RescheduleDraft::default()).await.unwrap(),
        BookingOutcome::Invalid(InvalidReason::MissingFields(vec!["startTime"]))
    );
    assert_eq!(
        h.engine.reschedule(ulid::Ulid::new(), move_to(tomorrow(11, 0))).await.unwrap(),
        BookingOutcome::NotFound(NotFoundKind::Appointment)
    );

    h.engine.transition(a.id, AppointmentStatus::Cancelled).await.unwrap();
    assert!(matches!(
        h.engine.reschedule(a.id, move_to(tomorrow(11, 0))).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn list_filters_by_staff_date_and_status() {
    let h = Harness::new("list_filters");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    book_ok(&h.engine, bob(), cut(), tomorrow(10, 0)).await;
    book_ok(&h.engine, alice(), cut(), at(2030, 3, 6, 10, 0)).await;
    h.engine.transition(a.id, AppointmentStatus::Cancelled).await.unwrap();

    let all = h.engine.list(&AppointmentFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].span.start <= w[1].span.start));

    let tuesday = h
        .engine
        .list(&AppointmentFilter {
            date: Some(date(2030, 3, 5)),
            ..AppointmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(tuesday.len(), 2);

    let confirmed_alice = h
        .engine
        .list(&AppointmentFilter {
            staff_id: Some(alice()),
            status: Some(AppointmentStatus::Confirmed),
            ..AppointmentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(confirmed_alice.len(), 1);
    assert_eq!(confirmed_alice[0].span.start, at(2030, 3, 6, 10, 0));
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn wal_replay_restores_calendars() {
    let h = Harness::new("replay");
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    let b = book_ok(&h.engine, alice(), color(), tomorrow(13, 0)).await;
    h.engine.transition(a.id, AppointmentStatus::Cancelled).await.unwrap();
    let c = booked(h.engine.reschedule(b.id, move_to(tomorrow(15, 0))).await.unwrap());

    let before = h.engine.list(&AppointmentFilter::default()).await.unwrap();
    let reopened = h.reopen();
    let after = reopened.list(&AppointmentFilter::default()).await.unwrap();
    assert_eq!(before, after);

    // The replayed calendar still enforces conflicts and lookups.
    assert_eq!(reopened.get(c.id).await.unwrap().staff_id, alice());
    conflict_alternatives(reopened.book(draft(alice(), cut(), tomorrow(15, 0))).await.unwrap());
    book_ok(&reopened, alice(), cut(), tomorrow(10, 0)).await;
}

#[tokio::test]
async fn torn_tail_does_not_swallow_later_bookings() {
    use std::io::Write;

    let h = Harness::new("torn_tail_restart");
    let first = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&h.path).unwrap();
        f.write_all(&[7u8; 6]).unwrap();
    }

    let restarted = h.reopen();
    let second = book_ok(&restarted, alice(), cut(), tomorrow(11, 0)).await;

    let again = h.reopen();
    assert_eq!(again.get(first.id).await.unwrap(), first);
    assert_eq!(again.get(second.id).await.unwrap(), second);
    conflict_alternatives(again.book(draft(alice(), cut(), tomorrow(11, 0))).await.unwrap());
}

#[tokio::test]
async fn compaction_preserves_state() {
    let h = Harness::new("compaction");
    let mut ids = Vec::new();
    for hour in 9..14 {
        ids.push(book_ok(&h.engine, alice(), cut(), tomorrow(hour, 0)).await.id);
    }
    h.engine.transition(ids[0], AppointmentStatus::Cancelled).await.unwrap();
    h.engine.transition(ids[1], AppointmentStatus::Completed).await.unwrap();
    assert_eq!(h.engine.wal_appends_since_compact().await, 7);

    let before = h.engine.list(&AppointmentFilter::default()).await.unwrap();
    h.engine.compact_wal().await.unwrap();
    assert_eq!(h.engine.wal_appends_since_compact().await, 0);
    assert_eq!(crate::wal::Wal::replay(&h.path).unwrap().len(), 5);

    // Appends after compaction land in the new log.
    book_ok(&h.engine, bob(), cut(), tomorrow(10, 0)).await;
    let reopened = h.reopen();
    let after = reopened.list(&AppointmentFilter::default()).await.unwrap();
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(
        reopened.get(ids[1]).await.unwrap().status,
        AppointmentStatus::Completed
    );
}

#[tokio::test]
async fn subscribers_see_committed_events() {
    let h = Harness::new("notify");
    let mut rx = h.engine.notify.subscribe(alice());
    let a = book_ok(&h.engine, alice(), cut(), tomorrow(10, 0)).await;

    let change = rx.recv().await.unwrap();
    assert_eq!(change.kind, ChangeKind::Booked);
    assert_eq!(change.appointment_id, a.id);
    assert_eq!(change.span, Some(a.span));

    // Rejected bookings publish nothing.
    conflict_alternatives(h.engine.book(draft(alice(), cut(), tomorrow(10, 0))).await.unwrap());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn clock_drives_the_booking_window() {
    let h = Harness::new("clock_window");
    let start = at(2030, 3, 4, 11, 0);
    unavailable(h.engine.book(draft(alice(), cut(), start)).await.unwrap());
    h.clock.set(now() - chrono::TimeDelta::hours(1));
    book_ok(&h.engine, alice(), cut(), start).await;
}

#[test]
fn booking_outcome_labels() {
    assert_eq!(BookingOutcome::Conflict { alternatives: vec![] }.label(), "time_conflict");
    assert_eq!(
        BookingOutcome::Invalid(InvalidReason::InvalidService).label(),
        "invalid_service"
    );
    assert_eq!(BookingOutcome::NotFound(NotFoundKind::Staff).label(), "not_found");
}
