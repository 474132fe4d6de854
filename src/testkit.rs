//! Shared fixture: one UTC salon, "now" fixed at Monday 2030-03-04 10:00.
//!
//! * Location "Main": Mon–Sat 09:00–18:00, closed Sunday.
//! * Alice: Mon–Fri 09:00–17:00. Bob: Mon–Sat 10:00–18:00. Carol: inactive.
//! * Cut: 30 min. Color: 60 min + 15 min buffer. Perm: inactive.
//! * Policy: 2 h notice, 30 days ahead, 30 min grid.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ulid::Ulid;

use crate::catalog::InMemoryCatalog;
use crate::clock::FixedClock;
use crate::engine::{BookingDraft, Engine, EngineSettings};
use crate::model::Ms;
use crate::notify::NotifyHub;

pub fn id(n: u8) -> Ulid {
    format!("01HZ00000000000000000000{n:02}").parse().unwrap()
}

pub const SLUG: &str = "studio";

pub fn salon_id() -> Ulid {
    id(1)
}
pub fn location_id() -> Ulid {
    id(2)
}
pub fn cut() -> Ulid {
    id(3)
}
pub fn color() -> Ulid {
    id(4)
}
pub fn perm() -> Ulid {
    id(5)
}
pub fn alice() -> Ulid {
    id(6)
}
pub fn bob() -> Ulid {
    id(7)
}
pub fn carol() -> Ulid {
    id(8)
}

pub const SEED: &str = r#"{
    "salons": [{
        "id": "01HZ0000000000000000000001",
        "slug": "studio",
        "name": "Studio",
        "timezone": "UTC",
        "bookingMinNoticeHours": 2,
        "bookingMaxAdvanceDays": 30,
        "bookingSlotInterval": 30
    }],
    "locations": [{
        "id": "01HZ0000000000000000000002",
        "salonId": "01HZ0000000000000000000001",
        "name": "Main",
        "hours": [
            { "dayOfWeek": 0, "openTime": "00:00", "closeTime": "00:00", "isClosed": true },
            { "dayOfWeek": 1, "openTime": "09:00", "closeTime": "18:00" },
            { "dayOfWeek": 2, "openTime": "09:00", "closeTime": "18:00" },
            { "dayOfWeek": 3, "openTime": "09:00", "closeTime": "18:00" },
            { "dayOfWeek": 4, "openTime": "09:00", "closeTime": "18:00" },
            { "dayOfWeek": 5, "openTime": "09:00", "closeTime": "18:00" },
            { "dayOfWeek": 6, "openTime": "09:00", "closeTime": "18:00" }
        ]
    }],
    "services": [
        { "id": "01HZ0000000000000000000003", "salonId": "01HZ0000000000000000000001",
          "name": "Cut", "durationMinutes": 30 },
        { "id": "01HZ0000000000000000000004", "salonId": "01HZ0000000000000000000001",
          "name": "Color", "durationMinutes": 60, "bufferMinutes": 15 },
        { "id": "01HZ0000000000000000000005", "salonId": "01HZ0000000000000000000001",
          "name": "Perm", "durationMinutes": 90, "isActive": false }
    ],
    "staff": [
        {
            "id": "01HZ0000000000000000000006",
            "salonId": "01HZ0000000000000000000001",
            "firstName": "Alice", "lastName": "Adams",
            "availability": [
                { "dayOfWeek": 1, "startTime": "09:00", "endTime": "17:00" },
                { "dayOfWeek": 2, "startTime": "09:00", "endTime": "17:00" },
                { "dayOfWeek": 3, "startTime": "09:00", "endTime": "17:00" },
                { "dayOfWeek": 4, "startTime": "09:00", "endTime": "17:00" },
                { "dayOfWeek": 5, "startTime": "09:00", "endTime": "17:00" }
            ],
            "locations": ["01HZ0000000000000000000002"],
            "services": [
                { "serviceId": "01HZ0000000000000000000003" },
                { "serviceId": "01HZ0000000000000000000004" },
                { "serviceId": "01HZ0000000000000000000005" }
            ]
        },
        {
            "id": "01HZ0000000000000000000007",
            "salonId": "01HZ0000000000000000000001",
            "firstName": "Bob", "lastName": "Brown",
            "availability": [
                { "dayOfWeek": 1, "startTime": "10:00", "endTime": "18:00" },
                { "dayOfWeek": 2, "startTime": "10:00", "endTime": "18:00" },
                { "dayOfWeek": 3, "startTime": "10:00", "endTime": "18:00" },
                { "dayOfWeek": 4, "startTime": "10:00", "endTime": "18:00" },
                { "dayOfWeek": 5, "startTime": "10:00", "endTime": "18:00" },
                { "dayOfWeek": 6, "startTime": "10:00", "endTime": "18:00" }
            ],
            "locations": ["01HZ0000000000000000000002"],
            "services": [
                { "serviceId": "01HZ0000000000000000000003" },
                { "serviceId": "01HZ0000000000000000000004" }
            ]
        },
        {
            "id": "01HZ0000000000000000000008",
            "salonId": "01HZ0000000000000000000001",
            "firstName": "Carol", "lastName": "Clark",
            "isActive": false,
            "availability": [
                { "dayOfWeek": 2, "startTime": "09:00", "endTime": "17:00" }
            ],
            "locations": ["01HZ0000000000000000000002"],
            "services": [{ "serviceId": "01HZ0000000000000000000003" }]
        }
    ]
}"#;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 4, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Ms {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp_millis()
}

/// Tuesday 2030-03-05 at `h:min` UTC.
pub fn tomorrow(h: u32, min: u32) -> Ms {
    at(2030, 3, 5, h, min)
}

pub fn iso(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms).unwrap().to_rfc3339()
}

pub fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(InMemoryCatalog::from_json(SEED).unwrap())
}

pub fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("salonbook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}.wal"));
    let _ = std::fs::remove_file(&path);
    path
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub clock: Arc<FixedClock>,
    pub catalog: Arc<InMemoryCatalog>,
    pub path: PathBuf,
}

impl Harness {
    pub fn new(name: &str) -> Self {
        Self::with_settings(name, EngineSettings::default())
    }

    pub fn with_settings(name: &str, settings: EngineSettings) -> Self {
        Self::build(name, SEED, settings)
    }

    pub fn with_seed(name: &str, seed: &str) -> Self {
        Self::build(name, seed, EngineSettings::default())
    }

    fn build(name: &str, seed: &str, settings: EngineSettings) -> Self {
        let path = wal_path(name);
        let clock = Arc::new(FixedClock::new(now()));
        let catalog = Arc::new(InMemoryCatalog::from_json(seed).unwrap());
        let engine = Arc::new(
            Engine::new(
                salon_id(),
                path.clone(),
                catalog.clone(),
                Arc::new(NotifyHub::new()),
                clock.clone(),
                settings,
            )
            .unwrap(),
        );
        Self {
            engine,
            clock,
            catalog,
            path,
        }
    }

    /// A second engine over the same WAL and clock, as after a restart.
    pub fn reopen(&self) -> Arc<Engine> {
        Arc::new(
            Engine::new(
                salon_id(),
                self.path.clone(),
                self.catalog.clone(),
                Arc::new(NotifyHub::new()),
                self.clock.clone(),
                EngineSettings::default(),
            )
            .unwrap(),
        )
    }
}

pub fn draft(staff: Ulid, service: Ulid, start: Ms) -> BookingDraft {
    BookingDraft {
        service_id: Some(service.to_string()),
        staff_id: Some(staff.to_string()),
        location_id: Some(location_id().to_string()),
        start_time: Some(iso(start)),
        first_name: Some("Jo".into()),
        last_name: Some("Park".into()),
        email: Some("jo@example.com".into()),
        notes: None,
    }
}
