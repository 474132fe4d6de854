//! Salon, location, staff and service records.
//!
//! These are owned by the surrounding CRUD application; the booking engine
//! only reads them through [`CatalogRepository`]. [`InMemoryCatalog`] serves a
//! JSON seed file, which is enough for a standalone deployment and for tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{ClientInfo, Span};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("invalid catalog seed: {0}")]
    InvalidSeed(String),
}

/// Salon-wide booking rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPolicy {
    #[serde(default = "default_true")]
    pub booking_enabled: bool,
    #[serde(default)]
    pub booking_min_notice_hours: u32,
    #[serde(default = "default_max_advance_days")]
    pub booking_max_advance_days: u32,
    #[serde(default = "default_slot_interval")]
    pub booking_slot_interval: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_advance_days() -> u32 {
    60
}

fn default_slot_interval() -> u32 {
    30
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            booking_enabled: true,
            booking_min_notice_hours: 0,
            booking_max_advance_days: default_max_advance_days(),
            booking_slot_interval: default_slot_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Salon {
    pub id: Ulid,
    pub slug: String,
    pub name: String,
    pub timezone: Tz,
    #[serde(flatten)]
    pub policy: BookingPolicy,
}

/// `HH:MM` wall-clock times, seconds optional.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

/// One row per day of week; `day_of_week` is 0 = Sunday … 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationHours {
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub open_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub close_time: NaiveTime,
    #[serde(default)]
    pub is_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Ulid,
    pub salon_id: Ulid,
    pub name: String,
    #[serde(default)]
    pub hours: Vec<LocationHours>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffAvailability {
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffService {
    pub service_id: Ulid,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeOff {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeOff {
    pub fn span(&self) -> Option<Span> {
        let (start, end) = (self.start.timestamp_millis(), self.end.timestamp_millis());
        (start < end).then(|| Span::new(start, end))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: Ulid,
    pub salon_id: Ulid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub availability: Vec<StaffAvailability>,
    #[serde(default)]
    pub locations: Vec<Ulid>,
    #[serde(default)]
    pub services: Vec<StaffService>,
    #[serde(default)]
    pub time_off: Vec<TimeOff>,
}

impl Staff {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn performs(&self, service_id: Ulid) -> bool {
        self.services
            .iter()
            .any(|s| s.service_id == service_id && s.is_available)
    }

    pub fn works_at(&self, location_id: Ulid) -> bool {
        self.locations.contains(&location_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Ulid,
    pub salon_id: Ulid,
    pub name: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub buffer_minutes: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Read port onto the collaborator records. Every lookup is salon-scoped so a
/// record from another tenant never resolves.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn salon_by_slug(&self, slug: &str) -> Result<Option<Salon>, CatalogError>;
    async fn salon(&self, id: Ulid) -> Result<Option<Salon>, CatalogError>;
    async fn location(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Location>, CatalogError>;
    async fn staff(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Staff>, CatalogError>;
    async fn service(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Service>, CatalogError>;

    /// Active staff who perform `service_id` at `location_id`, ordered by name.
    async fn staff_for_service(
        &self,
        salon_id: Ulid,
        service_id: Ulid,
        location_id: Ulid,
    ) -> Result<Vec<Staff>, CatalogError>;

    /// Find-or-create the client record keyed by email.
    async fn resolve_client(&self, salon_id: Ulid, client: &ClientInfo) -> Result<Ulid, CatalogError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub salons: Vec<Salon>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub staff: Vec<Staff>,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    salons: HashMap<Ulid, Salon>,
    slugs: HashMap<String, Ulid>,
    locations: HashMap<Ulid, Location>,
    staff: HashMap<Ulid, Staff>,
    services: HashMap<Ulid, Service>,
    clients: DashMap<(Ulid, String), Ulid>,
}

impl InMemoryCatalog {
    pub fn from_seed(seed: CatalogSeed) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for salon in seed.salons {
            if catalog.slugs.insert(salon.slug.clone(), salon.id).is_some() {
                return Err(CatalogError::InvalidSeed(format!("duplicate salon slug {}", salon.slug)));
            }
            catalog.salons.insert(salon.id, salon);
        }
        for location in seed.locations {
            catalog.require_salon(location.salon_id, "location", location.id)?;
            catalog.locations.insert(location.id, location);
        }
        for service in seed.services {
            catalog.require_salon(service.salon_id, "service", service.id)?;
            catalog.services.insert(service.id, service);
        }
        for member in seed.staff {
            catalog.require_salon(member.salon_id, "staff", member.id)?;
            catalog.staff.insert(member.id, member);
        }
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let seed: CatalogSeed =
            serde_json::from_str(raw).map_err(|e| CatalogError::InvalidSeed(e.to_string()))?;
        Self::from_seed(seed)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::InvalidSeed(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn salon_count(&self) -> usize {
        self.salons.len()
    }

    fn require_salon(&self, salon_id: Ulid, kind: &str, id: Ulid) -> Result<(), CatalogError> {
        if self.salons.contains_key(&salon_id) {
            Ok(())
        } else {
            Err(CatalogError::InvalidSeed(format!(
                "{kind} {id} references unknown salon {salon_id}"
            )))
        }
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn salon_by_slug(&self, slug: &str) -> Result<Option<Salon>, CatalogError> {
        Ok(self
            .slugs
            .get(slug)
            .and_then(|id| self.salons.get(id))
            .cloned())
    }

    async fn salon(&self, id: Ulid) -> Result<Option<Salon>, CatalogError> {
        Ok(self.salons.get(&id).cloned())
    }

    async fn location(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Location>, CatalogError> {
        Ok(self
            .locations
            .get(&id)
            .filter(|l| l.salon_id == salon_id)
            .cloned())
    }

    async fn staff(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Staff>, CatalogError> {
        Ok(self
            .staff
            .get(&id)
            .filter(|s| s.salon_id == salon_id)
            .cloned())
    }

    async fn service(&self, salon_id: Ulid, id: Ulid) -> Result<Option<Service>, CatalogError> {
        Ok(self
            .services
            .get(&id)
            .filter(|s| s.salon_id == salon_id)
            .cloned())
    }

    async fn staff_for_service(
        &self,
        salon_id: Ulid,
        service_id: Ulid,
        location_id: Ulid,
    ) -> Result<Vec<Staff>, CatalogError> {
        let mut found: Vec<Staff> = self
            .staff
            .values()
            .filter(|s| {
                s.salon_id == salon_id && s.is_active && s.performs(service_id) && s.works_at(location_id)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.display_name().cmp(&b.display_name()).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn resolve_client(&self, salon_id: Ulid, client: &ClientInfo) -> Result<Ulid, CatalogError> {
        let key = (salon_id, client.email.trim().to_lowercase());
        Ok(*self.clients.entry(key).or_insert_with(Ulid::new))
    }
}
