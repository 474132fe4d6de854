use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ulid::Ulid;

use crate::catalog::CatalogRepository;
use crate::clock::SharedClock;
use crate::compactor;
use crate::engine::{Engine, EngineError, EngineSettings, NotFoundKind};
use crate::limits::*;
use crate::notify::NotifyHub;

/// How often each salon's compactor checks its WAL.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Per-salon engines, created on first use. Each salon gets its own Engine,
/// WAL file and compactor task; nothing is shared between salons.
pub struct SalonManager {
    engines: DashMap<Ulid, Arc<Engine>>,
    catalog: Arc<dyn CatalogRepository>,
    data_dir: PathBuf,
    clock: SharedClock,
    settings: EngineSettings,
    compact_threshold: u64,
}

impl SalonManager {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        data_dir: PathBuf,
        clock: SharedClock,
        settings: EngineSettings,
        compact_threshold: u64,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            catalog,
            data_dir,
            clock,
            settings,
            compact_threshold,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogRepository> {
        &self.catalog
    }

    /// Resolve a public slug to its salon's engine.
    pub async fn by_slug(&self, slug: &str) -> Result<Arc<Engine>, EngineError> {
        if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
            return Err(EngineError::NotFound(NotFoundKind::Salon));
        }
        let salon = self
            .catalog
            .salon_by_slug(slug)
            .await?
            .ok_or(EngineError::NotFound(NotFoundKind::Salon))?;
        self.engine(salon.id)
    }

    /// Get or lazily create the engine for a salon. Concurrent first calls
    /// agree on a single engine.
    pub fn engine(&self, salon_id: Ulid) -> Result<Arc<Engine>, EngineError> {
        if let Some(engine) = self.engines.get(&salon_id) {
            return Ok(engine.value().clone());
        }
        let engine = self
            .engines
            .entry(salon_id)
            .or_try_insert_with(|| self.open(salon_id))?
            .value()
            .clone();
        metrics::gauge!(crate::observability::SALONS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    fn open(&self, salon_id: Ulid) -> Result<Arc<Engine>, EngineError> {
        let wal_path = self.data_dir.join(format!("{salon_id}.wal"));
        let engine = Arc::new(
            Engine::new(
                salon_id,
                wal_path,
                self.catalog.clone(),
                Arc::new(NotifyHub::new()),
                self.clock.clone(),
                self.settings.clone(),
            )
            .map_err(|e| EngineError::WalError(e.to_string()))?,
        );
        tokio::spawn(compactor::run_compactor(
            engine.clone(),
            self.compact_threshold,
            COMPACT_CHECK_INTERVAL,
        ));
        tracing::info!(salon = %salon_id, "salon engine loaded");
        Ok(engine)
    }

    pub fn active(&self) -> usize {
        self.engines.len()
    }
}
