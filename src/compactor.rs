use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Background task that compacts a salon's WAL once enough events have
/// been appended since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold.max(1) {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(salon = %engine.salon_id, appends, "WAL compacted"),
            Err(e) => warn!(salon = %engine.salon_id, "WAL compaction failed: {e}"),
        }
    }
}
