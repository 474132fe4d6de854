use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "salonbook_bookings_total";

/// Histogram: end-to-end booking latency in seconds, alternatives included.
pub const BOOKING_DURATION_SECONDS: &str = "salonbook_booking_duration_seconds";

/// Counter: availability queries.
pub const SLOT_QUERIES_TOTAL: &str = "salonbook_slot_queries_total";

/// Histogram: alternatives attached to a rejected booking.
pub const ALTERNATIVES_RETURNED: &str = "salonbook_alternatives_returned";

/// Counter: HTTP responses. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "salonbook_http_requests_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: calendar lock attempts that timed out and were retried.
pub const TXN_RETRIES_TOTAL: &str = "salonbook_txn_retries_total";

/// Gauge: salons with a loaded engine.
pub const SALONS_ACTIVE: &str = "salonbook_salons_active";

/// Counter: management requests rejected for a bad or missing token.
pub const AUTH_FAILURES_TOTAL: &str = "salonbook_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "salonbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "salonbook_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
