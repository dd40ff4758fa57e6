use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests handled. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "hoteld_http_requests_total";

/// Histogram: HTTP handler latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "hoteld_http_request_duration_seconds";

/// Counter: bookings committed to the ledger.
pub const BOOKINGS_COMMITTED_TOTAL: &str = "hoteld_bookings_committed_total";

/// Counter: booking attempts refused. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "hoteld_bookings_rejected_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "hoteld_bookings_cancelled_total";

/// Counter: bookings moved to new nights or party size.
pub const BOOKINGS_MODIFIED_TOTAL: &str = "hoteld_bookings_modified_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: room type lock waits that hit the timeout. Labels: mode.
pub const LOCK_TIMEOUTS_TOTAL: &str = "hoteld_lock_timeouts_total";

/// Counter: bearer tokens rejected.
pub const AUTH_FAILURES_TOTAL: &str = "hoteld_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hoteld_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hoteld_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "hoteld_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an engine error, used on rejection counters and logs.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::Validation(_) => "validation",
        EngineError::Capacity { .. } => "capacity",
        EngineError::NotFound(_) => "not_found",
        EngineError::Forbidden => "forbidden",
        EngineError::AlreadyCancelled(_) => "already_cancelled",
        EngineError::AlreadyExists(_) => "conflict",
        EngineError::Transient(_) => "transient",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::WalError(_) => "internal",
    }
}
