use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: route, method, status.
pub const REQUESTS_TOTAL: &str = "farmstead_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route, method.
pub const REQUEST_DURATION_SECONDS: &str = "farmstead_request_duration_seconds";

/// Counter: reservation attempts. Labels: outcome
/// (reserved, unavailable, race_lost, invalid, error).
pub const RESERVATIONS_TOTAL: &str = "farmstead_reservations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently in the catalog.
pub const ROOMS_ACTIVE: &str = "farmstead_rooms_active";

/// Counter: admin requests rejected for a bad or missing key.
pub const ADMIN_AUTH_FAILURES_TOTAL: &str = "farmstead_admin_auth_failures_total";

/// Histogram: ledger group-commit flush duration in seconds.
pub const LEDGER_FLUSH_DURATION_SECONDS: &str = "farmstead_ledger_flush_duration_seconds";

/// Histogram: ledger group-commit batch size (events per flush).
pub const LEDGER_FLUSH_BATCH_SIZE: &str = "farmstead_ledger_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
