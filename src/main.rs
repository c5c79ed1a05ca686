use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use farmstead::compactor;
use farmstead::engine::Engine;
use farmstead::http::{self, AppState};
use farmstead::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("FARMSTEAD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    farmstead::observability::init(metrics_port);

    let port = std::env::var("FARMSTEAD_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("FARMSTEAD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("FARMSTEAD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let admin_key = std::env::var("FARMSTEAD_ADMIN_KEY").unwrap_or_else(|_| "farmstead".into());
    let compact_threshold: u64 = std::env::var("FARMSTEAD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;
    let ledger_path = PathBuf::from(&data_dir).join("bookings.ledger");

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(ledger_path, notify)?);
    tokio::spawn(compactor::run_compactor(engine.clone(), compact_threshold));

    let state = AppState {
        engine,
        admin_key: admin_key.into(),
    };
    let app = http::router(state);

    let addr: std::net::SocketAddr = format!("{bind}:{port}").parse()?;
    info!("farmstead listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  compact_threshold: {compact_threshold}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received");
    };

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("farmstead stopped");
    Ok(())
}
