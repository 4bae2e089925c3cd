//! gridview - interactive viewer API for gridded Zarr and NetCDF datasets
//!
//! This is the main entry point for the gridview server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};

use gridview::config::validate_source;
use gridview::handlers::build_router;
use gridview::{
    init_tracing, log_error, open_dataset, AppState, Config, Dataset, Result, ViewerError,
};

fn main() -> Result<()> {
    let (config, source) = Config::load()?;

    init_tracing(&config.log_level);
    info!("Starting gridview v{}", env!("CARGO_PKG_VERSION"));

    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    validate_source(&source).map_err(|e| {
        error!("Invalid dataset location: {}", e);
        e
    })?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.server.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(serve(config, source))
}

async fn serve(config: Config, source: String) -> Result<()> {
    info!(source = %source, engines = ?config.data.engines, "Opening dataset");

    let start = Instant::now();
    let engines = config.data.engines.clone();
    let open_source = source.clone();
    let opened = tokio::task::spawn_blocking(move || open_dataset(&open_source, &engines))
        .await
        .map_err(|e| ViewerError::Server {
            message: format!("Dataset open task failed: {}", e),
        })?;

    match &opened {
        Ok(handle) => info!(
            engine = handle.engine_name(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Dataset ready"
        ),
        Err(e) => {
            // The server still starts and reports the failure
            log_error(e, "startup dataset open");
            warn!("Serving without a dataset; data actions will answer 503");
        }
    }

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| ViewerError::Config {
                message: format!("Invalid host address: {}", e),
            })?,
        config.server.port,
    ));

    let idle = std::time::Duration::from_secs(config.server.session_idle_secs);
    let state = AppState::new_shared(config, source, opened);
    tokio::spawn(expire_sessions(state.clone(), idle));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ViewerError::Server {
            message: format!("Failed to bind to address: {}", e),
        })?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ViewerError::Server {
            message: format!("Server error: {}", e),
        })?;

    info!("Server has been gracefully shut down");
    Ok(())
}

/// Periodically drop sessions idle for longer than `idle`
async fn expire_sessions(state: Arc<AppState>, idle: std::time::Duration) {
    let max_idle = chrono::Duration::from_std(idle).unwrap_or_else(|_| chrono::Duration::days(36500));
    let period = (idle / 4).clamp(std::time::Duration::from_secs(1), std::time::Duration::from_secs(3600));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        state.sessions.expire_idle(max_idle);
    }
}

/// Wait for a shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
