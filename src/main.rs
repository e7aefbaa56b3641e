mod api;
mod config;
mod db;
mod error;
mod reconnect;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::DbGate;
use crate::api::routes::{router, ApiState, DbInfo};
use crate::config::Config;
use crate::db::{CounterStore, MySqlCounterStore};
use crate::error::Result;
use crate::reconnect::Reconnector;

#[tokio::main]
async fn main() {
    // A missing .env is normal in deployment.
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!(
        port = cfg.port,
        address = %cfg.db.address,
        username = %cfg.db.username,
        has_password = !cfg.db.password.is_empty(),
        "Starting counter service"
    );

    let mysql = Arc::new(MySqlCounterStore::new(&cfg.db));
    let store: Arc<dyn CounterStore> = mysql.clone();
    let gate = Arc::new(DbGate::new());

    // Bind before touching the database so the port is up even when MySQL is not.
    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP server listening on {bind_addr}");

    let shutdown = CancellationToken::new();

    let reconnector = Reconnector::new(Arc::clone(&store), Arc::clone(&gate), shutdown.child_token());
    let reconnect_task = tokio::spawn(reconnector.run());

    let api_state = ApiState {
        store,
        gate,
        port: cfg.port,
        db_info: DbInfo::from(&cfg.db),
    };
    axum::serve(listener, router(api_state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = reconnect_task.await {
        error!("Reconnect task panicked: {e}");
    }
    mysql.close().await;
    info!("Server closed");

    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C and cancels `token` so background tasks stop too.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, closing server");
    token.cancel();
}
