//! Arena relay server
//!
//! Accepts WebSocket sessions on `/ws`, hands each one an id and relays
//! movement, eliminations and round-over notices between them.

use tokio::net::TcpListener;
use tracing::{info, warn};

use arena_combat::config::Config;
use arena_combat::util::time::init_server_time;
use arena_combat::{init_tracing, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting arena relay");
    info!(
        max_players = config.max_players,
        input_rate_limit = config.input_rate_limit,
        "Server address: {}",
        config.server_addr
    );

    let listener = TcpListener::bind(config.server_addr).await?;
    serve(config, listener, shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
