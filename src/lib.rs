//! Arena vehicle combat
//!
//! - `game`: the per-client simulation (vehicles, projectiles, autonomous
//!   opponents, round lifecycle)
//! - `client`: remote-state buffering, reconciliation and the relay connection
//! - `session`, `ws`, `http`: the state-sync relay server

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod session;
pub mod util;
pub mod ws;

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;

/// Install the global subscriber; `RUST_LOG` wins over `log_level`
pub fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Serve the relay on an already bound listener until `shutdown` resolves
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(AppState::new(config));
    let addr = listener.local_addr()?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
