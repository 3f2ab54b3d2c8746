//! Headless arena client
//!
//! Connects to the relay, plays with the autopilot and logs round results.

use tracing::{error, info};

use arena_combat::client::{run_client, Autopilot, ClientError};
use arena_combat::config::ClientConfig;
use arena_combat::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    init_tracing(&config.log_level);

    info!(
        server_url = %config.server_url,
        seed = config.seed,
        autonomous = config.autonomous_count,
        "Starting arena client"
    );

    let pilot = Autopilot::new(config.seed);
    match run_client(config, pilot).await {
        Ok(()) => info!("Connection closed"),
        Err(ClientError::ServerFull(message)) => info!(%message, "Relay is full"),
        Err(e) => {
            error!(error = %e, "Client stopped");
            return Err(e.into());
        }
    }

    Ok(())
}
