//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionRelay;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Arc<SessionRelay>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let relay = Arc::new(SessionRelay::new(config.max_players));
        Self {
            config: Arc::new(config),
            relay,
        }
    }
}
