//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::session::MAX_PLAYERS;
use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum concurrent sessions
    pub max_players: usize,
    /// Allowed client origin for CORS ("*" for any)
    pub client_origin: String,
    /// Inbound frames allowed per session per second
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_players: parse_or("MAX_PLAYERS", MAX_PLAYERS)?,
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            max_players: MAX_PLAYERS,
            client_origin: "*".to_string(),
            input_rate_limit: INPUT_RATE_LIMIT,
        }
    }
}

/// Headless client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket URL of the relay
    pub server_url: String,
    pub log_level: String,
    /// Reconnect attempts before giving up
    pub reconnect_attempts: u32,
    /// Delay unit for linear reconnect backoff
    pub reconnect_delay: Duration,
    /// Autonomous vehicles simulated locally
    pub autonomous_count: usize,
    /// Seed for the simulation RNG
    pub seed: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: env::var("ARENA_SERVER_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:8080/ws".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            reconnect_attempts: parse_or("RECONNECT_ATTEMPTS", 5)?,
            reconnect_delay: Duration::from_millis(parse_or("RECONNECT_DELAY_MS", 1000)?),
            autonomous_count: parse_or("AUTONOMOUS_COUNT", 4)?,
            seed: match env::var("SEED") {
                Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid("SEED"))?,
                Err(_) => rand::random(),
            },
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
