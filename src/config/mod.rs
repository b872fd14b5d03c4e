//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Game rules shared by every room on this server
#[derive(Clone, Debug, PartialEq)]
pub struct GameRules {
    /// Health every player starts (and respawns) with
    pub start_health: u32,
    /// Kills needed to end a room
    pub kills_for_win: u32,
    /// Marker universe is `[0, marker_pool_size)`
    pub marker_pool_size: u16,
    /// Marker id of the respawn station
    pub respawn_marker: u16,
    /// Marker id of the mystery box
    pub mystery_box_marker: u16,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            start_health: 5,
            kills_for_win: 3,
            marker_pool_size: 200,
            respawn_marker: 10,
            mystery_box_marker: 11,
        }
    }
}

impl GameRules {
    /// Reject rule sets the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_health == 0 {
            return Err(ConfigError::InvalidRules("START_HEALTH must be at least 1"));
        }
        if self.kills_for_win == 0 {
            return Err(ConfigError::InvalidRules("KILLS_FOR_WIN must be at least 1"));
        }
        if self.respawn_marker >= self.marker_pool_size
            || self.mystery_box_marker >= self.marker_pool_size
        {
            return Err(ConfigError::InvalidRules(
                "reserved markers must lie inside the marker pool",
            ));
        }
        if self.respawn_marker == self.mystery_box_marker {
            return Err(ConfigError::InvalidRules(
                "respawn and mystery box markers must differ",
            ));
        }
        Ok(())
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS ("*" for any)
    pub client_origin: String,
    /// Seed for mystery box draws; random when unset
    pub rng_seed: Option<u64>,
    pub rules: GameRules,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosted platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = GameRules::default();
        let rules = GameRules {
            start_health: parse_var("START_HEALTH", defaults.start_health)?,
            kills_for_win: parse_var("KILLS_FOR_WIN", defaults.kills_for_win)?,
            marker_pool_size: parse_var("MARKER_POOL_SIZE", defaults.marker_pool_size)?,
            respawn_marker: parse_var("RESPAWN_MARKER", defaults.respawn_marker)?,
            mystery_box_marker: parse_var("MYSTERY_BOX_MARKER", defaults.mystery_box_marker)?,
        };
        rules.validate()?;

        let rng_seed = match env::var("RNG_SEED") {
            Ok(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber("RNG_SEED"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            rng_seed,
            rules,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid numeric value for environment variable: {0}")]
    InvalidNumber(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid game rules: {0}")]
    InvalidRules(&'static str),
}
