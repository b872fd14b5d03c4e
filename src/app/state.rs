//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::GameServer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: Arc<GameServer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // One game context for the whole process
        let game = Arc::new(GameServer::new(config.rules.clone(), config.rng_seed));

        Self { config, game }
    }
}
