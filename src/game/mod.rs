//! Room and combat state machine

pub mod combat;
pub mod error;
pub mod markers;
pub mod player;
pub mod room;
pub mod server;
pub mod snapshot;

pub use error::GameError;
pub use server::GameServer;
