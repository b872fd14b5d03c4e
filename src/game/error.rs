//! Errors raised by room and combat operations

use uuid::Uuid;

/// Recoverable failure of a single client request.
///
/// Every operation validates before it mutates, so returning one of these
/// leaves room and player state exactly as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No free marker left in room {0}")]
    Exhausted(Uuid),

    #[error("Game in room {0} is over")]
    GameOver(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl GameError {
    /// Stable code sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidRequest(_) => "invalid_request",
            GameError::NotFound(_) => "not_found",
            GameError::Exhausted(_) => "exhausted",
            GameError::GameOver(_) => "game_over",
            GameError::Conflict(_) => "conflict",
        }
    }

    pub fn room_not_found(room_id: Uuid) -> Self {
        GameError::NotFound(format!("Room {}", room_id))
    }

    pub fn player_not_found(player_id: Uuid) -> Self {
        GameError::NotFound(format!("Player {}", player_id))
    }
}
