//! Error types for the session layer.

use fourline_protocol::{PlayerId, SessionId};

/// Errors that can occur during session operations.
///
/// Every variant except `Corrupted` leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The session does not exist (or was already evicted).
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session is not in progress.
    #[error("session {0} is not active")]
    SessionNotActive(SessionId),

    /// The player is not the one bound to the disc to move.
    #[error("it is not {0}'s turn")]
    NotYourTurn(PlayerId),

    /// The column is out of range or full.
    #[error("illegal move in column {column}")]
    IllegalMove { column: usize },

    /// The player already sits in another non-terminal session.
    #[error("player {0} is already in session {1}")]
    AlreadyInSession(PlayerId, SessionId),

    /// The seat assignment is invalid (same identity twice, or two bots).
    #[error("invalid seating: {0}")]
    InvalidSeating(String),

    /// The board failed its integrity check; the session was abandoned.
    #[error("session {0} was abandoned after a board integrity failure")]
    Corrupted(SessionId),

    /// The session actor's channel is full or closed.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}
