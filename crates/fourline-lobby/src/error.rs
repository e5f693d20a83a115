//! Error types for the matchmaking layer.

use fourline_protocol::PlayerId;

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    /// The player already holds a ticket.
    #[error("player {0} is already queued")]
    AlreadyQueued(PlayerId),

    /// The bot identity cannot queue.
    #[error("player {0} cannot join the queue")]
    InvalidPlayer(PlayerId),
}
