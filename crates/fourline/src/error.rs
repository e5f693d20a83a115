//! Unified error type for the Fourline server.

use fourline_engine::EngineError;
use fourline_game::GameError;
use fourline_hub::HubError;
use fourline_lobby::LobbyError;
use fourline_protocol::{ErrorReason, ProtocolError, ServerMessage};
use fourline_transport::TransportError;

use crate::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum FourlineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Hub(#[from] HubError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FourlineError {
    /// The wire reason a client sees for this error.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::Game(e) => match e {
                GameError::NotFound(_) => ErrorReason::NotFound,
                GameError::SessionNotActive(_) => ErrorReason::SessionNotActive,
                GameError::NotYourTurn(_) => ErrorReason::NotYourTurn,
                GameError::IllegalMove { .. } => ErrorReason::IllegalMove,
                GameError::AlreadyInSession(..) => ErrorReason::AlreadyInSession,
                GameError::InvalidSeating(_) => ErrorReason::BadRequest,
                GameError::Corrupted(_) | GameError::Unavailable(_) => ErrorReason::Unavailable,
            },
            Self::Lobby(e) => match e {
                LobbyError::AlreadyQueued(_) => ErrorReason::AlreadyQueued,
                LobbyError::InvalidPlayer(_) => ErrorReason::BadRequest,
            },
            Self::Hub(e) => match e {
                HubError::AuthFailed(_) | HubError::InvalidIdentity(_) => ErrorReason::Unauthorized,
                HubError::NotConnected(_) => ErrorReason::NotFound,
            },
            Self::Engine(EngineError::IllegalMove { .. }) => ErrorReason::IllegalMove,
            Self::Engine(_) | Self::Protocol(_) | Self::Config(_) => ErrorReason::BadRequest,
            Self::Transport(_) | Self::Store(_) => ErrorReason::Unavailable,
        }
    }

    /// Builds the `Error` frame sent back to the client.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.reason(), self.to_string())
    }
}
