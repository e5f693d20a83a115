//! Error types for the connection hub.

use fourline_protocol::PlayerId;

/// Errors that can occur while authenticating or routing to players.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The token was rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The identity provider returned an identity the server cannot seat,
    /// such as the bot sentinel.
    #[error("malformed identity {0}")]
    InvalidIdentity(PlayerId),

    /// No connection record exists for the player.
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),
}
