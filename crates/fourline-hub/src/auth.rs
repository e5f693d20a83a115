//! Authentication hook for validating player identity.
//!
//! Fourline does not implement an identity provider. It defines the
//! [`Authenticator`] trait: one async method that takes the handshake token
//! and returns a stable player identity and display name. The server calls
//! it through [`verify`], which also rejects identities it cannot seat.

use std::future::Future;

use fourline_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::HubError;

/// A verified player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub player_id: PlayerId,
    pub display_name: String,
}

/// Validates a client's handshake token and returns their identity.
///
/// # Example
///
/// ```rust
/// use fourline_hub::{Authenticator, HubError, Identity};
/// use fourline_protocol::PlayerId;
///
/// /// Accepts a fixed list of API keys.
/// struct KeyAuthenticator;
///
/// impl Authenticator for KeyAuthenticator {
///     async fn authenticate(&self, token: &str) -> Result<Identity, HubError> {
///         match token {
///             "key-alice" => Ok(Identity {
///                 player_id: PlayerId(1),
///                 display_name: "alice".into(),
///             }),
///             _ => Err(HubError::AuthFailed("unknown key".into())),
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns who the client is.
    ///
    /// Return [`HubError::AuthFailed`] for invalid or expired tokens.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Identity, HubError>> + Send;
}

/// Authenticates `token` and rejects identities that collide with the bot
/// sentinel.
pub async fn verify<A: Authenticator>(auth: &A, token: &str) -> Result<Identity, HubError> {
    let identity = auth.authenticate(token).await?;
    if identity.player_id.is_bot() {
        return Err(HubError::InvalidIdentity(identity.player_id));
    }
    Ok(identity)
}

/// Development authenticator: the token is `<id>` or `<id>:<name>`.
///
/// Anyone can claim any id. Only for local play and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, HubError> {
        let (id, name) = match token.split_once(':') {
            Some((id, name)) => (id, Some(name.trim())),
            None => (token, None),
        };
        let id: u64 = id
            .trim()
            .parse()
            .map_err(|_| HubError::AuthFailed("token must start with a numeric id".into()))?;
        let player_id = PlayerId(id);
        let display_name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => player_id.to_string(),
        };
        Ok(Identity {
            player_id,
            display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dev_authenticate_id_only_uses_default_name() {
        let identity = verify(&DevAuthenticator, "42").await.unwrap();
        assert_eq!(identity.player_id, PlayerId(42));
        assert_eq!(identity.display_name, "P-42");
    }

    #[tokio::test]
    async fn test_dev_authenticate_with_name() {
        let identity = verify(&DevAuthenticator, "7:ada").await.unwrap();
        assert_eq!(identity.player_id, PlayerId(7));
        assert_eq!(identity.display_name, "ada");
    }

    #[tokio::test]
    async fn test_dev_authenticate_garbage_fails() {
        let err = verify(&DevAuthenticator, "not-a-number").await.unwrap_err();
        assert!(matches!(err, HubError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn test_verify_bot_identity_rejected() {
        let err = verify(&DevAuthenticator, "0:sneaky").await.unwrap_err();
        assert_eq!(err, HubError::InvalidIdentity(PlayerId::BOT));
    }
}
