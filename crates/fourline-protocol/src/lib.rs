//! Wire protocol for Fourline.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`PlayerId`], [`SessionId`], [`SessionStatus`],
//!   [`SessionSnapshot`]): identities and the immutable view of a game
//!   that is pushed to clients and handed to the record store.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   the frames that travel on the socket.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the game
//! services. It knows nothing about connections or sessions in flight.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Arena (game operations)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    ClientEnvelope, ClientMessage, Envelope, ErrorReason, PROTOCOL_VERSION, ServerEnvelope,
    ServerMessage,
};
pub use types::{EndReason, MoveRecord, PlayerId, SessionId, SessionSnapshot, SessionStatus};
