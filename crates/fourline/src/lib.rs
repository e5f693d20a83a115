//! # Fourline
//!
//! Real-time Connect-4 server: two humans, or a human and a bot, play over
//! a WebSocket with automatic matchmaking, a bot fallback when nobody
//! shows up, and a grace period that keeps a game alive across short
//! network drops.
//!
//! The game rules and the bot live in `fourline-engine`, sessions in
//! `fourline-game`, the queue in `fourline-lobby` and connection tracking
//! in `fourline-hub`. This crate wires them together in [`Arena`] and puts
//! a WebSocket server in front of it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fourline::prelude::*;
//!
//! # async fn run() -> Result<(), FourlineError> {
//! let server = FourlineServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(DevAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod arena;
mod collab;
mod config;
mod error;
mod handler;
mod server;

pub use arena::{Arena, JoinOutcome};
pub use collab::{
    AnalyticsEvent, AnalyticsKind, AnalyticsSink, ChannelAnalytics, GameStore, MemoryStore,
    PlayerStats, StoreError, TracingAnalytics,
};
pub use config::ServerConfig;
pub use error::FourlineError;
pub use server::{FourlineServer, FourlineServerBuilder};

pub use fourline_engine::Difficulty;
pub use fourline_hub::{Authenticator, DevAuthenticator, HubError, Identity};

/// Everything needed to run a server or drive an [`Arena`] directly.
pub mod prelude {
    pub use crate::{
        AnalyticsSink, Arena, Authenticator, DevAuthenticator, Difficulty, FourlineError,
        FourlineServer, FourlineServerBuilder, GameStore, HubError, Identity, JoinOutcome,
        MemoryStore, ServerConfig,
    };
    pub use fourline_game::{GameConfig, GameError};
    pub use fourline_hub::HubConfig;
    pub use fourline_lobby::LobbyConfig;
    pub use fourline_protocol::{
        ClientEnvelope, ClientMessage, EndReason, ErrorReason, PROTOCOL_VERSION, PlayerId,
        ServerEnvelope, ServerMessage, SessionId, SessionSnapshot, SessionStatus,
    };
}
