//! Matchmaking for Fourline.
//!
//! Players wait in one FIFO queue. Two waiting players are paired at once;
//! a player left alone for `match_timeout` is promoted to a bot game at
//! the difficulty on their ticket.
//!
//! # Key types
//!
//! - [`Matchmaker`]: the queue (`enqueue`, `cancel`, `sweep`) and its
//!   background sweeper
//! - [`Ticket`]: one waiting player
//! - [`Enqueued`]: result of joining: still waiting, or paired
//! - [`LobbyConfig`]: timeout, sweep cadence, default bot difficulty

mod config;
mod error;
mod queue;

pub use config::LobbyConfig;
pub use error::LobbyError;
pub use queue::{Enqueued, Matchmaker, Pairing, Ticket};
