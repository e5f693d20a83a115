//! Game sessions for Fourline.
//!
//! Each session runs as an isolated Tokio task (actor model) that owns
//! the board, enforces turn order, and drives the bot seat.
//!
//! # Key types
//!
//! - [`GameSession`]: the synchronous state machine (moves, win/draw,
//!   abandonment)
//! - [`SessionHandle`]: sends commands to a running session actor
//! - [`SessionUpdate`]: state changes published by an actor, in order
//! - [`SessionRegistry`]: creates sessions, routes by id, enforces one
//!   active session per player, evicts after retention
//! - [`GameConfig`]: retention, bot budget and pacing, channel sizes

mod actor;
mod config;
mod error;
mod registry;
mod session;

pub use actor::{SessionHandle, SessionUpdate, UpdateReceiver};
pub use config::GameConfig;
pub use error::GameError;
pub use registry::SessionRegistry;
pub use session::{GameSession, now_ms};
