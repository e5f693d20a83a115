//! Connection tracking for Fourline.
//!
//! This crate maps player identities to live push channels:
//!
//! 1. **Authentication**: who a player is ([`Authenticator`] trait)
//! 2. **Routing**: delivering session events to both seats
//!    ([`ConnectionHub::broadcast`])
//! 3. **Reconnection**: a player who drops out of a running session keeps
//!    their seat for a grace period; events are buffered meanwhile and
//!    flushed when they attach again
//!
//! When a grace period runs out the hub reports a [`HubNotice`]; deciding
//! what that means for the session is left to the caller.

#![allow(async_fn_in_trait)]

mod auth;
mod config;
mod error;
mod hub;

pub use auth::{Authenticator, DevAuthenticator, Identity, verify};
pub use config::HubConfig;
pub use error::HubError;
pub use hub::{Attached, ConnectionHub, HubNotice, NoticeReceiver, Outbound};
