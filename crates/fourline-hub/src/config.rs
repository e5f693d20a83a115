//! Hub configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for connection tracking and reconnection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// How long a player in a session may stay detached before the session
    /// is abandoned.
    pub reconnect_grace: Duration,

    /// Events kept for a detached seat. Older events are dropped first.
    pub max_buffered_events: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            max_buffered_events: 64,
        }
    }
}
