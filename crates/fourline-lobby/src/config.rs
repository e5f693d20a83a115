//! Matchmaking configuration.

use std::time::Duration;

use fourline_engine::Difficulty;
use serde::{Deserialize, Serialize};

/// Settings for the matchmaking queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// How long a ticket waits for a human before a bot takes the other
    /// seat.
    pub match_timeout: Duration,

    /// How often the background sweeper looks for expired tickets.
    pub sweep_interval: Duration,

    /// Bot difficulty for tickets that did not ask for one.
    pub default_difficulty: Difficulty,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_millis(500),
            default_difficulty: Difficulty::Medium,
        }
    }
}
