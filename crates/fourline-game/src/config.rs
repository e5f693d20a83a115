//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every session actor and the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// How long a terminal session stays queryable before it is evicted.
    pub retention: Duration,

    /// Wall-clock budget for one bot search. When it runs out the best
    /// move of the deepest completed ply is played.
    pub bot_budget: Duration,

    /// Whether bot moves wait for a short, difficulty-dependent "thinking"
    /// pause before they are published.
    pub bot_pacing: bool,

    /// Reject a new session if either human already sits in a
    /// non-terminal one.
    pub one_session_per_player: bool,

    /// Capacity of each actor's command channel.
    pub command_buffer: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60),
            bot_budget: Duration::from_secs(2),
            bot_pacing: true,
            one_session_per_player: true,
            command_buffer: 64,
        }
    }
}
