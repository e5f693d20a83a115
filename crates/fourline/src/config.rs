//! Server configuration.

use std::time::Duration;

use fourline_engine::Difficulty;
use fourline_game::GameConfig;
use fourline_hub::HubConfig;
use fourline_lobby::LobbyConfig;
use serde::{Deserialize, Serialize};

use crate::FourlineError;

/// Everything the server needs to start.
///
/// Every field has a sensible default; [`from_env`](Self::from_env)
/// overrides them from `FOURLINE_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// How long a new connection has to send its `Handshake`.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing (not even a heartbeat) for this
    /// long is treated as lost.
    pub idle_timeout: Duration,

    pub game: GameConfig,
    pub lobby: LobbyConfig,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            game: GameConfig::default(),
            lobby: LobbyConfig::default(),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `FOURLINE_BIND` | `bind_addr` |
    /// | `FOURLINE_HANDSHAKE_TIMEOUT_MS` | `handshake_timeout` |
    /// | `FOURLINE_IDLE_TIMEOUT_MS` | `idle_timeout` |
    /// | `FOURLINE_MATCH_TIMEOUT_MS` | `lobby.match_timeout` |
    /// | `FOURLINE_DEFAULT_DIFFICULTY` | `lobby.default_difficulty` |
    /// | `FOURLINE_RECONNECT_GRACE_MS` | `hub.reconnect_grace` |
    /// | `FOURLINE_RETENTION_MS` | `game.retention` |
    /// | `FOURLINE_BOT_BUDGET_MS` | `game.bot_budget` |
    /// | `FOURLINE_BOT_PACING` | `game.bot_pacing` |
    ///
    /// # Errors
    /// [`FourlineError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, FourlineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FourlineError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("FOURLINE_BIND") {
            config.bind_addr = addr;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_HANDSHAKE_TIMEOUT_MS")? {
            config.handshake_timeout = v;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_IDLE_TIMEOUT_MS")? {
            config.idle_timeout = v;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_MATCH_TIMEOUT_MS")? {
            config.lobby.match_timeout = v;
        }
        if let Some(v) = lookup("FOURLINE_DEFAULT_DIFFICULTY") {
            config.lobby.default_difficulty = parse_difficulty(&v)?;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_RECONNECT_GRACE_MS")? {
            config.hub.reconnect_grace = v;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_RETENTION_MS")? {
            config.game.retention = v;
        }
        if let Some(v) = millis(&lookup, "FOURLINE_BOT_BUDGET_MS")? {
            config.game.bot_budget = v;
        }
        if let Some(v) = lookup("FOURLINE_BOT_PACING") {
            config.game.bot_pacing = parse_bool(&v)
                .ok_or_else(|| FourlineError::Config(format!("FOURLINE_BOT_PACING: {v:?}")))?;
        }

        Ok(config)
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, FourlineError> {
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| FourlineError::Config(format!("{key}: {e}")))
        })
        .transpose()
}

fn parse_difficulty(v: &str) -> Result<Difficulty, FourlineError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => Err(FourlineError::Config(format!(
            "FOURLINE_DEFAULT_DIFFICULTY: unknown difficulty {other:?}"
        ))),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
