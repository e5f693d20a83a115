//! Session registry: creates, tracks, and routes to session actors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fourline_engine::Difficulty;
use fourline_protocol::{EndReason, PlayerId, SessionId, SessionSnapshot};
use rand::Rng;

use crate::actor::spawn_session;
use crate::{GameConfig, GameError, GameSession, SessionHandle, UpdateReceiver};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionHandle>,
    /// Each human's most recent session. The entry may point at a terminal
    /// session until it is evicted; only non-terminal ones count as active.
    by_player: HashMap<PlayerId, SessionId>,
}

impl RegistryState {
    fn active_session_of(&self, player: PlayerId) -> Option<SessionId> {
        let id = self.by_player.get(&player)?;
        let handle = self.sessions.get(id)?;
        (!handle.status().is_terminal()).then_some(*id)
    }
}

/// Tracks every live session and which human sits where.
///
/// Cheap to clone; clones share the same sessions. The lock is a
/// `std::sync::RwLock` and is never held across an `.await`: async
/// operations clone the handle out first.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
    config: GameConfig,
}

impl SessionRegistry {
    pub fn new(config: GameConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            config,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Creates and starts a session between `a` and `b`.
    ///
    /// Seats are assigned at random (seat 0 plays red and moves first).
    /// Either player may be [`PlayerId::BOT`]; `bot_difficulty` applies to
    /// that seat and defaults to medium.
    ///
    /// Returns the handle and the session's update stream, whose first
    /// item is always `SessionUpdate::Started`. Once terminal, the session
    /// stays queryable for `GameConfig::retention` and is then evicted.
    ///
    /// # Errors
    /// - [`GameError::AlreadyInSession`] if a human is already seated in a
    ///   non-terminal session and `one_session_per_player` is on
    /// - [`GameError::InvalidSeating`] for the same identity twice or two
    ///   bots
    pub fn create(
        &self,
        a: PlayerId,
        b: PlayerId,
        bot_difficulty: Option<Difficulty>,
    ) -> Result<(SessionHandle, UpdateReceiver), GameError> {
        if a.is_bot() && b.is_bot() {
            return Err(GameError::InvalidSeating("two bots".into()));
        }

        let players = if rand::rng().random_bool(0.5) {
            [a, b]
        } else {
            [b, a]
        };

        let (handle, updates) = {
            let mut state = self.write();
            if self.config.one_session_per_player {
                for p in players.iter().filter(|p| !p.is_bot()) {
                    if let Some(current) = state.active_session_of(*p) {
                        return Err(GameError::AlreadyInSession(*p, current));
                    }
                }
            }

            let session_id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
            let session = GameSession::new(session_id, players, bot_difficulty)?;
            let (handle, updates) = spawn_session(session, self.config.clone());

            state.sessions.insert(session_id, handle.clone());
            for p in players.iter().filter(|p| !p.is_bot()) {
                state.by_player.insert(*p, session_id);
            }
            (handle, updates)
        };

        tracing::info!(
            session_id = %handle.session_id(),
            red = %players[0],
            yellow = %players[1],
            sessions = self.len(),
            "session created"
        );
        self.spawn_reaper(&handle);
        Ok((handle, updates))
    }

    /// Returns the handle for a session, if it has not been evicted.
    pub fn get(&self, session_id: SessionId) -> Option<SessionHandle> {
        self.read().sessions.get(&session_id).cloned()
    }

    pub async fn snapshot(&self, session_id: SessionId) -> Result<SessionSnapshot, GameError> {
        self.handle(session_id)?.snapshot().await
    }

    pub async fn submit_move(
        &self,
        session_id: SessionId,
        player: PlayerId,
        column: usize,
    ) -> Result<SessionSnapshot, GameError> {
        self.handle(session_id)?.submit_move(player, column).await
    }

    /// Abandons a non-terminal session.
    ///
    /// # Errors
    /// [`GameError::SessionNotActive`] if it already ended; the first
    /// terminal transition is final.
    pub async fn force_abandon(
        &self,
        session_id: SessionId,
        reason: EndReason,
    ) -> Result<SessionSnapshot, GameError> {
        self.handle(session_id)?.abandon(reason).await
    }

    /// The non-terminal session `player` sits in, if any.
    pub fn active_session_of(&self, player: PlayerId) -> Option<SessionId> {
        self.read().active_session_of(player)
    }

    /// Removes a session and stops its actor. Returns `false` if it was
    /// already gone.
    pub fn evict(&self, session_id: SessionId) -> bool {
        let removed = {
            let mut state = self.write();
            let removed = state.sessions.remove(&session_id);
            state.by_player.retain(|_, sid| *sid != session_id);
            removed
        };
        match removed {
            Some(handle) => {
                handle.shutdown();
                tracing::info!(%session_id, "session evicted");
                true
            }
            None => false,
        }
    }

    /// Number of sessions currently held (including terminal ones inside
    /// their retention window).
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, session_id: SessionId) -> Result<SessionHandle, GameError> {
        self.get(session_id).ok_or(GameError::NotFound(session_id))
    }

    /// Evicts the session `retention` after it turns terminal (or right
    /// away if the actor dies).
    fn spawn_reaper(&self, handle: &SessionHandle) {
        let registry = self.clone();
        let session_id = handle.session_id();
        let retention = self.config.retention;
        let mut status = handle.watch_status();

        tokio::spawn(async move {
            let ended = status.wait_for(|s| s.is_terminal()).await.is_ok();
            if ended {
                tokio::time::sleep(retention).await;
            }
            registry.evict(session_id);
        });
    }

    // Poisoning is ignored: no update leaves the maps half-written.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
