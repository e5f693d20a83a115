//! The arena: wires the matchmaking queue, the session registry, the
//! connection hub and the collaborators together.
//!
//! ```text
//! join_queue ──→ Matchmaker ──(pair / timeout)──→ SessionRegistry
//!                                                     │ updates
//!                                                     ▼
//!                     store + analytics ←── forwarder ──→ ConnectionHub
//! ```
//!
//! Each session gets one forwarder task that turns its updates into hub
//! broadcasts, in mutation order, and queues the matching store writes on
//! a per-session writer task that applies them in the same order. Two more background tasks consume bot promotions from
//! the queue and grace expiries from the hub.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fourline_engine::Difficulty;
use fourline_game::{GameError, SessionHandle, SessionRegistry, SessionUpdate, UpdateReceiver, now_ms};
use fourline_hub::{Attached, ConnectionHub, HubNotice, NoticeReceiver, Outbound};
use fourline_lobby::{Enqueued, Matchmaker, Ticket};
use fourline_protocol::{
    EndReason, MoveRecord, PlayerId, ServerMessage, SessionId, SessionSnapshot, SessionStatus,
};
use fourline_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    AnalyticsEvent, AnalyticsKind, AnalyticsSink, FourlineError, GameStore, MemoryStore,
    ServerConfig, TracingAnalytics,
};

/// Result of [`Arena::join_queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Waiting for an opponent.
    Queued { position: usize, timeout_ms: u64 },
    /// Paired at once; `SessionStarted` is on its way to both seats.
    Matched(SessionSnapshot),
}

struct ArenaInner<S, K> {
    registry: SessionRegistry,
    lobby: Matchmaker,
    hub: ConnectionHub,
    store: Arc<S>,
    analytics: Arc<K>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// The game service behind every connection.
///
/// Cheap to clone; clones share the same state.
pub struct Arena<S = MemoryStore, K = TracingAnalytics> {
    inner: Arc<ArenaInner<S, K>>,
}

impl<S, K> Clone for Arena<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Arena<MemoryStore, TracingAnalytics> {
    /// An arena with an in-memory store and log-only analytics.
    pub fn in_memory(config: &ServerConfig) -> Self {
        Self::new(config, MemoryStore::new(), TracingAnalytics)
    }
}

impl<S: GameStore, K: AnalyticsSink> Arena<S, K> {
    /// Creates the arena and starts its background tasks. Must be called
    /// inside a Tokio runtime.
    pub fn new(config: &ServerConfig, store: S, analytics: K) -> Self {
        let (hub, notices) = ConnectionHub::new(config.hub.clone());
        let arena = Self {
            inner: Arc::new(ArenaInner {
                registry: SessionRegistry::new(config.game.clone()),
                lobby: Matchmaker::new(config.lobby.clone()),
                hub,
                store: Arc::new(store),
                analytics: Arc::new(analytics),
                background: Mutex::new(Vec::new()),
            }),
        };

        let (promotions_tx, promotions) = mpsc::unbounded_channel();
        let tasks = vec![
            arena.inner.lobby.spawn_sweeper(promotions_tx),
            tokio::spawn(arena.clone().promotion_loop(promotions)),
            tokio::spawn(arena.clone().notice_loop(notices)),
        ];
        *arena.background() = tasks;
        arena
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn lobby(&self) -> &Matchmaker {
        &self.inner.lobby
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.inner.hub
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Starts a game between two humans.
    pub async fn create_session(
        &self,
        a: PlayerId,
        b: PlayerId,
    ) -> Result<SessionSnapshot, FourlineError> {
        self.start_session(a, b, None).await
    }

    /// Starts a game against the bot. `difficulty` defaults to the
    /// lobby's default.
    pub async fn create_bot_session(
        &self,
        player: PlayerId,
        difficulty: Option<Difficulty>,
    ) -> Result<SessionSnapshot, FourlineError> {
        let difficulty = difficulty.unwrap_or(self.inner.lobby.config().default_difficulty);
        self.start_session(player, PlayerId::BOT, Some(difficulty))
            .await
    }

    /// Current snapshot of a session. Falls back to the record store once
    /// the session has been evicted from memory.
    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionSnapshot, FourlineError> {
        match self.inner.registry.snapshot(session_id).await {
            Err(GameError::NotFound(_)) => self
                .inner
                .store
                .load_session(session_id)
                .await?
                .ok_or(FourlineError::Game(GameError::NotFound(session_id))),
            other => Ok(other?),
        }
    }

    /// The non-terminal session `player` sits in, if any.
    pub fn session_of(&self, player: PlayerId) -> Option<SessionId> {
        self.inner.registry.active_session_of(player)
    }

    pub async fn submit_move(
        &self,
        session_id: SessionId,
        player: PlayerId,
        column: usize,
    ) -> Result<SessionSnapshot, FourlineError> {
        Ok(self
            .inner
            .registry
            .submit_move(session_id, player, column)
            .await?)
    }

    /// Resigns: withdraws any queue ticket and abandons the player's
    /// active session. Returns `None` if there was no session.
    pub async fn quit(&self, player: PlayerId) -> Result<Option<SessionSnapshot>, FourlineError> {
        self.inner.lobby.cancel(player);
        let Some(session_id) = self.session_of(player) else {
            return Ok(None);
        };
        tracing::info!(%player, %session_id, "player quit");
        let snapshot = self
            .inner
            .registry
            .force_abandon(session_id, EndReason::Quit)
            .await?;
        Ok(Some(snapshot))
    }

    // -----------------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------------

    /// Queues `player` for a human opponent. Pairs at once if someone is
    /// waiting; otherwise the ticket is promoted to a bot game of
    /// `difficulty` after the match timeout.
    pub async fn join_queue(
        &self,
        player: PlayerId,
        difficulty: Option<Difficulty>,
    ) -> Result<JoinOutcome, FourlineError> {
        if let Some(current) = self.session_of(player) {
            return Err(GameError::AlreadyInSession(player, current).into());
        }

        let mut difficulty = difficulty;
        loop {
            let pairing = match self.inner.lobby.enqueue(player, difficulty)? {
                Enqueued::Waiting { position } => {
                    return Ok(JoinOutcome::Queued {
                        position,
                        timeout_ms: self.match_timeout_ms(),
                    });
                }
                Enqueued::Paired(pairing) => pairing,
            };

            let (first, second) = (pairing.first.player, pairing.second.player);
            match self.start_session(first, second, None).await {
                Ok(snapshot) => return Ok(JoinOutcome::Matched(snapshot)),
                // The waiting player entered a game some other way. Their
                // ticket is gone; the newcomer goes back in line.
                Err(FourlineError::Game(GameError::AlreadyInSession(busy, _))) if busy == first => {
                    tracing::debug!(stale = %busy, %player, "discarding stale ticket");
                    difficulty = Some(pairing.second.difficulty);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Withdraws `player`'s ticket. Idempotent.
    pub fn leave_queue(&self, player: PlayerId) -> bool {
        self.inner.lobby.cancel(player)
    }

    fn match_timeout_ms(&self) -> u64 {
        self.inner.lobby.config().match_timeout.as_millis() as u64
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Binds a connection's push channel. A player coming back to a running
    /// session also receives its current snapshot.
    pub async fn connect(&self, player: PlayerId, conn: ConnectionId, sender: Outbound) -> Attached {
        let attached = self.inner.hub.attach(player, conn, sender);
        if let Some(session_id) = attached.resumed {
            match self.inner.registry.snapshot(session_id).await {
                Ok(session) => {
                    let _ = self.inner.hub.send_to(
                        player,
                        ServerMessage::SessionState {
                            session: Some(session),
                        },
                    );
                }
                Err(e) => tracing::debug!(%player, %session_id, error = %e, "resumed session gone"),
            }
        }
        attached
    }

    /// Transport loss on `conn`. The player's ticket is withdrawn; a seat
    /// in a running session is kept for the reconnect grace period.
    pub fn disconnect(&self, player: PlayerId, conn: ConnectionId) {
        if self.inner.hub.detach(player, conn) {
            self.inner.lobby.cancel(player);
        }
    }

    /// Explicit goodbye: the player leaves the queue, resigns any active
    /// session and is forgotten by the hub.
    pub async fn close(&self, player: PlayerId) {
        if let Err(e) = self.quit(player).await {
            tracing::debug!(%player, error = %e, "quit on close failed");
        }
        self.inner.hub.close(player);
    }

    /// Stops the background tasks.
    pub fn shutdown(&self) {
        for task in self.background().drain(..) {
            task.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn start_session(
        &self,
        a: PlayerId,
        b: PlayerId,
        bot_difficulty: Option<Difficulty>,
    ) -> Result<SessionSnapshot, FourlineError> {
        let (handle, updates) = self.inner.registry.create(a, b, bot_difficulty)?;
        for p in [a, b] {
            self.inner.lobby.cancel(p);
        }
        self.inner
            .hub
            .bind_session(handle.session_id(), handle.players());
        tokio::spawn(self.clone().forward(handle.clone(), updates));
        Ok(handle.snapshot().await?)
    }

    /// Per-session forwarder. Runs until the session ends or its actor is
    /// evicted.
    ///
    /// Store writes go through one writer task per session so they land in
    /// mutation order without holding up the broadcasts.
    async fn forward(self, handle: SessionHandle, mut updates: UpdateReceiver) {
        let session_id = handle.session_id();
        let hub = &self.inner.hub;
        let (writes, pending) = mpsc::unbounded_channel();
        let writer = tokio::spawn(store_writer(Arc::clone(&self.inner.store), session_id, pending));

        while let Some(update) = updates.recv().await {
            match update {
                SessionUpdate::Started(session) => {
                    hub.broadcast(
                        session_id,
                        ServerMessage::SessionStarted {
                            session: session.clone(),
                        },
                    );
                    self.publish(AnalyticsKind::GameStarted, session_id, session.players[0]);
                    let _ = writes.send(StoreWrite::Session(session));
                }
                SessionUpdate::MoveApplied { snapshot, record } => {
                    hub.broadcast(
                        session_id,
                        ServerMessage::StateUpdated {
                            session: snapshot,
                            last_move: record,
                        },
                    );
                    self.publish(AnalyticsKind::MoveMade, session_id, record.player);
                    let _ = writes.send(StoreWrite::Move(record));
                }
                SessionUpdate::Ended(session) => {
                    hub.broadcast(
                        session_id,
                        ServerMessage::SessionEnded {
                            session: session.clone(),
                        },
                    );
                    tracing::info!(
                        %session_id,
                        status = ?session.status,
                        reason = ?session.end_reason,
                        winner = ?session.winner,
                        moves = session.moves.len(),
                        "session ended"
                    );
                    let actor = session
                        .winner
                        .or_else(|| session.moves.last().map(|m| m.player))
                        .unwrap_or(session.players[0]);
                    self.publish(AnalyticsKind::GameCompleted, session_id, actor);
                    for write in result_writes(&session) {
                        let _ = writes.send(write);
                    }
                    let _ = writes.send(StoreWrite::Session(session));
                    break;
                }
            }
        }

        hub.unbind_session(session_id);
        drop(writes);
        if let Err(e) = writer.await {
            tracing::warn!(%session_id, error = %e, "store writer task failed");
        }
    }

    fn publish(&self, kind: AnalyticsKind, session_id: SessionId, actor: PlayerId) {
        self.inner.analytics.publish(AnalyticsEvent {
            kind,
            session_id,
            actor,
            timestamp: now_ms(),
        });
    }

    /// Turns timed-out tickets into bot games.
    async fn promotion_loop(self, mut promotions: mpsc::UnboundedReceiver<Ticket>) {
        while let Some(ticket) = promotions.recv().await {
            let player = ticket.player;
            match self
                .start_session(player, PlayerId::BOT, Some(ticket.difficulty))
                .await
            {
                Ok(session) => tracing::info!(
                    %player,
                    session_id = %session.session_id,
                    difficulty = %ticket.difficulty,
                    "bot game started after match timeout"
                ),
                Err(e) => tracing::warn!(%player, error = %e, "bot promotion failed"),
            }
        }
    }

    /// Abandons sessions whose player did not come back in time.
    async fn notice_loop(self, mut notices: NoticeReceiver) {
        while let Some(notice) = notices.recv().await {
            match notice {
                HubNotice::GraceExpired { player, session } => {
                    match self
                        .inner
                        .registry
                        .force_abandon(session, EndReason::Disconnected)
                        .await
                    {
                        Ok(_) => tracing::info!(%player, session_id = %session, "session abandoned after disconnect"),
                        Err(GameError::SessionNotActive(_) | GameError::NotFound(_)) => {
                            tracing::debug!(%player, session_id = %session, "session already over at grace expiry");
                        }
                        Err(e) => tracing::warn!(%player, session_id = %session, error = %e, "abandon after grace expiry failed"),
                    }
                }
            }
        }
    }

    fn background(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// One write to the record store, queued in session order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreWrite {
    Session(SessionSnapshot),
    Move(MoveRecord),
    Stats {
        player: PlayerId,
        won: bool,
        duration: Duration,
    },
}

/// Stats updates for a finished session. Abandoned sessions are stored
/// but do not count.
fn result_writes(session: &SessionSnapshot) -> Vec<StoreWrite> {
    if session.status != SessionStatus::Completed {
        return Vec::new();
    }
    let duration = Duration::from_millis(
        session
            .ended_at
            .unwrap_or(session.started_at)
            .saturating_sub(session.started_at),
    );
    session
        .humans()
        .map(|player| StoreWrite::Stats {
            player,
            won: session.winner == Some(player),
            duration,
        })
        .collect()
}

/// Applies one session's store writes in order. A failed write is logged
/// and skipped.
async fn store_writer<S: GameStore>(
    store: Arc<S>,
    session_id: SessionId,
    mut pending: mpsc::UnboundedReceiver<StoreWrite>,
) {
    while let Some(write) = pending.recv().await {
        match write {
            StoreWrite::Session(session) => {
                if let Err(e) = store.persist_session(&session).await {
                    tracing::warn!(%session_id, error = %e, "persist_session failed");
                }
            }
            StoreWrite::Move(record) => {
                if let Err(e) = store.persist_move(session_id, &record).await {
                    tracing::warn!(%session_id, ply = record.ply, error = %e, "persist_move failed");
                }
            }
            StoreWrite::Stats {
                player,
                won,
                duration,
            } => {
                if let Err(e) = store.upsert_player_stats(player, won, duration).await {
                    tracing::warn!(%player, %session_id, error = %e, "upsert_player_stats failed");
                }
            }
        }
    }
}
