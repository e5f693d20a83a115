//! Session actor: an isolated Tokio task that owns one [`GameSession`].
//!
//! The outside world talks to it through a [`SessionHandle`] (bounded
//! `mpsc` commands, `oneshot` replies). Every state change is published
//! as a [`SessionUpdate`] on an unbounded channel, in mutation order, and
//! the current status is mirrored into a `watch` channel so the registry
//! can read it without a round trip.
//!
//! When the turn passes to the bot seat, the actor runs the search on a
//! blocking thread alongside a cosmetic thinking pause, then feeds the
//! chosen column back into itself as a [`SessionCommand::BotMoved`]. That
//! move goes through the same `apply_player_move` path as a human move.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use fourline_engine::{Difficulty, SearchLimits, choose_move};
use fourline_protocol::{EndReason, MoveRecord, PlayerId, SessionId, SessionSnapshot, SessionStatus};
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::session::now_ms;
use crate::{GameConfig, GameError, GameSession};

/// A state change published by a session actor.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// The session moved to `InProgress`.
    Started(SessionSnapshot),
    /// A move was applied; the snapshot includes it.
    MoveApplied {
        snapshot: SessionSnapshot,
        record: MoveRecord,
    },
    /// The session reached a terminal status. Always the last update.
    Ended(SessionSnapshot),
}

impl SessionUpdate {
    pub fn snapshot(&self) -> &SessionSnapshot {
        match self {
            Self::Started(s) | Self::Ended(s) => s,
            Self::MoveApplied { snapshot, .. } => snapshot,
        }
    }
}

/// Receiving end of a session's update stream.
pub type UpdateReceiver = mpsc::UnboundedReceiver<SessionUpdate>;

/// Commands sent to a session actor through its channel.
pub(crate) enum SessionCommand {
    SubmitMove {
        player: PlayerId,
        column: usize,
        reply: oneshot::Sender<Result<SessionSnapshot, GameError>>,
    },

    Abandon {
        reason: EndReason,
        reply: oneshot::Sender<Result<SessionSnapshot, GameError>>,
    },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    /// Result of a bot search. `ply` is the log position the move was
    /// computed for; anything else is stale and dropped.
    BotMoved { ply: u32, column: usize },

    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone: an `mpsc::Sender` plus a `watch::Receiver`.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    players: [PlayerId; 2],
    sender: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Seat 0 (red) and seat 1 (yellow).
    pub fn players(&self) -> [PlayerId; 2] {
        self.players
    }

    /// Latest published status. Does not wait on the actor.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Submits `player`'s move and waits for the resulting snapshot.
    pub async fn submit_move(
        &self,
        player: PlayerId,
        column: usize,
    ) -> Result<SessionSnapshot, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SubmitMove {
            player,
            column,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GameError::Unavailable(self.session_id))?
    }

    /// Abandons the session unless it already ended.
    pub async fn abandon(&self, reason: EndReason) -> Result<SessionSnapshot, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Abandon { reason, reply }).await?;
        rx.await.map_err(|_| GameError::Unavailable(self.session_id))?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| GameError::Unavailable(self.session_id))
    }

    /// Stops the actor without waiting. Used on eviction.
    pub(crate) fn shutdown(&self) {
        let _ = self.sender.try_send(SessionCommand::Shutdown);
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), GameError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))
    }
}

/// A bot search in flight.
struct BotTask {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BotTask {
    fn stop(self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.handle.abort();
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct SessionActor {
    session: GameSession,
    config: GameConfig,
    receiver: mpsc::Receiver<SessionCommand>,
    /// Weak so the actor's own sender never keeps the channel open.
    loopback: mpsc::WeakSender<SessionCommand>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    status: watch::Sender<SessionStatus>,
    bot: Option<BotTask>,
}

impl SessionActor {
    async fn run(mut self) {
        let session_id = self.session.id();
        tracing::debug!(%session_id, "session actor started");

        match self.session.start(now_ms()) {
            Ok(()) => {
                self.publish_status();
                self.emit(SessionUpdate::Started(self.session.snapshot()));
                self.maybe_start_bot();
            }
            Err(e) => tracing::error!(%session_id, error = %e, "session failed to start"),
        }

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::SubmitMove {
                    player,
                    column,
                    reply,
                } => {
                    let result = if player.is_bot() {
                        Err(GameError::NotYourTurn(player))
                    } else {
                        self.apply(player, column)
                    };
                    let _ = reply.send(result);
                }
                SessionCommand::Abandon { reason, reply } => {
                    let _ = reply.send(self.abandon(reason));
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.session.snapshot());
                }
                SessionCommand::BotMoved { ply, column } => {
                    self.handle_bot_move(ply, column);
                }
                SessionCommand::Shutdown => break,
            }
        }

        self.stop_bot();
        tracing::debug!(%session_id, "session actor stopped");
    }

    /// Applies one move and publishes its consequences.
    fn apply(&mut self, player: PlayerId, column: usize) -> Result<SessionSnapshot, GameError> {
        let session_id = self.session.id();
        match self.session.apply_player_move(player, column, now_ms()) {
            Ok(record) => {
                let snapshot = self.session.snapshot();
                tracing::debug!(%session_id, %player, column, row = record.row, "move applied");
                self.emit(SessionUpdate::MoveApplied {
                    snapshot: snapshot.clone(),
                    record,
                });
                if snapshot.status.is_terminal() {
                    self.on_terminal(&snapshot);
                } else {
                    self.maybe_start_bot();
                }
                Ok(snapshot)
            }
            Err(GameError::Corrupted(id)) => {
                tracing::error!(
                    session_id = %id,
                    %player,
                    column,
                    "board integrity check failed, abandoning session"
                );
                let snapshot = self.session.snapshot();
                self.on_terminal(&snapshot);
                Err(GameError::Corrupted(id))
            }
            Err(e) => {
                tracing::debug!(%session_id, %player, column, error = %e, "move rejected");
                Err(e)
            }
        }
    }

    fn abandon(&mut self, reason: EndReason) -> Result<SessionSnapshot, GameError> {
        if !self.session.force_abandon(reason, now_ms()) {
            return Err(GameError::SessionNotActive(self.session.id()));
        }
        let snapshot = self.session.snapshot();
        self.on_terminal(&snapshot);
        Ok(snapshot)
    }

    fn handle_bot_move(&mut self, ply: u32, column: usize) {
        let expected = self.session.move_count() as u32 + 1;
        if ply != expected || self.session.player_to_move() != Some(PlayerId::BOT) {
            tracing::debug!(
                session_id = %self.session.id(),
                ply,
                expected,
                "dropping stale bot move"
            );
            return;
        }
        self.bot = None;
        if let Err(e) = self.apply(PlayerId::BOT, column) {
            tracing::error!(session_id = %self.session.id(), column, error = %e, "bot move rejected");
        }
    }

    fn on_terminal(&mut self, snapshot: &SessionSnapshot) {
        self.stop_bot();
        self.publish_status();
        self.emit(SessionUpdate::Ended(snapshot.clone()));
    }

    /// Starts a bot search if the bot is to move and none is running.
    fn maybe_start_bot(&mut self) {
        if self.bot.is_some() || self.session.player_to_move() != Some(PlayerId::BOT) {
            return;
        }
        let Some(loopback) = self.loopback.upgrade() else {
            return;
        };

        let session_id = self.session.id();
        let board = self.session.board().clone();
        let disc = self.session.turn();
        let difficulty = self.session.bot_difficulty().unwrap_or_default();
        let ply = self.session.move_count() as u32 + 1;
        let limits = SearchLimits::for_difficulty(difficulty).with_budget(self.config.bot_budget);
        let pause = self.config.bot_pacing.then(|| think_delay(difficulty));

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = tokio::spawn(async move {
            let search = tokio::task::spawn_blocking(move || {
                choose_move(&board, disc, limits, Some(&flag))
            });
            let thinking = async {
                if let Some(pause) = pause {
                    tokio::time::sleep(pause).await;
                }
            };
            let (result, ()) = tokio::join!(search, thinking);

            match result {
                Ok(Some(outcome)) => {
                    let _ = loopback
                        .send(SessionCommand::BotMoved {
                            ply,
                            column: outcome.column,
                        })
                        .await;
                }
                Ok(None) => tracing::warn!(%session_id, "bot found no legal move"),
                Err(e) => tracing::error!(%session_id, error = %e, "bot search task failed"),
            }
        });

        self.bot = Some(BotTask { cancel, handle });
    }

    fn stop_bot(&mut self) {
        if let Some(bot) = self.bot.take() {
            bot.stop();
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(self.session.status());
    }

    /// Publishes an update. A dropped receiver just means nobody is
    /// listening any more.
    fn emit(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }
}

/// Samples the thinking pause for one bot move.
fn think_delay(difficulty: Difficulty) -> Duration {
    let (lo, hi) = difficulty.think_delay();
    rand::rng().random_range(lo..=hi)
}

/// Spawns a session actor and returns its handle and update stream.
///
/// The actor starts the session immediately, so the first update on the
/// stream is always [`SessionUpdate::Started`].
pub(crate) fn spawn_session(
    session: GameSession,
    config: GameConfig,
) -> (SessionHandle, UpdateReceiver) {
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(session.status());

    let handle = SessionHandle {
        session_id: session.id(),
        players: session.players(),
        sender: tx.clone(),
        status: status_rx,
    };

    let actor = SessionActor {
        session,
        config,
        receiver: rx,
        loopback: tx.downgrade(),
        updates: updates_tx,
        status: status_tx,
        bot: None,
    };

    tokio::spawn(actor.run());

    (handle, updates_rx)
}
