//! External collaborators: the durable record store and the analytics
//! stream.
//!
//! Both are consumed through narrow traits. The server calls them on
//! spawned tasks after a session update has been broadcast, so a slow or
//! failing collaborator never holds up a game.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use fourline_protocol::{MoveRecord, PlayerId, SessionId, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// GameStore
// ---------------------------------------------------------------------------

/// Errors reported by a [`GameStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record store rejected write: {0}")]
    Rejected(String),
}

/// Durable record store for sessions, moves and player statistics.
pub trait GameStore: Send + Sync + 'static {
    /// Inserts or replaces the stored copy of a session.
    fn persist_session(
        &self,
        snapshot: &SessionSnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Appends one move to a session's stored log.
    fn persist_move(
        &self,
        session_id: SessionId,
        record: &MoveRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Folds one finished game into a player's totals.
    fn upsert_player_stats(
        &self,
        player: PlayerId,
        won: bool,
        duration: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The last persisted copy of a session.
    fn load_session(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Option<SessionSnapshot>, StoreError>> + Send;
}

/// Aggregated results for one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub games: u32,
    pub wins: u32,
    pub total_duration: Duration,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, SessionSnapshot>,
    moves: HashMap<SessionId, Vec<MoveRecord>>,
    stats: HashMap<PlayerId, PlayerStats>,
}

/// In-process [`GameStore`]. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, player: PlayerId) -> Option<PlayerStats> {
        self.lock().stats.get(&player).copied()
    }

    /// Moves persisted for a session, in arrival order.
    pub fn moves(&self, session_id: SessionId) -> Vec<MoveRecord> {
        self.lock().moves.get(&session_id).cloned().unwrap_or_default()
    }

    pub fn session(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        self.lock().sessions.get(&session_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GameStore for MemoryStore {
    async fn persist_session(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.lock()
            .sessions
            .insert(snapshot.session_id, snapshot.clone());
        Ok(())
    }

    async fn persist_move(&self, session_id: SessionId, record: &MoveRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        let log = state.moves.entry(session_id).or_default();
        // Writes may land out of order; the log is kept sorted by ply and
        // a replayed ply is ignored.
        match log.binary_search_by_key(&record.ply, |m| m.ply) {
            Ok(_) => {}
            Err(idx) => log.insert(idx, record.clone()),
        }
        Ok(())
    }

    async fn upsert_player_stats(
        &self,
        player: PlayerId,
        won: bool,
        duration: Duration,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let stats = state.stats.entry(player).or_default();
        stats.games += 1;
        if won {
            stats.wins += 1;
        }
        stats.total_duration += duration;
        Ok(())
    }

    async fn load_session(&self, session_id: SessionId) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.session(session_id))
    }
}

// ---------------------------------------------------------------------------
// AnalyticsSink
// ---------------------------------------------------------------------------

/// Analytics event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    GameStarted,
    MoveMade,
    GameCompleted,
}

/// One fire-and-forget analytics record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub kind: AnalyticsKind,
    pub session_id: SessionId,
    /// Who caused the event: the mover, the first player, or the winner.
    pub actor: PlayerId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Best-effort analytics stream. `publish` must not block.
pub trait AnalyticsSink: Send + Sync + 'static {
    fn publish(&self, event: AnalyticsEvent);
}

/// Writes events to the `tracing` log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn publish(&self, event: AnalyticsEvent) {
        tracing::debug!(
            kind = ?event.kind,
            session_id = %event.session_id,
            actor = %event.actor,
            timestamp = event.timestamp,
            "analytics event"
        );
    }
}

/// Forwards events into an unbounded channel for an external pump.
#[derive(Debug, Clone)]
pub struct ChannelAnalytics {
    sender: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl ChannelAnalytics {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (sender, rx) = mpsc::unbounded_channel();
        (Self { sender }, rx)
    }
}

impl AnalyticsSink for ChannelAnalytics {
    fn publish(&self, event: AnalyticsEvent) {
        // A closed pump just drops events.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use fourline_engine::Disc;

    use super::*;

    fn record(ply: u32, column: usize) -> MoveRecord {
        MoveRecord {
            ply,
            column,
            row: 0,
            player: PlayerId(1),
            disc: Disc::Red,
            at: 0,
        }
    }

    #[tokio::test]
    async fn test_memory_store_stats_accumulate() {
        let store = MemoryStore::new();
        store
            .upsert_player_stats(PlayerId(1), true, Duration::from_secs(10))
            .await
            .unwrap();
        store
            .upsert_player_stats(PlayerId(1), false, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            store.stats(PlayerId(1)),
            Some(PlayerStats {
                games: 2,
                wins: 1,
                total_duration: Duration::from_secs(15),
            })
        );
        assert_eq!(store.stats(PlayerId(2)), None);
    }

    #[tokio::test]
    async fn test_memory_store_moves_sorted_and_deduplicated() {
        let store = MemoryStore::new();
        let id = SessionId(1);
        store.persist_move(id, &record(2, 4)).await.unwrap();
        store.persist_move(id, &record(1, 3)).await.unwrap();
        store.persist_move(id, &record(2, 4)).await.unwrap();
        let plies: Vec<u32> = store.moves(id).iter().map(|m| m.ply).collect();
        assert_eq!(plies, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_memory_store_load_missing_session_is_none() {
        let store = MemoryStore::new();
        assert!(store.load_session(SessionId(5)).await.unwrap().is_none());
    }

    #[test]
    fn test_channel_analytics_forwards_events() {
        let (sink, mut rx) = ChannelAnalytics::new();
        let event = AnalyticsEvent {
            kind: AnalyticsKind::MoveMade,
            session_id: SessionId(4),
            actor: PlayerId(2),
            timestamp: 99,
        };
        sink.publish(event.clone());
        assert_eq!(rx.try_recv().unwrap(), event);

        drop(rx);
        sink.publish(event);
    }

    #[test]
    fn test_analytics_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&AnalyticsKind::GameCompleted).unwrap(),
            "\"game_completed\""
        );
    }
}
