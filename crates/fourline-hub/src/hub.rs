//! The connection hub: who is connected, through which channel, and in
//! which session.
//!
//! Every record lives under one `std::sync::Mutex`, which is never held
//! across an `.await`. Attach, detach and grace expiry are serialised on
//! that lock, and each detach bumps the record's generation: an expiry
//! timer only fires if the record is still detached at the generation it
//! was started for, so a reconnect always beats a pending deadline.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use fourline_protocol::{PlayerId, ServerMessage, SessionId};
use fourline_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{HubConfig, HubError};

/// Push channel to one connection's writer task.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Receiving end of the hub's notices.
pub type NoticeReceiver = mpsc::UnboundedReceiver<HubNotice>;

/// Something the hub decided on its own that its owner must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubNotice {
    /// `player` did not come back within the grace period.
    GraceExpired { player: PlayerId, session: SessionId },
}

/// Result of [`ConnectionHub::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attached {
    /// The session the player is seated in, if any.
    pub resumed: Option<SessionId>,
    /// The player was detached and came back within the grace period.
    pub reconnected: bool,
    /// An older connection that this one replaced.
    pub superseded: Option<ConnectionId>,
    /// Buffered events delivered on attach.
    pub flushed: usize,
}

enum Link {
    Connected { conn: ConnectionId, sender: Outbound },
    Detached { since: Instant },
    /// Seated in a session but not connected yet.
    Pending,
}

impl Link {
    fn is_offline(&self) -> bool {
        matches!(self, Link::Detached { .. } | Link::Pending)
    }
}

struct Record {
    link: Link,
    generation: u64,
    buffer: VecDeque<ServerMessage>,
    last_seen: Instant,
    grace: Option<JoinHandle<()>>,
}

impl Record {
    /// Sends `msg` live, or buffers it if the player is not reachable.
    /// Returns `true` if it went out live.
    fn deliver(&mut self, msg: ServerMessage, cap: usize) -> bool {
        let msg = match &self.link {
            Link::Connected { sender, .. } => match sender.send(msg) {
                Ok(()) => return true,
                // Writer is gone; the detach for it is on its way.
                Err(mpsc::error::SendError(msg)) => msg,
            },
            Link::Detached { .. } | Link::Pending => msg,
        };

        if cap == 0 {
            return false;
        }
        if self.buffer.len() >= cap {
            self.buffer.pop_front();
            tracing::debug!(cap, "event buffer full, dropping oldest event");
        }
        self.buffer.push_back(msg);
        false
    }

    fn flush(&mut self) -> usize {
        let Link::Connected { sender, .. } = &self.link else {
            return 0;
        };
        let mut sent = 0;
        while let Some(msg) = self.buffer.pop_front() {
            if sender.send(msg).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }

    fn cancel_grace(&mut self) {
        if let Some(timer) = self.grace.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct HubState {
    records: HashMap<PlayerId, Record>,
    /// Seats of every bound session.
    sessions: HashMap<SessionId, [PlayerId; 2]>,
    /// Reverse index of `sessions` for human seats.
    seats: HashMap<PlayerId, SessionId>,
}

impl HubState {
    fn deliver(&mut self, player: PlayerId, msg: ServerMessage, cap: usize) -> bool {
        match self.records.get_mut(&player) {
            Some(record) => record.deliver(msg, cap),
            None => false,
        }
    }

    fn notify_opponent(&mut self, session: SessionId, player: PlayerId, msg: ServerMessage, cap: usize) {
        let Some(players) = self.sessions.get(&session).copied() else {
            return;
        };
        for other in players {
            if other != player && !other.is_bot() {
                self.deliver(other, msg.clone(), cap);
            }
        }
    }
}

/// Maps player identities to live push channels and session seats.
///
/// Cheap to clone; clones share the same records.
#[derive(Clone)]
pub struct ConnectionHub {
    state: Arc<Mutex<HubState>>,
    config: HubConfig,
    notices: mpsc::UnboundedSender<HubNotice>,
}

impl ConnectionHub {
    /// Creates an empty hub and the receiver for its notices.
    pub fn new(config: HubConfig) -> (Self, NoticeReceiver) {
        let (notices, rx) = mpsc::unbounded_channel();
        let hub = Self {
            state: Arc::new(Mutex::new(HubState::default())),
            config,
            notices,
        };
        (hub, rx)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Binds `sender` as `player`'s push channel.
    ///
    /// Replaces any previous connection, cancels a running grace timer and
    /// flushes buffered events into `sender`. If the player was detached
    /// from a session, their opponent is told they are back.
    pub fn attach(&self, player: PlayerId, conn: ConnectionId, sender: Outbound) -> Attached {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;
        let session = state.seats.get(&player).copied();
        let link = Link::Connected { conn, sender };

        let (reconnected, superseded, flushed) = match state.records.get_mut(&player) {
            Some(record) => {
                let previous = std::mem::replace(&mut record.link, link);
                record.generation += 1;
                record.last_seen = now;
                record.cancel_grace();
                let flushed = record.flush();
                match previous {
                    Link::Detached { since } => {
                        tracing::info!(
                            player_id = %player,
                            %conn,
                            away_ms = now.duration_since(since).as_millis() as u64,
                            flushed,
                            "player reattached"
                        );
                        (true, None, flushed)
                    }
                    Link::Pending => {
                        tracing::info!(player_id = %player, %conn, flushed, "player attached to waiting seat");
                        (false, None, flushed)
                    }
                    Link::Connected { conn: old, .. } => {
                        let superseded = (old != conn).then_some(old);
                        if let Some(old) = superseded {
                            tracing::info!(player_id = %player, %conn, superseded = %old, "connection superseded");
                        }
                        (false, superseded, flushed)
                    }
                }
            }
            None => {
                state.records.insert(
                    player,
                    Record {
                        link,
                        generation: 0,
                        buffer: VecDeque::new(),
                        last_seen: now,
                        grace: None,
                    },
                );
                tracing::info!(player_id = %player, %conn, "player attached");
                (false, None, 0)
            }
        };

        if reconnected {
            if let Some(session_id) = session {
                state.notify_opponent(
                    session_id,
                    player,
                    ServerMessage::OpponentReconnected {
                        session_id,
                        player_id: player,
                    },
                    self.config.max_buffered_events,
                );
            }
        }

        Attached {
            resumed: session,
            reconnected,
            superseded,
            flushed,
        }
    }

    /// Handles transport loss on `conn`.
    ///
    /// Returns `false` if `conn` is not the player's current connection
    /// (already superseded or closed). A player seated in a session keeps
    /// the seat for `reconnect_grace` and their opponent is told; anyone
    /// else is removed at once.
    pub fn detach(&self, player: PlayerId, conn: ConnectionId) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let session = state.seats.get(&player).copied();
        let Some(record) = state.records.get_mut(&player) else {
            return false;
        };
        match &record.link {
            Link::Connected { conn: current, .. } if *current == conn => {}
            _ => {
                tracing::debug!(player_id = %player, %conn, "ignoring detach of stale connection");
                return false;
            }
        }

        let Some(session_id) = session else {
            state.records.remove(&player);
            tracing::info!(player_id = %player, %conn, "player disconnected");
            return true;
        };

        let grace = self.config.reconnect_grace;
        record.link = Link::Detached {
            since: Instant::now(),
        };
        record.generation += 1;
        record.cancel_grace();
        record.grace = Some(self.spawn_grace_timer(player, session_id, record.generation));

        tracing::info!(
            player_id = %player,
            %session_id,
            grace_ms = grace.as_millis() as u64,
            "player detached, grace period started"
        );
        state.notify_opponent(
            session_id,
            player,
            ServerMessage::OpponentDisconnected {
                session_id,
                player_id: player,
                grace_ms: grace.as_millis() as u64,
            },
            self.config.max_buffered_events,
        );
        true
    }

    /// Explicit close: removes the record and cancels any grace timer.
    /// The session seat, if any, is left for the caller to resolve.
    pub fn close(&self, player: PlayerId) -> bool {
        let removed = self.lock().records.remove(&player);
        match removed {
            Some(mut record) => {
                record.cancel_grace();
                tracing::info!(player_id = %player, "player closed connection");
                true
            }
            None => false,
        }
    }

    /// Seats `players` in `session` so broadcasts reach them. A seat whose
    /// player has not connected yet buffers events until they attach.
    pub fn bind_session(&self, session: SessionId, players: [PlayerId; 2]) {
        let now = Instant::now();
        let mut state = self.lock();
        state.sessions.insert(session, players);
        for p in players.into_iter().filter(|p| !p.is_bot()) {
            state.seats.insert(p, session);
            state.records.entry(p).or_insert_with(|| Record {
                link: Link::Pending,
                generation: 0,
                buffer: VecDeque::new(),
                last_seen: now,
                grace: None,
            });
        }
    }

    /// Releases `session`'s seats. Detached and never-connected seats lose
    /// their buffered events and their record.
    pub fn unbind_session(&self, session: SessionId) -> bool {
        let mut state = self.lock();
        let Some(players) = state.sessions.remove(&session) else {
            return false;
        };
        for p in players.into_iter().filter(|p| !p.is_bot()) {
            if state.seats.get(&p) == Some(&session) {
                state.seats.remove(&p);
            }
            let offline = state.records.get(&p).is_some_and(|r| r.link.is_offline());
            if offline {
                if let Some(mut record) = state.records.remove(&p) {
                    record.cancel_grace();
                    tracing::debug!(
                        player_id = %p,
                        %session,
                        dropped = record.buffer.len(),
                        "dropping offline seat of finished session"
                    );
                }
            }
        }
        true
    }

    /// Sends `msg` to both seats of `session`, buffering it for a detached
    /// seat. Returns how many seats received it live.
    pub fn broadcast(&self, session: SessionId, msg: ServerMessage) -> usize {
        let cap = self.config.max_buffered_events;
        let mut state = self.lock();
        let Some(players) = state.sessions.get(&session).copied() else {
            return 0;
        };
        players
            .into_iter()
            .filter(|p| !p.is_bot())
            .filter(|p| state.deliver(*p, msg.clone(), cap))
            .count()
    }

    /// Sends `msg` to one player, buffering it if they are detached.
    ///
    /// # Errors
    /// [`HubError::NotConnected`] if the player has no record.
    pub fn send_to(&self, player: PlayerId, msg: ServerMessage) -> Result<(), HubError> {
        let cap = self.config.max_buffered_events;
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&player)
            .ok_or(HubError::NotConnected(player))?;
        record.deliver(msg, cap);
        Ok(())
    }

    /// Records inbound activity from `player`.
    pub fn touch(&self, player: PlayerId) {
        if let Some(record) = self.lock().records.get_mut(&player) {
            record.last_seen = Instant::now();
        }
    }

    pub fn last_seen(&self, player: PlayerId) -> Option<Instant> {
        self.lock().records.get(&player).map(|r| r.last_seen)
    }

    /// The session `player` is seated in, if any.
    pub fn session_of(&self, player: PlayerId) -> Option<SessionId> {
        self.lock().seats.get(&player).copied()
    }

    /// Whether `player` currently has a live connection.
    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.lock()
            .records
            .get(&player)
            .is_some_and(|r| matches!(r.link, Link::Connected { .. }))
    }

    /// Whether `player` has a record at all (connected, inside a grace
    /// period, or seated and not yet connected).
    pub fn is_known(&self, player: PlayerId) -> bool {
        self.lock().records.contains_key(&player)
    }

    /// Number of records, connected or not.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_grace_timer(&self, player: PlayerId, session: SessionId, generation: u64) -> JoinHandle<()> {
        let hub = self.clone();
        let grace = self.config.reconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            hub.expire(player, session, generation);
        })
    }

    fn expire(&self, player: PlayerId, session: SessionId, generation: u64) {
        let expired = {
            let mut state = self.lock();
            let current = state.records.get(&player).is_some_and(|r| {
                r.generation == generation && matches!(r.link, Link::Detached { .. })
            });
            if current {
                state.records.remove(&player);
            }
            current
        };
        if !expired {
            return;
        }

        tracing::warn!(player_id = %player, session_id = %session, "reconnect grace expired");
        let _ = self.notices.send(HubNotice::GraceExpired { player, session });
    }

    // Poisoning is ignored: no update leaves the maps half-written.
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn hub() -> ConnectionHub {
        ConnectionHub::new(HubConfig::default()).0
    }

    #[tokio::test]
    async fn test_attach_new_player_not_resumed() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        let attached = hub.attach(pid(1), ConnectionId::new(1), tx);
        assert_eq!(
            attached,
            Attached {
                resumed: None,
                reconnected: false,
                superseded: None,
                flushed: 0,
            }
        );
        assert!(hub.is_connected(pid(1)));
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_without_session_removes_record() {
        let hub = hub();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.attach(pid(1), ConnectionId::new(1), tx);
        assert!(hub.detach(pid(1), ConnectionId::new(1)));
        assert!(!hub.is_known(pid(1)));
    }

    #[tokio::test]
    async fn test_detach_unknown_player_returns_false() {
        let hub = hub();
        assert!(!hub.detach(pid(9), ConnectionId::new(1)));
    }

    #[tokio::test]
    async fn test_send_to_unknown_player_not_connected() {
        let hub = hub();
        assert_eq!(
            hub.send_to(pid(3), ServerMessage::QueueLeft),
            Err(HubError::NotConnected(pid(3)))
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_bot_seat() {
        let hub = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach(pid(1), ConnectionId::new(1), tx);
        hub.bind_session(SessionId(5), [PlayerId::BOT, pid(1)]);

        assert_eq!(hub.broadcast(SessionId(5), ServerMessage::QueueLeft), 1);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::QueueLeft);
        assert_eq!(hub.session_of(pid(1)), Some(SessionId(5)));
        assert_eq!(hub.session_of(PlayerId::BOT), None);
    }

    #[tokio::test]
    async fn test_bind_session_buffers_for_unconnected_seat() {
        let hub = hub();
        hub.bind_session(SessionId(6), [pid(1), pid(2)]);
        assert!(hub.is_known(pid(1)));
        assert!(!hub.is_connected(pid(1)));

        assert_eq!(hub.broadcast(SessionId(6), ServerMessage::QueueLeft), 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let attached = hub.attach(pid(1), ConnectionId::new(1), tx);
        assert_eq!(attached.resumed, Some(SessionId(6)));
        assert!(!attached.reconnected);
        assert_eq!(attached.flushed, 1);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::QueueLeft);
    }

    #[tokio::test]
    async fn test_first_attach_to_waiting_seat_does_not_notify_opponent() {
        let hub = hub();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach(pid(2), ConnectionId::new(2), tx2);
        hub.bind_session(SessionId(6), [pid(1), pid(2)]);

        let (tx1, _rx1) = mpsc::unbounded_channel();
        hub.attach(pid(1), ConnectionId::new(1), tx1);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unbind_session_drops_unconnected_seat() {
        let hub = hub();
        hub.bind_session(SessionId(6), [pid(1), PlayerId::BOT]);
        assert!(hub.unbind_session(SessionId(6)));
        assert!(!hub.is_known(pid(1)));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_unknown_session_reaches_nobody() {
        let hub = hub();
        assert_eq!(hub.broadcast(SessionId(77), ServerMessage::QueueLeft), 0);
    }
}
