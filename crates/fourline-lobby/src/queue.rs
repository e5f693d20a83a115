//! The matchmaking queue.
//!
//! Every operation runs under one mutex, which makes the queue
//! linearizable: a ticket leaves exactly once, by pairing, by promotion to
//! a bot game, or by cancellation. The lock is never held across an
//! `.await`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use fourline_engine::Difficulty;
use fourline_protocol::PlayerId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{LobbyConfig, LobbyError};

/// One player waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub player: PlayerId,
    /// Bot difficulty used if the ticket times out.
    pub difficulty: Difficulty,
    pub enqueued_at: Instant,
}

/// Two tickets matched together. `first` is the older one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub first: Ticket,
    pub second: Ticket,
}

/// Outcome of [`Matchmaker::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// The ticket is waiting at `position` (1 = next to be paired).
    Waiting { position: usize },
    /// Two tickets were paired and removed from the queue.
    Paired(Pairing),
}

#[derive(Default)]
struct QueueState {
    tickets: VecDeque<Ticket>,
    queued: HashSet<PlayerId>,
}

impl QueueState {
    fn remove(&mut self, player: PlayerId) -> Option<Ticket> {
        if !self.queued.remove(&player) {
            return None;
        }
        let idx = self.tickets.iter().position(|t| t.player == player)?;
        self.tickets.remove(idx)
    }

    fn pop_front(&mut self) -> Option<Ticket> {
        let ticket = self.tickets.pop_front()?;
        self.queued.remove(&ticket.player);
        Some(ticket)
    }
}

/// FIFO matchmaking queue with timeout-driven bot promotion.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct Matchmaker {
    state: Arc<Mutex<QueueState>>,
    config: LobbyConfig,
}

impl Matchmaker {
    pub fn new(config: LobbyConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            config,
        }
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Adds a ticket for `player`, pairing the two oldest tickets if two
    /// are now waiting.
    ///
    /// # Errors
    /// - [`LobbyError::AlreadyQueued`] if `player` already holds a ticket
    /// - [`LobbyError::InvalidPlayer`] for the bot identity
    pub fn enqueue(
        &self,
        player: PlayerId,
        difficulty: Option<Difficulty>,
    ) -> Result<Enqueued, LobbyError> {
        if player.is_bot() {
            return Err(LobbyError::InvalidPlayer(player));
        }

        let mut state = self.lock();
        if !state.queued.insert(player) {
            return Err(LobbyError::AlreadyQueued(player));
        }
        state.tickets.push_back(Ticket {
            player,
            difficulty: difficulty.unwrap_or(self.config.default_difficulty),
            enqueued_at: Instant::now(),
        });

        if state.tickets.len() >= 2 {
            if let (Some(first), Some(second)) = (state.pop_front(), state.pop_front()) {
                tracing::info!(
                    first = %first.player,
                    second = %second.player,
                    waited_ms = first.enqueued_at.elapsed().as_millis() as u64,
                    "players paired"
                );
                return Ok(Enqueued::Paired(Pairing { first, second }));
            }
        }

        let position = state.tickets.len();
        tracing::debug!(%player, position, "player queued");
        Ok(Enqueued::Waiting { position })
    }

    /// Removes `player`'s ticket. Returns `false` if there was none, so
    /// calling it twice is harmless.
    pub fn cancel(&self, player: PlayerId) -> bool {
        let removed = self.lock().remove(player).is_some();
        if removed {
            tracing::debug!(%player, "ticket cancelled");
        }
        removed
    }

    /// Removes and returns every ticket that has waited at least
    /// `match_timeout` as of `now`, oldest first.
    pub fn sweep(&self, now: Instant) -> Vec<Ticket> {
        let timeout = self.config.match_timeout;
        let mut state = self.lock();
        let mut expired = Vec::new();
        // Tickets are in enqueue order, so expired ones form a prefix.
        while state
            .tickets
            .front()
            .is_some_and(|t| now.saturating_duration_since(t.enqueued_at) >= timeout)
        {
            if let Some(ticket) = state.pop_front() {
                expired.push(ticket);
            }
        }
        expired
    }

    /// 1-based queue position of `player`.
    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.lock()
            .tickets
            .iter()
            .position(|t| t.player == player)
            .map(|i| i + 1)
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.lock().queued.contains(&player)
    }

    pub fn len(&self) -> usize {
        self.lock().tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval` and sends each
    /// expired ticket to `promotions`. Stops once the receiver is dropped.
    pub fn spawn_sweeper(&self, promotions: mpsc::UnboundedSender<Ticket>) -> JoinHandle<()> {
        let queue = self.clone();
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let now = ticker.tick().await;
                if promotions.is_closed() {
                    break;
                }
                for ticket in queue.sweep(now) {
                    tracing::info!(
                        player = %ticket.player,
                        difficulty = %ticket.difficulty,
                        "match timeout, promoting to bot game"
                    );
                    if promotions.send(ticket).is_err() {
                        return;
                    }
                }
            }
        })
    }

    // Poisoning is ignored: no update leaves the queue half-written.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn matchmaker() -> Matchmaker {
        Matchmaker::new(LobbyConfig::default())
    }

    #[tokio::test]
    async fn test_enqueue_first_player_waits() {
        let mm = matchmaker();
        assert_eq!(
            mm.enqueue(pid(1), None).unwrap(),
            Enqueued::Waiting { position: 1 }
        );
        assert_eq!(mm.len(), 1);
        assert_eq!(mm.position(pid(1)), Some(1));
    }

    #[tokio::test]
    async fn test_enqueue_second_player_pairs_fifo() {
        let mm = matchmaker();
        mm.enqueue(pid(1), Some(Difficulty::Hard)).unwrap();
        match mm.enqueue(pid(2), None).unwrap() {
            Enqueued::Paired(p) => {
                assert_eq!(p.first.player, pid(1));
                assert_eq!(p.first.difficulty, Difficulty::Hard);
                assert_eq!(p.second.player, pid(2));
                assert_eq!(p.second.difficulty, Difficulty::Medium);
            }
            other => panic!("expected pairing, got {other:?}"),
        }
        assert!(mm.is_empty());
        assert!(!mm.contains(pid(1)));
    }

    #[tokio::test]
    async fn test_enqueue_twice_already_queued() {
        let mm = matchmaker();
        mm.enqueue(pid(1), None).unwrap();
        assert_eq!(
            mm.enqueue(pid(1), None),
            Err(LobbyError::AlreadyQueued(pid(1)))
        );
        assert_eq!(mm.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_bot_rejected() {
        let mm = matchmaker();
        assert_eq!(
            mm.enqueue(PlayerId::BOT, None),
            Err(LobbyError::InvalidPlayer(PlayerId::BOT))
        );
    }

    #[tokio::test]
    async fn test_enqueue_after_pairing_allowed_again() {
        let mm = matchmaker();
        mm.enqueue(pid(1), None).unwrap();
        mm.enqueue(pid(2), None).unwrap();
        assert_eq!(
            mm.enqueue(pid(1), None).unwrap(),
            Enqueued::Waiting { position: 1 }
        );
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mm = matchmaker();
        mm.enqueue(pid(1), None).unwrap();
        assert!(mm.cancel(pid(1)));
        assert!(!mm.cancel(pid(1)));
        assert!(!mm.cancel(pid(9)));
        assert!(mm.is_empty());
        // The cancelled player can no longer be paired.
        assert_eq!(
            mm.enqueue(pid(2), None).unwrap(),
            Enqueued::Waiting { position: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_returns_only_expired_tickets() {
        let mm = matchmaker();
        mm.enqueue(pid(1), Some(Difficulty::Easy)).unwrap();

        assert!(mm.sweep(Instant::now() + Duration::from_secs(9)).is_empty());
        assert!(mm.contains(pid(1)));

        let expired = mm.sweep(Instant::now() + Duration::from_secs(10));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].player, pid(1));
        assert_eq!(expired[0].difficulty, Difficulty::Easy);
        assert!(mm.is_empty());

        // A ticket leaves exactly once.
        assert!(mm.sweep(Instant::now() + Duration::from_secs(60)).is_empty());
        assert!(!mm.cancel(pid(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_younger_tickets_in_order() {
        let mm = Matchmaker::new(LobbyConfig {
            match_timeout: Duration::from_secs(10),
            ..LobbyConfig::default()
        });
        mm.enqueue(pid(1), None).unwrap();
        assert!(matches!(mm.enqueue(pid(2), None).unwrap(), Enqueued::Paired(_)));

        mm.enqueue(pid(3), None).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        mm.cancel(pid(3));
        mm.enqueue(pid(4), None).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        // pid(4) has waited 6 s only.
        assert!(mm.sweep(Instant::now()).is_empty());
        assert_eq!(mm.position(pid(4)), Some(1));
    }
}
