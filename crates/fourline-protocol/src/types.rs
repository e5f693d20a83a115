//! Core protocol types: identities, session status, and snapshots.
//!
//! Everything here crosses a boundary. Snapshots travel to clients inside
//! [`ServerMessage`](crate::ServerMessage)s and to the record store, so
//! every type is `Serialize + Deserialize` and owns its data.

use std::fmt;

use fourline_engine::{Board, CONNECT, Difficulty, Disc, Position};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `SessionId` can never be passed where a
/// `PlayerId` is expected. `#[serde(transparent)]` keeps the wire form a
/// bare number: `PlayerId(42)` is `42` in JSON.
///
/// `PlayerId(0)` is reserved for the bot ([`PlayerId::BOT`]); the identity
/// provider never hands it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Sentinel identity occupying the bot's seat.
    pub const BOT: PlayerId = PlayerId(0);

    pub fn is_bot(self) -> bool {
        self == Self::BOT
    }
}

/// `tracing::info!(%player_id, ...)` prints "P-42", or "bot" for the
/// sentinel.
impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bot() {
            write!(f, "bot")
        } else {
            write!(f, "P-{}", self.0)
        }
    }
}

/// A unique identifier for one game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// ```text
/// Waiting → InProgress → Completed
///    │           │
///    └───────────┴─────→ Abandoned
/// ```
///
/// - **Waiting**: seats assigned, not started yet.
/// - **InProgress**: moves are accepted.
/// - **Completed**: four in a row or a full board. Terminal.
/// - **Abandoned**: a player quit, the reconnect grace ran out, or the
///   board failed an integrity check. Terminal.
///
/// Transitions are monotonic: a terminal status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    /// Returns `true` once the session can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Returns `true` if moves are being accepted.
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// The natural successor: `Waiting → InProgress → Completed`.
    /// Abandonment is the side exit and is not returned here.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::InProgress),
            Self::InProgress => Some(Self::Completed),
            Self::Completed | Self::Abandoned => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Abandoned => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Why a session reached a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Completed with a winner.
    FourInARow,
    /// Completed on a full board with no winner.
    Draw,
    /// A player left on purpose.
    Quit,
    /// A player's reconnect grace period expired.
    Disconnected,
    /// The board failed an integrity check.
    Corrupted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FourInARow => "four_in_a_row",
            Self::Draw => "draw",
            Self::Quit => "quit",
            Self::Disconnected => "disconnected",
            Self::Corrupted => "corrupted",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Move log and snapshots
// ---------------------------------------------------------------------------

/// One entry of a session's move log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 1-based position in the log.
    pub ply: u32,
    pub column: usize,
    /// The row the disc landed on (0 = bottom).
    pub row: usize,
    pub player: PlayerId,
    pub disc: Disc,
    /// Milliseconds since the Unix epoch.
    pub at: u64,
}

/// An immutable, self-contained view of a session.
///
/// Seat 0 always plays [`Disc::Red`] and moves first; seat 1 plays
/// [`Disc::Yellow`]. Clients find their own color with
/// [`SessionSnapshot::disc_of`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub players: [PlayerId; 2],
    pub board: Board,
    /// The disc to move next. Meaningless once the status is terminal.
    pub turn: Disc,
    pub status: SessionStatus,
    /// Set iff the session completed with four in a row.
    pub winner: Option<PlayerId>,
    /// The four winning cells as `(row, column)`.
    pub winning_line: Option<[Position; CONNECT]>,
    pub moves: Vec<MoveRecord>,
    /// Milliseconds since the Unix epoch.
    pub started_at: u64,
    pub ended_at: Option<u64>,
    pub end_reason: Option<EndReason>,
    /// Set when one seat is [`PlayerId::BOT`].
    pub bot_difficulty: Option<Difficulty>,
}

impl SessionSnapshot {
    /// Seat index (0 or 1) of `player`, if they sit in this session.
    pub fn seat_of(&self, player: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| *p == player)
    }

    /// The disc `player` plays with.
    pub fn disc_of(&self, player: PlayerId) -> Option<Disc> {
        self.seat_of(player).and_then(Disc::from_seat)
    }

    /// The other seat's identity.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        self.seat_of(player).map(|seat| self.players[1 - seat])
    }

    /// Who is expected to move, or `None` if no moves are accepted.
    pub fn player_to_move(&self) -> Option<PlayerId> {
        self.status
            .is_active()
            .then(|| self.players[self.turn.seat()])
    }

    pub fn has_bot(&self) -> bool {
        self.players.iter().any(|p| p.is_bot())
    }

    /// The human seats (one or two).
    pub fn humans(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().copied().filter(|p| !p.is_bot())
    }
}

// =========================================================================
// Tests
// =========================================================================
