//! The session state machine.
//!
//! [`GameSession`] is plain synchronous data: it owns the board and the
//! move log and enforces turn order and status transitions. The actor in
//! `actor.rs` is the only owner of a live session; everything else sees
//! [`SessionSnapshot`]s.

use std::time::{SystemTime, UNIX_EPOCH};

use fourline_engine::{Board, CONNECT, Difficulty, Disc, EngineError, Position};
use fourline_protocol::{
    EndReason, MoveRecord, PlayerId, SessionId, SessionSnapshot, SessionStatus,
};

use crate::GameError;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One Connect-4 game between two seats.
///
/// Seat 0 plays [`Disc::Red`] and moves first.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: SessionId,
    players: [PlayerId; 2],
    board: Board,
    turn: Disc,
    status: SessionStatus,
    winner: Option<PlayerId>,
    winning_line: Option<[Position; CONNECT]>,
    moves: Vec<MoveRecord>,
    started_at: u64,
    ended_at: Option<u64>,
    end_reason: Option<EndReason>,
    bot_difficulty: Option<Difficulty>,
}

impl GameSession {
    /// Creates a session in `Waiting`. `bot_difficulty` is only kept when
    /// one of the seats is [`PlayerId::BOT`].
    pub fn new(
        id: SessionId,
        players: [PlayerId; 2],
        bot_difficulty: Option<Difficulty>,
    ) -> Result<Self, GameError> {
        if players[0] == players[1] {
            return Err(GameError::InvalidSeating(format!(
                "{} cannot play against themselves",
                players[0]
            )));
        }
        let has_bot = players.iter().any(|p| p.is_bot());
        Ok(Self {
            id,
            players,
            board: Board::new(),
            turn: Disc::Red,
            status: SessionStatus::Waiting,
            winner: None,
            winning_line: None,
            moves: Vec::new(),
            started_at: 0,
            ended_at: None,
            end_reason: None,
            bot_difficulty: has_bot.then(|| bot_difficulty.unwrap_or_default()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn players(&self) -> [PlayerId; 2] {
        self.players
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The disc to move next.
    pub fn turn(&self) -> Disc {
        self.turn
    }

    pub fn bot_difficulty(&self) -> Option<Difficulty> {
        self.bot_difficulty
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// Who is expected to move, or `None` unless in progress.
    pub fn player_to_move(&self) -> Option<PlayerId> {
        self.status
            .is_active()
            .then(|| self.players[self.turn.seat()])
    }

    /// `Waiting → InProgress`. Red moves first.
    pub fn start(&mut self, now: u64) -> Result<(), GameError> {
        self.transition(SessionStatus::InProgress)?;
        self.started_at = now;
        tracing::info!(
            session_id = %self.id,
            red = %self.players[0],
            yellow = %self.players[1],
            "session started"
        );
        Ok(())
    }

    /// Applies `player`'s move in `column`.
    ///
    /// On success the move is logged, the board is checked for a win or
    /// a draw, and the turn passes to the other seat (unless the game
    /// ended). Rejections leave the session untouched.
    ///
    /// # Errors
    /// - [`GameError::SessionNotActive`] unless in progress
    /// - [`GameError::NotYourTurn`] if `player` is not bound to the disc
    ///   to move
    /// - [`GameError::IllegalMove`] for an out-of-range or full column
    /// - [`GameError::Corrupted`] if the board fails its integrity check
    ///   after the move; the session is abandoned
    pub fn apply_player_move(
        &mut self,
        player: PlayerId,
        column: usize,
        now: u64,
    ) -> Result<MoveRecord, GameError> {
        if !self.status.is_active() {
            return Err(GameError::SessionNotActive(self.id));
        }
        if self.player_to_move() != Some(player) {
            return Err(GameError::NotYourTurn(player));
        }

        let disc = self.turn;
        let row = self.board.apply_move(column, disc).map_err(|e| match e {
            EngineError::IllegalMove { column } => GameError::IllegalMove { column },
            EngineError::InvalidDiagram(_) => GameError::IllegalMove { column },
        })?;

        let record = MoveRecord {
            ply: self.moves.len() as u32 + 1,
            column,
            row,
            player,
            disc,
            at: now,
        };
        self.moves.push(record);

        if !self.board.is_consistent() || self.moves.len() != self.board.move_count() {
            self.force_abandon(EndReason::Corrupted, now);
            return Err(GameError::Corrupted(self.id));
        }

        if self.board.wins_through(row, column) {
            self.winning_line = self.board.winning_line().map(|(_, line)| line);
            self.winner = Some(player);
            self.finish(EndReason::FourInARow, now);
        } else if self.board.is_full() {
            self.finish(EndReason::Draw, now);
        } else {
            self.turn = disc.opponent();
        }

        Ok(record)
    }

    /// Moves any non-terminal session to `Abandoned`.
    ///
    /// Returns `false` (and changes nothing) if the session already
    /// reached a terminal status.
    pub fn force_abandon(&mut self, reason: EndReason, now: u64) -> bool {
        if self.transition(SessionStatus::Abandoned).is_err() {
            return false;
        }
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        tracing::info!(session_id = %self.id, %reason, "session abandoned");
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            players: self.players,
            board: self.board.clone(),
            turn: self.turn,
            status: self.status,
            winner: self.winner,
            winning_line: self.winning_line,
            moves: self.moves.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            end_reason: self.end_reason,
            bot_difficulty: self.bot_difficulty,
        }
    }

    fn finish(&mut self, reason: EndReason, now: u64) {
        self.status = SessionStatus::Completed;
        self.ended_at = Some(now);
        self.end_reason = Some(reason);
        tracing::info!(
            session_id = %self.id,
            %reason,
            winner = ?self.winner,
            moves = self.moves.len(),
            "session completed"
        );
    }

    fn transition(&mut self, target: SessionStatus) -> Result<(), GameError> {
        if !self.status.can_transition_to(target) {
            return Err(GameError::SessionNotActive(self.id));
        }
        self.status = target;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
