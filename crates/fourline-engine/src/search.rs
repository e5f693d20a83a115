//! Bot move selection: minimax with alpha-beta pruning.
//!
//! The entry point is [`choose_move`]. It runs in three stages:
//!
//! 1. **Immediate tactics**: take a winning move if there is one,
//!    otherwise block the opponent's winning move.
//! 2. **Iterative deepening**: search depth 1, 2, … up to the configured
//!    depth. Each completed ply replaces the current best move.
//! 3. **Budget / cancellation**: if the wall-clock budget runs out or the
//!    cancel flag is raised mid-ply, that ply is thrown away and the best
//!    move of the deepest completed ply is returned.
//!
//! The search mutates one working copy of the board and undoes every move
//! on the way back up, so no position is cloned per node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{Board, COLS, CONNECT, Disc, ROWS};

/// Score of a won position. Heuristic scores stay well below it.
pub const WIN_SCORE: i32 = 1_000_000;

/// Center-first column order, used at every node.
pub const MOVE_ORDER: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// How often (in nodes) the deadline and cancel flag are polled.
const POLL_INTERVAL: u64 = 256;

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Bot strength. Determines search depth and the simulated thinking pause.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Search depth in plies.
    pub fn depth(self) -> u8 {
        match self {
            Self::Easy => 2,
            Self::Medium => 4,
            Self::Hard => 7,
        }
    }

    /// Bounds of the simulated "thinking" pause before a bot move is
    /// published. Purely cosmetic pacing.
    pub fn think_delay(self) -> (Duration, Duration) {
        match self {
            Self::Easy => (Duration::from_millis(100), Duration::from_millis(200)),
            Self::Medium => (Duration::from_millis(200), Duration::from_millis(350)),
            Self::Hard => (Duration::from_millis(300), Duration::from_millis(500)),
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits and results
// ---------------------------------------------------------------------------

/// Bounds on one search.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Maximum depth in plies (at least 1 is always attempted).
    pub depth: u8,
    /// Wall-clock budget. `None` searches to full depth.
    pub budget: Option<Duration>,
}

impl SearchLimits {
    /// Full-depth search for a difficulty, no time budget.
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        Self {
            depth: difficulty.depth(),
            budget: None,
        }
    }

    /// Adds a wall-clock budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Why the returned column was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The move wins on the spot.
    ImmediateWin,
    /// The move blocks the opponent's immediate win.
    Block,
    /// Chosen by minimax at `SearchOutcome::depth`.
    Searched,
    /// The budget ran out before depth 1 finished; first legal
    /// center-ordered column.
    Fallback,
}

/// Result of [`choose_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    /// The chosen column. Always legal on the input board.
    pub column: usize,
    /// Evaluation from the mover's point of view (0 for shortcut moves).
    pub score: i32,
    /// Deepest fully completed ply (0 for shortcut and fallback moves).
    pub depth: u8,
    /// Nodes visited.
    pub nodes: u64,
    pub decision: Decision,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Picks a column for `me` to play on `board`.
///
/// Returns `None` only if the board has no legal move. `cancel` lets the
/// caller abort a running search (e.g. the session ended underneath it);
/// a cancelled search still returns a legal column.
pub fn choose_move(
    board: &Board,
    me: Disc,
    limits: SearchLimits,
    cancel: Option<&AtomicBool>,
) -> Option<SearchOutcome> {
    let mut work = board.clone();
    let first_legal = MOVE_ORDER.iter().copied().find(|c| work.is_legal_move(*c))?;

    if let Some(column) = winning_move(&mut work, me) {
        return Some(shortcut(column, Decision::ImmediateWin));
    }
    if let Some(column) = winning_move(&mut work, me.opponent()) {
        return Some(shortcut(column, Decision::Block));
    }

    let mut search = Search {
        me,
        nodes: 0,
        stopped: false,
        deadline: limits.budget.map(|b| Instant::now() + b),
        cancel,
    };

    let mut best: Option<(usize, i32, u8)> = None;
    for depth in 1..=limits.depth.max(1) {
        let Some((column, score)) = search.root(&mut work, depth) else {
            break;
        };
        best = Some((column, score, depth));
        if score >= WIN_SCORE {
            // A forced win is already proven; deeper plies can't beat it.
            break;
        }
    }

    let outcome = match best {
        Some((column, score, depth)) => SearchOutcome {
            column,
            score,
            depth,
            nodes: search.nodes,
            decision: Decision::Searched,
        },
        None => SearchOutcome {
            column: first_legal,
            score: 0,
            depth: 0,
            nodes: search.nodes,
            decision: Decision::Fallback,
        },
    };

    tracing::debug!(
        column = outcome.column,
        score = outcome.score,
        depth = outcome.depth,
        nodes = outcome.nodes,
        stopped = search.stopped,
        "bot search finished"
    );
    Some(outcome)
}

fn shortcut(column: usize, decision: Decision) -> SearchOutcome {
    SearchOutcome {
        column,
        score: 0,
        depth: 0,
        nodes: 0,
        decision,
    }
}

/// Finds a column where `disc` completes four in a row right now.
fn winning_move(board: &mut Board, disc: Disc) -> Option<usize> {
    MOVE_ORDER.iter().copied().find(|&column| {
        let Ok(row) = board.apply_move(column, disc) else {
            return false;
        };
        let wins = board.wins_through(row, column);
        board.undo_move(column);
        wins
    })
}

// ---------------------------------------------------------------------------
// Minimax
// ---------------------------------------------------------------------------

struct Search<'a> {
    me: Disc,
    nodes: u64,
    stopped: bool,
    deadline: Option<Instant>,
    cancel: Option<&'a AtomicBool>,
}

impl Search<'_> {
    /// Searches every root move to `depth`. Returns `None` if the search
    /// was stopped before the ply completed.
    fn root(&mut self, board: &mut Board, depth: u8) -> Option<(usize, i32)> {
        let mut alpha = i32::MIN;
        let beta = i32::MAX;
        let mut best: Option<(usize, i32)> = None;

        for column in MOVE_ORDER {
            let Ok(row) = board.apply_move(column, self.me) else {
                continue;
            };
            let score = self.minimax(board, depth - 1, alpha, beta, false, (row, column));
            board.undo_move(column);

            if self.stopped {
                return None;
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((column, score));
            }
            alpha = alpha.max(score);
        }
        best
    }

    /// `last` is the cell the previous mover just filled.
    fn minimax(
        &mut self,
        board: &mut Board,
        depth: u8,
        mut alpha: i32,
        mut beta: i32,
        maximizing: bool,
        last: (usize, usize),
    ) -> i32 {
        self.nodes += 1;
        if self.nodes % POLL_INTERVAL == 0 && self.out_of_time() {
            self.stopped = true;
        }
        if self.stopped {
            return 0;
        }

        // The previous mover is `me` when we're now minimizing.
        if board.wins_through(last.0, last.1) {
            let remaining = i32::from(depth);
            return if maximizing {
                -WIN_SCORE - remaining
            } else {
                WIN_SCORE + remaining
            };
        }
        if board.is_full() {
            return 0;
        }
        if depth == 0 {
            return evaluate(board, self.me);
        }

        let mover = if maximizing { self.me } else { self.me.opponent() };
        let mut best = if maximizing { i32::MIN } else { i32::MAX };

        for column in MOVE_ORDER {
            let Ok(row) = board.apply_move(column, mover) else {
                continue;
            };
            let score =
                self.minimax(board, depth - 1, alpha, beta, !maximizing, (row, column));
            board.undo_move(column);

            if maximizing {
                best = best.max(score);
                alpha = alpha.max(best);
            } else {
                best = best.min(score);
                beta = beta.min(best);
            }
            if alpha >= beta {
                break;
            }
        }
        best
    }

    fn out_of_time(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ---------------------------------------------------------------------------
// Static evaluation
// ---------------------------------------------------------------------------

/// Heuristic score of `board` from `me`'s point of view.
///
/// Every window of four cells (in all four directions) contributes:
/// two own discs with two empties score a little, three own discs with one
/// empty score a lot, and the same shapes for the opponent count against
/// us (an opponent three is weighted above our own three, so defence wins
/// ties). Discs in the center column add a flat bonus. Windows that mix
/// both colors are dead and score nothing.
pub fn evaluate(board: &Board, me: Disc) -> i32 {
    const CENTER: usize = COLS / 2;
    const CENTER_BONUS: i32 = 3;

    let mut score = 0;
    for row in 0..ROWS {
        match board.get(row, CENTER) {
            Some(d) if d == me => score += CENTER_BONUS,
            Some(_) => score -= CENTER_BONUS,
            None => {}
        }
    }

    let window_starts = [(0isize, 1isize), (1, 0), (1, 1), (1, -1)];
    for row in 0..ROWS as isize {
        for col in 0..COLS as isize {
            for (dr, dc) in window_starts {
                let end_r = row + dr * (CONNECT as isize - 1);
                let end_c = col + dc * (CONNECT as isize - 1);
                if end_r < 0 || end_r >= ROWS as isize || end_c < 0 || end_c >= COLS as isize {
                    continue;
                }
                let (mut own, mut opp) = (0, 0);
                for i in 0..CONNECT as isize {
                    match board.get((row + dr * i) as usize, (col + dc * i) as usize) {
                        Some(d) if d == me => own += 1,
                        Some(_) => opp += 1,
                        None => {}
                    }
                }
                score += score_window(own, opp);
            }
        }
    }
    score
}

fn score_window(own: usize, opp: usize) -> i32 {
    match (own, opp) {
        (4, 0) => WIN_SCORE / 10,
        (3, 0) => 50,
        (2, 0) => 10,
        (0, 4) => -WIN_SCORE / 10,
        (0, 3) => -80,
        (0, 2) => -10,
        _ => 0,
    }
}

// =========================================================================
// Tests
// =========================================================================
