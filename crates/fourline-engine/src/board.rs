//! The Connect-4 board and its rules.
//!
//! The board is a 6 × 7 grid. Row 0 is the BOTTOM row, so a disc dropped
//! into column `c` lands at `(height[c], c)`. Alongside the grid we keep a
//! per-column height counter, which turns move legality into a single
//! comparison instead of a column scan.
//!
//! Everything here is pure and synchronous. Callers serialize access
//! (one session actor owns one board), so no locking happens at this level.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Number of rows on the board.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// Discs in a row needed to win.
pub const CONNECT: usize = 4;

/// A `(row, column)` coordinate. Row 0 is the bottom.
pub type Position = (usize, usize);

/// Directions scanned for lines: horizontal, vertical, and both diagonals.
/// Each entry is `(row step, column step)`.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ---------------------------------------------------------------------------
// Disc
// ---------------------------------------------------------------------------

/// The two disc colors. Red always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disc {
    Red,
    Yellow,
}

impl Disc {
    /// Returns the other color.
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Yellow,
            Self::Yellow => Self::Red,
        }
    }

    /// Seat index for this color: Red = 0, Yellow = 1.
    pub fn seat(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Yellow => 1,
        }
    }

    /// Inverse of [`Disc::seat`].
    pub fn from_seat(seat: usize) -> Option<Self> {
        match seat {
            0 => Some(Self::Red),
            1 => Some(Self::Yellow),
            _ => None,
        }
    }

    fn symbol(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Yellow => 'Y',
        }
    }
}

impl fmt::Display for Disc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Yellow => write!(f, "yellow"),
        }
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A Connect-4 position.
///
/// Invariant: `heights[c]` equals the number of occupied cells in column
/// `c`, and those cells are exactly rows `0..heights[c]`. The only
/// mutators are [`Board::apply_move`] and [`Board::undo_move`], which keep
/// both in lockstep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: [[Option<Disc>; COLS]; ROWS],
    heights: [u8; COLS],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            cells: [[None; COLS]; ROWS],
            heights: [0; COLS],
        }
    }

    /// Returns the disc at `(row, col)`, or `None` if empty or off-board.
    pub fn get(&self, row: usize, col: usize) -> Option<Disc> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Number of discs in `column` (0 for out-of-range columns).
    pub fn height(&self, column: usize) -> usize {
        self.heights.get(column).map_or(0, |h| *h as usize)
    }

    /// Total number of discs on the board.
    pub fn move_count(&self) -> usize {
        self.heights.iter().map(|h| *h as usize).sum()
    }

    /// `true` iff `column` is on the board and not yet full.
    pub fn is_legal_move(&self, column: usize) -> bool {
        column < COLS && self.height(column) < ROWS
    }

    /// Iterates the legal columns in ascending order.
    pub fn legal_moves(&self) -> impl Iterator<Item = usize> + '_ {
        (0..COLS).filter(|c| self.is_legal_move(*c))
    }

    /// Drops `disc` into `column` and returns the row it landed on.
    ///
    /// # Errors
    /// Returns [`EngineError::IllegalMove`] if the column is out of range
    /// or full. The board is untouched in that case.
    pub fn apply_move(
        &mut self,
        column: usize,
        disc: Disc,
    ) -> Result<usize, EngineError> {
        if !self.is_legal_move(column) {
            return Err(EngineError::IllegalMove { column });
        }
        let row = self.heights[column] as usize;
        self.cells[row][column] = Some(disc);
        self.heights[column] += 1;
        Ok(row)
    }

    /// Removes the top disc of `column`. Used by the search's undo stack.
    ///
    /// Returns the removed disc, or `None` if the column was empty.
    pub fn undo_move(&mut self, column: usize) -> Option<Disc> {
        let height = self.height(column);
        if height == 0 {
            return None;
        }
        let row = height - 1;
        self.heights[column] -= 1;
        self.cells[row][column].take()
    }

    /// `true` iff every column holds six discs.
    pub fn is_full(&self) -> bool {
        self.heights.iter().all(|h| *h as usize == ROWS)
    }

    /// Scans the whole board for four in a row and returns the winner.
    pub fn detect_win(&self) -> Option<Disc> {
        self.winning_line().map(|(disc, _)| disc)
    }

    /// Like [`Board::detect_win`] but also returns the four winning cells,
    /// ordered from the line's starting cell.
    pub fn winning_line(&self) -> Option<(Disc, [Position; CONNECT])> {
        for row in 0..ROWS {
            for col in 0..COLS {
                let Some(disc) = self.cells[row][col] else {
                    continue;
                };
                for (dr, dc) in DIRECTIONS {
                    if let Some(line) = self.line_from(row, col, dr, dc, disc) {
                        return Some((disc, line));
                    }
                }
            }
        }
        None
    }

    /// `true` if the disc at `(row, col)` is part of a four-in-a-row.
    ///
    /// Only lines through that one cell are checked, which is all that can
    /// change after a single placement. The search calls this after every
    /// simulated move.
    pub fn wins_through(&self, row: usize, col: usize) -> bool {
        let Some(disc) = self.get(row, col) else {
            return false;
        };
        DIRECTIONS.iter().any(|&(dr, dc)| {
            1 + self.run_length(row, col, dr, dc, disc)
                + self.run_length(row, col, -dr, -dc, disc)
                >= CONNECT
        })
    }

    /// Checks the height/grid invariant and gravity (no floating discs).
    ///
    /// Always `true` for boards built through [`Board::apply_move`]. A
    /// `false` here means the position is corrupted and must not be played.
    pub fn is_consistent(&self) -> bool {
        (0..COLS).all(|col| {
            let height = self.heights[col] as usize;
            height <= ROWS
                && (0..ROWS).all(|row| self.cells[row][col].is_some() == (row < height))
        })
    }

    /// Builds a board from a text diagram, TOP row first.
    ///
    /// Each of the six lines holds seven characters: `R` (red), `Y`
    /// (yellow) or `.` (empty). Whitespace around lines is ignored.
    ///
    /// ```
    /// use fourline_engine::{Board, Disc};
    ///
    /// let board = Board::from_diagram(
    ///     "
    ///     .......
    ///     .......
    ///     .......
    ///     .......
    ///     Y.Y....
    ///     RRRR...
    ///     ",
    /// )
    /// .unwrap();
    /// assert_eq!(board.detect_win(), Some(Disc::Red));
    /// ```
    ///
    /// # Errors
    /// [`EngineError::InvalidDiagram`] on a wrong shape, an unknown
    /// character, or a disc hanging above an empty cell.
    pub fn from_diagram(diagram: &str) -> Result<Self, EngineError> {
        let lines: Vec<&str> = diagram
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() != ROWS {
            return Err(EngineError::InvalidDiagram(format!(
                "expected {ROWS} rows, got {}",
                lines.len()
            )));
        }

        let mut board = Self::new();
        for (i, line) in lines.iter().enumerate() {
            let row = ROWS - 1 - i;
            let chars: Vec<char> = line.chars().collect();
            if chars.len() != COLS {
                return Err(EngineError::InvalidDiagram(format!(
                    "row {row} has {} columns, expected {COLS}",
                    chars.len()
                )));
            }
            for (col, ch) in chars.into_iter().enumerate() {
                board.cells[row][col] = match ch {
                    'R' => Some(Disc::Red),
                    'Y' => Some(Disc::Yellow),
                    '.' => None,
                    other => {
                        return Err(EngineError::InvalidDiagram(format!(
                            "unexpected character {other:?}"
                        )));
                    }
                };
            }
        }

        for col in 0..COLS {
            let filled = (0..ROWS)
                .take_while(|row| board.cells[*row][col].is_some())
                .count();
            board.heights[col] = filled as u8;
        }
        if !board.is_consistent() {
            return Err(EngineError::InvalidDiagram(
                "disc floating above an empty cell".into(),
            ));
        }
        Ok(board)
    }

    /// Counts consecutive `disc` cells starting one step away from
    /// `(row, col)` in direction `(dr, dc)`.
    fn run_length(
        &self,
        row: usize,
        col: usize,
        dr: isize,
        dc: isize,
        disc: Disc,
    ) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize + dr, col as isize + dc);
        while r >= 0
            && c >= 0
            && (r as usize) < ROWS
            && (c as usize) < COLS
            && self.cells[r as usize][c as usize] == Some(disc)
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    fn line_from(
        &self,
        row: usize,
        col: usize,
        dr: isize,
        dc: isize,
        disc: Disc,
    ) -> Option<[Position; CONNECT]> {
        let mut line = [(0, 0); CONNECT];
        for (i, slot) in line.iter_mut().enumerate() {
            let r = row as isize + dr * i as isize;
            let c = col as isize + dc * i as isize;
            if r < 0 || c < 0 || r as usize >= ROWS || c as usize >= COLS {
                return None;
            }
            if self.cells[r as usize][c as usize] != Some(disc) {
                return None;
            }
            *slot = (r as usize, c as usize);
        }
        Some(line)
    }
}

impl fmt::Display for Board {
    /// Renders the board top row first, in the same format
    /// [`Board::from_diagram`] accepts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..ROWS).rev() {
            for col in 0..COLS {
                let ch = self.cells[row][col].map_or('.', Disc::symbol);
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
