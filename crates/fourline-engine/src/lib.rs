//! Connect-4 rules and bot search for Fourline.
//!
//! This crate is pure and synchronous: no I/O, no runtime. The session
//! actor in `fourline-game` owns a [`Board`] and calls [`choose_move`]
//! from a blocking task when the bot is to play.
//!
//! # Key types
//!
//! - [`Board`]: 6×7 grid, gravity, win/draw detection
//! - [`Disc`]: the two colors (Red always moves first)
//! - [`Difficulty`]: bot strength (search depth, thinking pause)
//! - [`choose_move`]: immediate tactics, then iterative-deepening minimax

mod board;
mod error;
mod search;

pub use board::{Board, COLS, CONNECT, Disc, Position, ROWS};
pub use error::EngineError;
pub use search::{
    Decision, Difficulty, MOVE_ORDER, SearchLimits, SearchOutcome, WIN_SCORE, choose_move,
    evaluate,
};
