//! Property-style tests over random legal games.
//!
//! Games are generated from fixed seeds so failures reproduce.

use fourline_engine::{
    Board, COLS, Decision, Difficulty, Disc, ROWS, SearchLimits, choose_move,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =========================================================================
// Helpers
// =========================================================================

const SEEDS: u64 = 64;

/// Plays random legal moves until the game ends. Returns the board, the
/// columns played, and the winner (if any).
fn random_game(seed: u64) -> (Board, Vec<usize>, Option<Disc>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut board = Board::new();
    let mut played = Vec::new();
    let mut turn = Disc::Red;

    loop {
        let legal: Vec<usize> = board.legal_moves().collect();
        if legal.is_empty() {
            return (board, played, None);
        }
        let column = legal[rng.random_range(0..legal.len())];
        let row = board.apply_move(column, turn).expect("legal move");
        played.push(column);
        if board.wins_through(row, column) {
            return (board, played, Some(turn));
        }
        turn = turn.opponent();
    }
}

// =========================================================================
// Board invariants
// =========================================================================

#[test]
fn test_random_games_keep_heights_consistent() {
    for seed in 0..SEEDS {
        let (board, played, _) = random_game(seed);
        assert!(board.is_consistent(), "seed {seed}");
        assert_eq!(board.move_count(), played.len(), "seed {seed}");

        let total: usize = (0..COLS).map(|c| board.height(c)).sum();
        assert_eq!(total, played.len(), "seed {seed}");
        for c in 0..COLS {
            assert!(board.height(c) <= ROWS);
        }
    }
}

#[test]
fn test_random_games_winner_is_last_mover() {
    for seed in 0..SEEDS {
        let (board, played, winner) = random_game(seed);
        let last_mover = if played.len() % 2 == 1 {
            Disc::Red
        } else {
            Disc::Yellow
        };
        match winner {
            Some(w) => {
                assert_eq!(w, last_mover, "seed {seed}");
                assert_eq!(board.detect_win(), Some(w), "seed {seed}");
                let (disc, cells) = board.winning_line().expect("line for winner");
                assert_eq!(disc, w);
                for (r, c) in cells {
                    assert_eq!(board.get(r, c), Some(w));
                }
            }
            None => {
                assert!(board.is_full(), "seed {seed}");
                assert_eq!(board.detect_win(), None, "seed {seed}");
            }
        }
    }
}

#[test]
fn test_random_games_no_win_before_final_move() {
    for seed in 0..SEEDS {
        let (_, played, _) = random_game(seed);
        let mut board = Board::new();
        let mut turn = Disc::Red;
        for &column in &played[..played.len() - 1] {
            board.apply_move(column, turn).unwrap();
            assert_eq!(board.detect_win(), None, "seed {seed}");
            turn = turn.opponent();
        }
    }
}

#[test]
fn test_undo_unwinds_random_game_to_empty() {
    for seed in 0..SEEDS {
        let (mut board, played, _) = random_game(seed);
        for &column in played.iter().rev() {
            assert!(board.undo_move(column).is_some());
            assert!(board.is_consistent());
        }
        assert_eq!(board, Board::new(), "seed {seed}");
    }
}

#[test]
fn test_board_serde_preserves_random_positions() {
    for seed in 0..8 {
        let (board, _, _) = random_game(seed);
        let json = serde_json::to_string(&board).unwrap();
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }
}

// =========================================================================
// Bot properties
// =========================================================================

#[test]
fn test_bot_always_returns_legal_column() {
    for seed in 0..SEEDS {
        let (_, played, _) = random_game(seed);
        // Replay to the midpoint so the bot has something to choose from.
        let mut board = Board::new();
        let mut turn = Disc::Red;
        for &column in &played[..played.len() / 2] {
            board.apply_move(column, turn).unwrap();
            turn = turn.opponent();
        }
        if board.detect_win().is_some() || board.is_full() {
            continue;
        }
        let limits = SearchLimits::for_difficulty(Difficulty::Easy);
        let outcome = choose_move(&board, turn, limits, None).expect("moves remain");
        assert!(board.is_legal_move(outcome.column), "seed {seed}");
    }
}

#[test]
fn test_bot_takes_every_available_immediate_win() {
    for seed in 0..SEEDS {
        let (_, played, winner) = random_game(seed);
        if winner.is_none() {
            continue;
        }
        // The position right before the winning move has a win available
        // for the side to move.
        let mut board = Board::new();
        let mut turn = Disc::Red;
        for &column in &played[..played.len() - 1] {
            board.apply_move(column, turn).unwrap();
            turn = turn.opponent();
        }
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            let outcome = choose_move(
                &board,
                turn,
                SearchLimits::for_difficulty(difficulty),
                None,
            )
            .expect("moves remain");
            assert_eq!(outcome.decision, Decision::ImmediateWin, "seed {seed}");

            let mut after = board.clone();
            let row = after.apply_move(outcome.column, turn).unwrap();
            assert!(after.wins_through(row, outcome.column), "seed {seed}");
        }
    }
}
