//! Error types for the engine layer.

/// Errors produced by the board engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The column is out of range or already holds six discs.
    #[error("illegal move in column {column}")]
    IllegalMove { column: usize },

    /// A board diagram could not be parsed into a legal position.
    #[error("invalid board diagram: {0}")]
    InvalidDiagram(String),
}
