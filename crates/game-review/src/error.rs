//! Review error types

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No engine could be initialized: {0}")]
    EngineUnavailable(String),

    #[error("Evaluation of position {index} failed: {reason}")]
    PositionEvaluationFailed { index: usize, reason: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Game error: {0}")]
    Game(#[from] chess_core::GameError),

    #[error("Opening book error: {0}")]
    Book(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
