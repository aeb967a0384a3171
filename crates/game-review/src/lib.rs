//! Game review: evaluate every position of a chess game with a pool of UCI
//! engines, classify each move and estimate per-side accuracy and rating.

pub use chess_core;

pub mod accuracy;
pub mod analysis;
pub mod book_cache;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod pool;
pub mod scheduler;
pub mod stockfish;

pub use config::ReviewConfig;
pub use engine::{EngineError, EngineFactory, EngineHandle, EngineLine, Score};
pub use error::ReviewError;
pub use evaluation::{
    GameEvaluation, MoveClassification, PlayersRatings, PositionEvaluation, ReviewOutcome,
    SideValues,
};
pub use scheduler::{CancelToken, EvaluationRequest, GameReviewer, ProgressSink};
