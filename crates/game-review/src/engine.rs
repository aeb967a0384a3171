//! Engine handle abstraction.
//!
//! An [`EngineHandle`] owns one external search engine and runs at most one
//! evaluation at a time (enforced by `&mut self`). An [`EngineFactory`]
//! produces fresh handles so the pool can replace faulted ones.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an engine handle.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Spawning or talking to the engine process failed.
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Engine executable was not found at the specified path.
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    /// UCI handshake did not complete.
    #[error("Engine initialization failed")]
    InitFailed,
    /// Engine returned an invalid or unexpected response.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    /// Engine closed its output stream.
    #[error("Engine closed unexpectedly")]
    Closed,
    /// Engine did not answer in time.
    #[error("Engine timed out after {0} ms")]
    Timeout(u64),
}

/// Engine score, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawns, positive = White is better
    Centipawns(i32),
    /// Mate in N moves, positive = White mates, negative = Black mates
    Mate(i32),
}

impl Score {
    /// Build a White-relative score from a UCI `score cp|mate` pair reported
    /// from the side to move's perspective.
    ///
    /// UCI reports a finished checkmate as `mate 0` for the mated side; it is
    /// mapped to a mate in one for the winner.
    pub fn from_uci(cp: Option<i32>, mate: Option<i32>, white_to_move: bool) -> Option<Self> {
        let sign = if white_to_move { 1 } else { -1 };
        if let Some(m) = mate {
            let relative = if m == 0 { -1 } else { m };
            return Some(Score::Mate(relative * sign));
        }
        cp.map(|c| Score::Centipawns(c * sign))
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate(_))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Score::Mate(m) if *m > 0 => write!(f, "+M{m}"),
            Score::Mate(m) => write!(f, "-M{}", m.abs()),
        }
    }
}

/// One principal variation from one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLine {
    /// 1 = best
    pub rank: u32,
    pub score: Score,
    /// Depth actually reached
    pub depth: u32,
    /// Moves of the line in UCI notation
    pub moves: Vec<String>,
}

impl EngineLine {
    pub fn first_move(&self) -> Option<&str> {
        self.moves.first().map(String::as_str)
    }
}

/// One external search engine instance.
pub trait EngineHandle: Send + 'static {
    /// Search `fen` to `depth` and return up to `multi_pv` lines ordered by rank.
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u32,
        multi_pv: u32,
    ) -> impl Future<Output = Result<Vec<EngineLine>, EngineError>> + Send;

    /// Abort whatever search is running and return once the engine is idle.
    fn cancel(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Shut the engine down.
    fn quit(self) -> impl Future<Output = ()> + Send;
}

/// Creates initialized engine handles.
pub trait EngineFactory: Send + Sync + 'static {
    type Handle: EngineHandle;

    fn spawn(&self) -> impl Future<Output = Result<Self::Handle, EngineError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_from_uci_white_to_move() {
        assert_eq!(Score::from_uci(Some(35), None, true), Some(Score::Centipawns(35)));
        assert_eq!(Score::from_uci(None, Some(3), true), Some(Score::Mate(3)));
    }

    #[test]
    fn test_score_from_uci_black_to_move() {
        assert_eq!(Score::from_uci(Some(35), None, false), Some(Score::Centipawns(-35)));
        assert_eq!(Score::from_uci(None, Some(2), false), Some(Score::Mate(-2)));
        assert_eq!(Score::from_uci(None, Some(-4), false), Some(Score::Mate(4)));
    }

    #[test]
    fn test_score_from_uci_checkmated() {
        // White to move and mated: Black delivered mate
        assert_eq!(Score::from_uci(None, Some(0), true), Some(Score::Mate(-1)));
        assert_eq!(Score::from_uci(None, Some(0), false), Some(Score::Mate(1)));
    }

    #[test]
    fn test_score_from_uci_missing() {
        assert_eq!(Score::from_uci(None, None, true), None);
    }

    #[test]
    fn test_score_display() {
        assert_eq!(Score::Centipawns(135).to_string(), "+1.35");
        assert_eq!(Score::Centipawns(-50).to_string(), "-0.50");
        assert_eq!(Score::Mate(3).to_string(), "+M3");
        assert_eq!(Score::Mate(-2).to_string(), "-M2");
    }
}
