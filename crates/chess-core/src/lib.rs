//! Board-level building blocks shared by the review pipeline: FEN helpers,
//! game positions and a lightweight PGN front end.

pub mod fen;
pub mod game;
pub mod pgn;

pub use game::{build_positions, check_follows, GameError, PlayedMove, Position};
pub use pgn::{parse_pgn, PgnGame};
