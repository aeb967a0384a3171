//! Game positions built from a move list.

use serde::{Deserialize, Serialize};
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Move, Position as _};
use thiserror::Error;

use crate::fen::{parse_position, position_key, to_fen, STANDARD_START_FEN};

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Invalid FEN {fen}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Illegal move {mv} at ply {ply}")]
    IllegalMove { mv: String, ply: usize },

    #[error("Position {index} does not follow from the previous one: {reason}")]
    BrokenChain { index: usize, reason: String },
}

/// The move that produced a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub uci: String,
    pub san: String,
}

/// One board state reached during a game, indexed by ply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Ply index, 0 = initial position
    pub index: usize,
    /// Full FEN including move counters
    pub fen: String,
    /// Move that led here (absent only for index 0)
    #[serde(rename = "move", skip_serializing_if = "Option::is_none", default)]
    pub played_move: Option<PlayedMove>,
}

impl Position {
    pub fn initial(fen: &str) -> Self {
        Self {
            index: 0,
            fen: fen.to_string(),
            played_move: None,
        }
    }
}

/// Replay `moves` (SAN or UCI, mixed is fine) from `initial_fen` (standard
/// start when `None`) and return every position reached, initial included.
pub fn build_positions(
    initial_fen: Option<&str>,
    moves: &[String],
) -> Result<Vec<Position>, GameError> {
    let mut pos = parse_position(initial_fen.unwrap_or(STANDARD_START_FEN))?;

    let mut positions = Vec::with_capacity(moves.len() + 1);
    positions.push(Position::initial(&to_fen(&pos)));

    for (i, raw) in moves.iter().enumerate() {
        let mv = parse_move(&pos, raw).ok_or_else(|| GameError::IllegalMove {
            mv: raw.clone(),
            ply: i + 1,
        })?;

        let san = San::from_move(&pos, mv).to_string();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        pos.play_unchecked(mv);

        positions.push(Position {
            index: i + 1,
            fen: to_fen(&pos),
            played_move: Some(PlayedMove { uci, san }),
        });
    }

    Ok(positions)
}

/// Check that `current` is what playing its move in `previous` gives.
///
/// The UCI move must be legal in `previous`, the SAN must name the same move,
/// and the resulting placement, side to move and castling rights must match
/// `current.fen`.
pub fn check_follows(previous: &Position, current: &Position) -> Result<(), GameError> {
    let index = current.index;
    let broken = |reason: String| GameError::BrokenChain { index, reason };

    let played = current
        .played_move
        .as_ref()
        .ok_or_else(|| broken("no move".to_string()))?;
    let mut pos = parse_position(&previous.fen)?;

    let mv = played
        .uci
        .parse::<UciMove>()
        .ok()
        .and_then(|uci| uci.to_move(&pos).ok())
        .ok_or_else(|| broken(format!("{} is not legal", played.uci)))?;

    let san = San::from_move(&pos, mv).to_string();
    if played.san.trim_end_matches(['+', '#']) != san {
        return Err(broken(format!("{} does not match {}", played.san, played.uci)));
    }

    pos.play_unchecked(mv);
    if position_key(&to_fen(&pos)) != position_key(&current.fen) {
        return Err(broken(format!("{} leads elsewhere", played.uci)));
    }
    Ok(())
}

/// Resolve a move string against the position, trying UCI first and SAN second.
fn parse_move(pos: &Chess, raw: &str) -> Option<Move> {
    let clean = raw
        .trim()
        .trim_end_matches(|c: char| c == '!' || c == '?');

    if let Ok(uci) = clean.parse::<UciMove>() {
        if let Ok(mv) = uci.to_move(pos) {
            return Some(mv);
        }
    }

    let san: SanPlus = clean.parse().ok()?;
    san.san.to_move(pos).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(list: &str) -> Vec<String> {
        list.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_build_positions_from_san() {
        let positions = build_positions(None, &moves("e4 e5 Nf3")).unwrap();
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0].fen, STANDARD_START_FEN);
        assert!(positions[0].played_move.is_none());

        let third = positions[3].played_move.as_ref().unwrap();
        assert_eq!(third.san, "Nf3");
        assert_eq!(third.uci, "g1f3");
        assert_eq!(
            positions[3].fen,
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
    }

    #[test]
    fn test_build_positions_from_uci() {
        let positions = build_positions(None, &moves("e2e4 e7e5")).unwrap();
        assert_eq!(positions[1].played_move.as_ref().unwrap().san, "e4");
        assert_eq!(positions[2].index, 2);
    }

    #[test]
    fn test_build_positions_annotated_san() {
        let positions = build_positions(None, &moves("f3 e5 g4?? Qh4#")).unwrap();
        assert_eq!(positions.len(), 5);
        assert_eq!(positions[4].played_move.as_ref().unwrap().uci, "d8h4");
    }

    #[test]
    fn test_build_positions_illegal_move() {
        let err = build_positions(None, &moves("e4 e4")).unwrap_err();
        match err {
            GameError::IllegalMove { mv, ply } => {
                assert_eq!(mv, "e4");
                assert_eq!(ply, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_build_positions_empty_game() {
        let positions = build_positions(None, &[]).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].index, 0);
    }

    #[test]
    fn test_check_follows_accepts_replayed_game() {
        let positions = build_positions(None, &moves("e4 e5 Nf3 Nc6 Bb5 a6")).unwrap();
        for pair in positions.windows(2) {
            check_follows(&pair[0], &pair[1]).unwrap();
        }
    }

    #[test]
    fn test_check_follows_rejects_broken_chain() {
        let game = build_positions(None, &moves("e4 e5")).unwrap();
        let other = build_positions(None, &moves("d4")).unwrap();

        // Position swapped for another game's
        let mut swapped = game[1].clone();
        swapped.fen = other[1].fen.clone();
        assert!(matches!(
            check_follows(&game[0], &swapped),
            Err(GameError::BrokenChain { index: 1, .. })
        ));

        // Illegal move
        let mut illegal = game[2].clone();
        illegal.played_move = Some(PlayedMove {
            uci: "a1a8".into(),
            san: "Ra8".into(),
        });
        assert!(check_follows(&game[1], &illegal).is_err());

        // SAN naming another move
        let mut mislabeled = game[2].clone();
        mislabeled.played_move = Some(PlayedMove {
            uci: "e7e5".into(),
            san: "d5".into(),
        });
        assert!(check_follows(&game[1], &mislabeled).is_err());
    }
}
