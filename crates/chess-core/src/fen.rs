//! FEN helpers on top of shakmaty.

use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position as _};

use crate::game::GameError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a FEN string into a playable position.
pub fn parse_position(fen: &str) -> Result<Chess, GameError> {
    let parsed: Fen = fen.trim().parse().map_err(|e: shakmaty::fen::ParseFenError| {
        GameError::InvalidFen {
            fen: fen.to_string(),
            reason: e.to_string(),
        }
    })?;

    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| GameError::InvalidFen {
            fen: fen.to_string(),
            reason: e.to_string(),
        })
}

/// Serialize a position back to FEN.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Placement, side to move and castling rights. Ignores the en passant
/// field, which producers disagree on after a double pawn push.
pub fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// Side to move according to the second FEN field. Defaults to white when
/// the field is missing.
pub fn side_to_move(fen: &str) -> Color {
    match fen.split_whitespace().nth(1) {
        Some("b") => Color::Black,
        _ => Color::White,
    }
}

/// Number of legal moves in the position.
pub fn legal_move_count(fen: &str) -> Result<usize, GameError> {
    Ok(parse_position(fen)?.legal_moves().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_key_drops_counters() {
        assert_eq!(
            position_key(STANDARD_START_FEN),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq"
        );
    }

    #[test]
    fn test_position_key_ignores_en_passant() {
        assert_eq!(
            position_key("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"),
            position_key("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
        );
    }

    #[test]
    fn test_side_to_move() {
        assert_eq!(side_to_move(STANDARD_START_FEN), Color::White);
        assert_eq!(
            side_to_move("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"),
            Color::Black
        );
    }

    #[test]
    fn test_legal_move_count() {
        assert_eq!(legal_move_count(STANDARD_START_FEN).unwrap(), 20);
        // Black king on a8 with the white king on b6: Kb8 is the only move
        assert_eq!(legal_move_count("k7/8/1K6/8/8/8/8/7R b - - 0 1").unwrap(), 1);
    }

    #[test]
    fn test_parse_position_roundtrip() {
        let pos = parse_position(STANDARD_START_FEN).unwrap();
        assert_eq!(to_fen(&pos), STANDARD_START_FEN);
    }

    #[test]
    fn test_parse_position_rejects_garbage() {
        assert!(matches!(
            parse_position("not a fen"),
            Err(GameError::InvalidFen { .. })
        ));
    }
}
