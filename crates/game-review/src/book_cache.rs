//! Opening book for review.
//!
//! Two sources feed it: a built-in table of named mainline openings (used for
//! the `Opening` label and the game's opening name) and an optional binary
//! book produced by `build-book` from a PGN corpus.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::LazyLock;

use chess_core::fen::position_key;
use chess_core::build_positions;

use crate::error::ReviewError;
use crate::evaluation::PositionEvaluation;

/// Stats for a single book move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMoveStats {
    pub games: i32,
    pub white_wins: i32,
    pub draws: i32,
    pub black_wins: i32,
}

/// Binary book contents: position key -> (move_san -> stats)
pub type BookMoves = HashMap<String, HashMap<String, BookMoveStats>>;

/// Named openings as SAN sequences from the standard start.
const NAMED_LINES: &[(&str, &str)] = &[
    ("King's Pawn Game", "e4"),
    ("Queen's Pawn Game", "d4"),
    ("English Opening", "c4"),
    ("Réti Opening", "Nf3"),
    ("Bird Opening", "f4"),
    ("Open Game", "e4 e5"),
    ("King's Knight Opening", "e4 e5 Nf3"),
    ("King's Knight Opening: Normal Variation", "e4 e5 Nf3 Nc6"),
    ("Ruy Lopez", "e4 e5 Nf3 Nc6 Bb5"),
    ("Ruy Lopez: Morphy Defense", "e4 e5 Nf3 Nc6 Bb5 a6"),
    ("Ruy Lopez: Closed", "e4 e5 Nf3 Nc6 Bb5 a6 Ba4 Nf6 O-O Be7"),
    ("Ruy Lopez: Berlin Defense", "e4 e5 Nf3 Nc6 Bb5 Nf6"),
    ("Italian Game", "e4 e5 Nf3 Nc6 Bc4"),
    ("Italian Game: Giuoco Piano", "e4 e5 Nf3 Nc6 Bc4 Bc5"),
    ("Italian Game: Two Knights Defense", "e4 e5 Nf3 Nc6 Bc4 Nf6"),
    ("Scotch Game", "e4 e5 Nf3 Nc6 d4"),
    ("Scotch Game", "e4 e5 Nf3 Nc6 d4 exd4 Nxd4"),
    ("Petrov's Defense", "e4 e5 Nf3 Nf6"),
    ("Philidor Defense", "e4 e5 Nf3 d6"),
    ("Vienna Game", "e4 e5 Nc3"),
    ("King's Gambit", "e4 e5 f4"),
    ("King's Gambit Accepted", "e4 e5 f4 exf4"),
    ("Sicilian Defense", "e4 c5"),
    ("Sicilian Defense: Alapin Variation", "e4 c5 c3"),
    ("Sicilian Defense: Open", "e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3"),
    ("Sicilian Defense: Najdorf Variation", "e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 a6"),
    ("Sicilian Defense: Dragon Variation", "e4 c5 Nf3 d6 d4 cxd4 Nxd4 Nf6 Nc3 g6"),
    ("French Defense", "e4 e6"),
    ("French Defense: Normal Variation", "e4 e6 d4 d5"),
    ("French Defense: Advance Variation", "e4 e6 d4 d5 e5"),
    ("French Defense: Winawer Variation", "e4 e6 d4 d5 Nc3 Bb4"),
    ("Caro-Kann Defense", "e4 c6"),
    ("Caro-Kann Defense: Advance Variation", "e4 c6 d4 d5 e5"),
    ("Caro-Kann Defense: Classical Variation", "e4 c6 d4 d5 Nc3 dxe4 Nxe4 Bf5"),
    ("Pirc Defense", "e4 d6 d4 Nf6 Nc3 g6"),
    ("Scandinavian Defense", "e4 d5"),
    ("Scandinavian Defense: Main Line", "e4 d5 exd5 Qxd5 Nc3 Qa5"),
    ("Alekhine Defense", "e4 Nf6"),
    ("Modern Defense", "e4 g6"),
    ("Queen's Gambit", "d4 d5 c4"),
    ("Queen's Gambit Accepted", "d4 d5 c4 dxc4"),
    ("Queen's Gambit Declined", "d4 d5 c4 e6"),
    ("Slav Defense", "d4 d5 c4 c6"),
    ("London System", "d4 d5 Bf4"),
    ("London System", "d4 Nf6 Bf4"),
    ("Indian Defense", "d4 Nf6"),
    ("King's Indian Defense", "d4 Nf6 c4 g6 Nc3 Bg7 e4 d6"),
    ("Grünfeld Defense", "d4 Nf6 c4 g6 Nc3 d5"),
    ("Nimzo-Indian Defense", "d4 Nf6 c4 e6 Nc3 Bb4"),
    ("Queen's Indian Defense", "d4 Nf6 c4 e6 Nf3 b6"),
    ("Catalan Opening", "d4 Nf6 c4 e6 g3"),
    ("Benoni Defense", "d4 Nf6 c4 c5 d5"),
    ("Dutch Defense", "d4 f5"),
    ("English Opening: Symmetrical Variation", "c4 c5"),
    ("English Opening: King's English Variation", "c4 e5"),
];

/// Position key -> opening name, built once from [`NAMED_LINES`].
///
/// Every position along a line is included. Intermediate positions take the
/// name of the deepest named line that ends at or before them.
static NAMED_POSITIONS: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut endpoints: HashMap<String, &'static str> = HashMap::new();
    let mut walks = Vec::with_capacity(NAMED_LINES.len());

    for &(name, line) in NAMED_LINES {
        let moves: Vec<String> = line.split_whitespace().map(String::from).collect();
        match build_positions(None, &moves) {
            Ok(positions) => {
                if let Some(last) = positions.last() {
                    endpoints.insert(position_key(&last.fen), name);
                }
                walks.push((name, positions));
            }
            Err(e) => tracing::warn!(opening = name, error = %e, "Skipping invalid opening line"),
        }
    }

    let mut named = HashMap::new();
    for (name, positions) in walks {
        let mut current = name;
        for position in positions.iter().skip(1) {
            let key = position_key(&position.fen);
            if let Some(endpoint) = endpoints.get(&key) {
                current = endpoint;
            }
            named.entry(key).or_insert(current);
        }
    }
    named
});

/// Lookup structure used by the classifier.
#[derive(Debug, Clone, Default)]
pub struct OpeningBook {
    moves: BookMoves,
}

impl OpeningBook {
    /// Book backed by the built-in named openings only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Built-in openings plus a binary book file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReviewError> {
        let path = path.as_ref();
        let moves = load_book(path)?;
        let total_moves: usize = moves.values().map(|m| m.len()).sum();
        tracing::info!(
            path = %path.display(),
            positions = moves.len(),
            moves = total_moves,
            "Loaded opening book"
        );
        Ok(Self { moves })
    }

    pub fn from_moves(moves: BookMoves) -> Self {
        Self { moves }
    }

    /// Whether `move_san` played from `fen_before`, reaching `fen_after`, is
    /// established theory.
    pub fn is_book_move(&self, fen_before: &str, move_san: &str, fen_after: &str) -> bool {
        if NAMED_POSITIONS.contains_key(&position_key(fen_after)) {
            return true;
        }
        self.moves
            .get(&position_key(fen_before))
            .map(|moves| moves.contains_key(move_san))
            .unwrap_or(false)
    }

    /// Name of the opening a position belongs to, if it is a named line.
    pub fn opening_name(&self, fen: &str) -> Option<&'static str> {
        NAMED_POSITIONS.get(&position_key(fen)).copied()
    }

    /// Name of the deepest named position reached in the game.
    pub fn identify(&self, positions: &[PositionEvaluation]) -> Option<&'static str> {
        positions
            .iter()
            .rev()
            .find_map(|p| self.opening_name(&p.position.fen))
    }
}

/// Load a book from a binary file.
pub fn load_book<P: AsRef<Path>>(path: P) -> Result<BookMoves, ReviewError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| ReviewError::Book(format!("{}: {e}", path.display())))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| ReviewError::Book(format!("{}: {e}", path.display())))
}

/// Write a book to a binary file.
pub fn save_book<P: AsRef<Path>>(path: P, moves: &BookMoves) -> Result<(), ReviewError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    bincode::serialize_into(BufWriter::new(file), moves)
        .map_err(|e| ReviewError::Book(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fens(line: &str) -> Vec<String> {
        let moves: Vec<String> = line.split_whitespace().map(String::from).collect();
        build_positions(None, &moves)
            .unwrap()
            .into_iter()
            .map(|p| p.fen)
            .collect()
    }

    #[test]
    fn test_all_named_lines_are_legal() {
        for (name, line) in NAMED_LINES {
            let moves: Vec<String> = line.split_whitespace().map(String::from).collect();
            assert!(build_positions(None, &moves).is_ok(), "{name}: {line}");
        }
    }

    #[test]
    fn test_open_game_is_book() {
        let book = OpeningBook::builtin();
        let f = fens("e4 e5 Nf3");
        assert!(book.is_book_move(&f[0], "e4", &f[1]));
        assert!(book.is_book_move(&f[1], "e5", &f[2]));
        assert!(book.is_book_move(&f[2], "Nf3", &f[3]));
    }

    #[test]
    fn test_unknown_move_is_not_book() {
        let book = OpeningBook::builtin();
        let f = fens("e4 e5 Qh5");
        assert!(!book.is_book_move(&f[2], "Qh5", &f[3]));
    }

    #[test]
    fn test_intermediate_positions_inherit_name() {
        let book = OpeningBook::builtin();
        let f = fens("e4 c5 Nf3 d6 d4");
        assert_eq!(book.opening_name(&f[2]), Some("Sicilian Defense"));
        assert_eq!(book.opening_name(&f[5]), Some("Sicilian Defense"));
    }

    #[test]
    fn test_endpoint_names() {
        let book = OpeningBook::builtin();
        let f = fens("e4 e5 Nf3 Nc6 Bb5 a6");
        assert_eq!(book.opening_name(&f[5]), Some("Ruy Lopez"));
        assert_eq!(book.opening_name(&f[6]), Some("Ruy Lopez: Morphy Defense"));
    }

    #[test]
    fn test_en_passant_field_does_not_matter() {
        let book = OpeningBook::builtin();
        assert_eq!(
            book.opening_name("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"),
            Some("King's Pawn Game")
        );
    }

    #[test]
    fn test_binary_book_move() {
        let f = fens("a3 a6");
        let mut moves = BookMoves::new();
        moves
            .entry(position_key(&f[1]))
            .or_default()
            .insert("h3".to_string(), BookMoveStats { games: 12, ..Default::default() });
        let book = OpeningBook::from_moves(moves);

        let after = fens("a3 a6 h3");
        assert!(book.is_book_move(&f[1], "h3", &after[3]));
        assert!(!book.is_book_move(&f[1], "h4", &after[3]));
    }

    #[test]
    fn test_save_and_load_book() {
        let path = std::env::temp_dir().join(format!("review-book-{}.bin", std::process::id()));
        let mut moves = BookMoves::new();
        moves.entry("k".into()).or_default().insert("e4".into(), BookMoveStats::default());
        save_book(&path, &moves).unwrap();
        let loaded = load_book(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, moves);
    }

    #[test]
    fn test_missing_book_file() {
        assert!(matches!(
            OpeningBook::load("/nonexistent/book.bin"),
            Err(ReviewError::Book(_))
        ));
    }
}
