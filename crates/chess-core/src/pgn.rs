//! Lightweight regex-based PGN front end for single games.
//!
//! This does not validate moves; [`crate::build_positions`] replays them and
//! rejects anything illegal.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fen::STANDARD_START_FEN;

static TAG_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid tag pair regex"));
static TAG_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid tag regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("valid comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid variation regex"));
static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"O-O-O[+#]?|O-O[+#]?|[KQRBN][a-h]?[1-8]?x?[a-h][1-8][+#]?|[a-h](?:x[a-h])?[1-8](?:=?[QRBN])?[+#]?",
    )
    .expect("valid SAN regex")
});

/// One game read from PGN text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PgnGame {
    /// Tag pairs by name; later duplicates win
    pub tags: BTreeMap<String, String>,
    /// SAN moves of the main line
    pub moves: Vec<String>,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Player name for a side tag ("White" / "Black"), "?" when unknown.
    pub fn player(&self, side: &str) -> &str {
        self.tag(side).unwrap_or("?")
    }

    pub fn result(&self) -> &str {
        self.tag("Result").unwrap_or("*")
    }

    /// Numeric rating tag such as "WhiteElo"; "?" and "-" read as absent.
    pub fn rating(&self, name: &str) -> Option<u32> {
        self.tag(name)?.trim().parse().ok()
    }

    /// Starting FEN when the game declares a non-standard setup.
    pub fn initial_fen(&self) -> Option<&str> {
        if self.tag("SetUp") != Some("1") {
            return None;
        }
        self.tag("FEN")
            .map(str::trim)
            .filter(|fen| *fen != STANDARD_START_FEN)
    }
}

/// Parse the first game of a PGN string. `None` when no move is found.
pub fn parse_pgn(pgn: &str) -> Option<PgnGame> {
    let tags = TAG_PAIR_RE
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect();
    let moves = extract_moves(pgn);
    (!moves.is_empty()).then_some(PgnGame { tags, moves })
}

/// SAN moves of the main line, with tags, comments and variations removed.
pub fn extract_moves(pgn: &str) -> Vec<String> {
    let without_tags = TAG_SECTION_RE.replace_all(pgn, "");
    let mut text = COMMENT_RE.replace_all(&without_tags, "").into_owned();
    // Innermost first so nested variations disappear too
    while VARIATION_RE.is_match(&text) {
        text = VARIATION_RE.replace_all(&text, "").into_owned();
    }
    SAN_RE.find_iter(&text).map(|m| m.as_str().to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_and_moves() {
        let pgn = r#"[Event "Casual"]
[White "Player1"]
[Black "Player2"]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "?"]

1. e4 e5 2. Nf3 Nc6 1-0"#;

        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.player("White"), "Player1");
        assert_eq!(game.player("Black"), "Player2");
        assert_eq!(game.result(), "1-0");
        assert_eq!(game.tag("Event"), Some("Casual"));
        assert_eq!(game.rating("WhiteElo"), Some(1500));
        assert_eq!(game.rating("BlackElo"), None);
        assert!(game.initial_fen().is_none());
        assert_eq!(game.moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }

    #[test]
    fn test_missing_tags_have_defaults() {
        let game = parse_pgn("1. d4 d5 *").unwrap();
        assert_eq!(game.player("White"), "?");
        assert_eq!(game.result(), "*");
        assert!(game.tags.is_empty());
    }

    #[test]
    fn test_extract_moves_strips_comments_and_variations() {
        let pgn = "1. e4 {best by test} e5 (1... c5 2. Nf3 (2. c3)) 2. Nf3 ; old line\n2... Nc6 3. Bb5 a6 4. exd5 e8=Q+ O-O-O";
        assert_eq!(
            extract_moves(pgn),
            vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "exd5", "e8=Q+", "O-O-O"]
        );
    }

    #[test]
    fn test_setup_fen() {
        let pgn = r#"[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"]

1. e4 Kd7"#;
        let game = parse_pgn(pgn).unwrap();
        assert_eq!(game.initial_fen(), Some("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"));

        // FEN without SetUp is ignored, as is the standard start
        let game = parse_pgn(&pgn.replace("[SetUp \"1\"]", "")).unwrap();
        assert!(game.initial_fen().is_none());
        let standard = format!("[SetUp \"1\"]\n[FEN \"{STANDARD_START_FEN}\"]\n\n1. e4");
        assert!(parse_pgn(&standard).unwrap().initial_fen().is_none());
    }

    #[test]
    fn test_no_moves() {
        assert!(parse_pgn(r#"[White "Nobody"]"#).is_none());
    }
}
