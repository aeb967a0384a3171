//! Move classification over a fully evaluated game.
//!
//! Pure over the evaluation sequence: no engine calls happen here. A move is
//! judged by comparing the best line of the position before it with the score
//! of the move actually played, from the mover's perspective.

use std::cmp::Ordering;

use chess_core::fen::{legal_move_count, side_to_move};
use shakmaty::Color;

use crate::analysis::{win_probability_drop, win_probability_for};
use crate::book_cache::OpeningBook;
use crate::engine::{EngineLine, Score};
use crate::evaluation::{MoveClassification, PositionEvaluation};

/// Plies from the start during which a book position earns `Opening`
pub const OPENING_PLY_WINDOW: usize = 20;

/// A non-top move losing at most this much is as good as the engine's choice
pub const SPLENDID_EPSILON: f64 = 0.005;

/// Gap between the best and the next distinct line that makes a move the only good one
pub const ONLY_MOVE_GAP: f64 = 0.10;

/// Upper drop bound per label, ascending. Anything above the last is a blunder.
pub const DROP_BANDS: [(f64, MoveClassification); 4] = [
    (0.02, MoveClassification::Excellent),
    (0.05, MoveClassification::Okay),
    (0.10, MoveClassification::Inaccuracy),
    (0.20, MoveClassification::Mistake),
];

/// Judgment of one move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveAssessment {
    pub classification: MoveClassification,
    pub win_probability_drop: f64,
}

/// Label every position after the first, and record each evaluated
/// position's best move.
///
/// A move stays unclassified when the position before it was never evaluated
/// or when no score for the move can be found.
pub fn classify_positions(evaluations: &mut [PositionEvaluation], book: &OpeningBook) {
    for evaluation in evaluations.iter_mut() {
        evaluation.best_move = evaluation
            .top_line()
            .and_then(EngineLine::first_move)
            .map(String::from);
    }

    for i in 1..evaluations.len() {
        let assessment = assess_move(&evaluations[i - 1], &evaluations[i], book);
        let current = &mut evaluations[i];
        current.move_classification = assessment.map(|a| a.classification);
        current.win_probability_drop = assessment.map(|a| a.win_probability_drop);
    }
}

/// Judge the move leading from `previous` to `current`.
pub fn assess_move(
    previous: &PositionEvaluation,
    current: &PositionEvaluation,
    book: &OpeningBook,
) -> Option<MoveAssessment> {
    let played = current.position.played_move.as_ref()?;
    let mover = side_to_move(&previous.position.fen);

    let best = select_best_line(&previous.lines, &played.uci, mover)?;
    let played_score = played_move_score(previous, current, &played.uci)?;
    let drop = win_probability_drop(best.score, played_score, mover);
    let is_top = best.first_move() == Some(played.uci.as_str());

    let classification = if legal_move_count(&previous.position.fen).ok() == Some(1) {
        MoveClassification::Forced
    } else if current.position.index <= OPENING_PLY_WINDOW
        && book.is_book_move(&previous.position.fen, &played.san, &current.position.fen)
    {
        MoveClassification::Opening
    } else if !is_top && drop <= SPLENDID_EPSILON && is_critical(&previous.lines, best, &played.uci, mover) {
        MoveClassification::Splendid
    } else if is_top && is_critical(&previous.lines, best, &played.uci, mover) {
        MoveClassification::Perfect
    } else if is_top {
        MoveClassification::Best
    } else {
        band_for_drop(drop)
    };

    Some(MoveAssessment {
        classification,
        win_probability_drop: drop,
    })
}

/// Label for a move that is not the engine's choice, by how much it lost.
pub fn band_for_drop(drop: f64) -> MoveClassification {
    DROP_BANDS
        .iter()
        .find(|(bound, _)| drop <= *bound)
        .map(|(_, classification)| *classification)
        .unwrap_or(MoveClassification::Blunder)
}

/// Highest scoring line for the mover. Equal scores prefer the line that
/// starts with the played move, then the lowest rank.
fn select_best_line<'a>(lines: &'a [EngineLine], played_uci: &str, mover: Color) -> Option<&'a EngineLine> {
    lines.iter().max_by(|a, b| {
        let wa = win_probability_for(a.score, mover);
        let wb = win_probability_for(b.score, mover);
        wa.partial_cmp(&wb)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let pa = a.first_move() == Some(played_uci);
                let pb = b.first_move() == Some(played_uci);
                pa.cmp(&pb)
            })
            .then_with(|| b.rank.cmp(&a.rank))
    })
}

/// Score reached by the played move: its own line in the previous position's
/// search when present, otherwise the best line of the resulting position.
fn played_move_score(previous: &PositionEvaluation, current: &PositionEvaluation, played_uci: &str) -> Option<Score> {
    previous
        .lines
        .iter()
        .find(|line| line.first_move() == Some(played_uci))
        .map(|line| line.score)
        .or_else(|| current.top_line().map(|line| line.score))
}

/// Whether every listed line other than the best one and the played one falls
/// at least [`ONLY_MOVE_GAP`] below the best line. Needs at least one such line.
fn is_critical(lines: &[EngineLine], best: &EngineLine, played_uci: &str, mover: Color) -> bool {
    let best_wp = win_probability_for(best.score, mover);
    let mut alternatives = lines
        .iter()
        .filter(|line| match line.first_move() {
            Some(first) => first != played_uci && Some(first) != best.first_move(),
            None => false,
        })
        .peekable();
    if alternatives.peek().is_none() {
        return false;
    }
    alternatives.all(|line| best_wp - win_probability_for(line.score, mover) >= ONLY_MOVE_GAP)
}
