//! Review data model: per-position evaluations and the final game artifact.

use chess_core::Position;
use serde::{Deserialize, Serialize};

use crate::engine::EngineLine;

/// Qualitative label of one played move, most favorable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClassification {
    Splendid,
    Perfect,
    Best,
    Excellent,
    Okay,
    Inaccuracy,
    Mistake,
    Blunder,
    Opening,
    Forced,
}

impl MoveClassification {
    pub const ALL: [MoveClassification; 10] = [
        MoveClassification::Splendid,
        MoveClassification::Perfect,
        MoveClassification::Best,
        MoveClassification::Excellent,
        MoveClassification::Okay,
        MoveClassification::Inaccuracy,
        MoveClassification::Mistake,
        MoveClassification::Blunder,
        MoveClassification::Opening,
        MoveClassification::Forced,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MoveClassification::Splendid => "splendid",
            MoveClassification::Perfect => "perfect",
            MoveClassification::Best => "best",
            MoveClassification::Excellent => "excellent",
            MoveClassification::Okay => "okay",
            MoveClassification::Inaccuracy => "inaccuracy",
            MoveClassification::Mistake => "mistake",
            MoveClassification::Blunder => "blunder",
            MoveClassification::Opening => "opening",
            MoveClassification::Forced => "forced",
        }
    }
}

/// One value per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideValues<T> {
    pub white: T,
    pub black: T,
}

impl<T> SideValues<T> {
    pub fn new(white: T, black: T) -> Self {
        Self { white, black }
    }

    pub fn get(&self, color: shakmaty::Color) -> &T {
        match color {
            shakmaty::Color::White => &self.white,
            shakmaty::Color::Black => &self.black,
        }
    }

    pub fn get_mut(&mut self, color: shakmaty::Color) -> &mut T {
        match color {
            shakmaty::Color::White => &mut self.white,
            shakmaty::Color::Black => &mut self.black,
        }
    }
}

/// External per-side ratings (e.g. from PGN headers or player profiles).
pub type PlayersRatings = SideValues<Option<u32>>;

/// A position paired with its engine lines and, after classification, the
/// judgment of the move that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub position: Position,
    /// Ordered by rank; empty only when the position was never evaluated
    pub lines: Vec<EngineLine>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub move_classification: Option<MoveClassification>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub best_move: Option<String>,
    /// Mover-perspective win probability lost by the move that produced this position
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub win_probability_drop: Option<f64>,
}

impl PositionEvaluation {
    pub fn new(position: Position, lines: Vec<EngineLine>) -> Self {
        Self {
            position,
            lines,
            move_classification: None,
            best_move: None,
            win_probability_drop: None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Rank 1 line, if any.
    pub fn top_line(&self) -> Option<&EngineLine> {
        self.lines.first()
    }
}

/// Search parameters a review was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    pub depth: u32,
    pub multi_pv: u32,
    pub workers_nb: usize,
}

/// Count of classified moves per label (one side).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub splendid: u32,
    pub perfect: u32,
    pub best: u32,
    pub excellent: u32,
    pub okay: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
    pub opening: u32,
    pub forced: u32,
}

impl ClassificationCounts {
    pub fn add(&mut self, classification: MoveClassification) {
        match classification {
            MoveClassification::Splendid => self.splendid += 1,
            MoveClassification::Perfect => self.perfect += 1,
            MoveClassification::Best => self.best += 1,
            MoveClassification::Excellent => self.excellent += 1,
            MoveClassification::Okay => self.okay += 1,
            MoveClassification::Inaccuracy => self.inaccuracy += 1,
            MoveClassification::Mistake => self.mistake += 1,
            MoveClassification::Blunder => self.blunder += 1,
            MoveClassification::Opening => self.opening += 1,
            MoveClassification::Forced => self.forced += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.splendid
            + self.perfect
            + self.best
            + self.excellent
            + self.okay
            + self.inaccuracy
            + self.mistake
            + self.blunder
            + self.opening
            + self.forced
    }
}

/// Terminal artifact of a review run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvaluation {
    /// Game order, length = moves + 1
    pub positions: Vec<PositionEvaluation>,
    pub accuracy: SideValues<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_ratings: Option<SideValues<f64>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opening: Option<String>,
    pub settings: EvaluationSettings,
}

impl GameEvaluation {
    /// Review of a game with no moves: nothing to judge.
    pub fn empty(initial: Position, settings: EvaluationSettings) -> Self {
        Self {
            positions: vec![PositionEvaluation::new(initial, Vec::new())],
            accuracy: SideValues::new(100.0, 100.0),
            estimated_ratings: None,
            opening: None,
            settings,
        }
    }

    /// Labels per side. The mover of position i is the side to move at i - 1.
    pub fn classification_counts(&self) -> SideValues<ClassificationCounts> {
        let mut counts = SideValues::<ClassificationCounts>::default();
        for pair in self.positions.windows(2) {
            if let Some(classification) = pair[1].move_classification {
                let mover = chess_core::fen::side_to_move(&pair[0].position.fen);
                counts.get_mut(mover).add(classification);
            }
        }
        counts
    }
}

/// How a review run ended. Cancellation is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Completed(GameEvaluation),
    Cancelled,
}

impl ReviewOutcome {
    pub fn into_evaluation(self) -> Option<GameEvaluation> {
        match self {
            ReviewOutcome::Completed(evaluation) => Some(evaluation),
            ReviewOutcome::Cancelled => None,
        }
    }
}
