//! Accuracy and rating estimation from classified positions.

use chess_core::fen::side_to_move;

use crate::evaluation::{PlayersRatings, PositionEvaluation, SideValues};

/// Classified moves a side needs before a rating is estimated
pub const MIN_MOVES_FOR_RATING: usize = 10;

pub const MIN_RATING: f64 = 100.0;
pub const MAX_RATING: f64 = 3500.0;

/// Weight of the accuracy curve when blending with an external rating
const CURVE_WEIGHT: f64 = 0.6;

/// Decay per percentage point of win probability given up
const ACCURACY_DECAY: f64 = 0.04529;

/// Accuracy of one move, from the win probability it gave up.
///
/// Strictly decreasing over the whole drop range: 100 at no drop, about 64 at
/// a 10 point drop and about 1.1 when a certain win is thrown away. Never 0,
/// so the harmonic mean below stays finite.
pub fn move_accuracy(win_probability_drop: f64) -> f64 {
    let drop_percent = win_probability_drop.clamp(0.0, 1.0) * 100.0;
    100.0 * (-ACCURACY_DECAY * drop_percent).exp()
}

/// Aggregate accuracy of one side: the midpoint of the arithmetic and
/// harmonic means of its move accuracies, so a few bad moves weigh more than
/// in a plain average. A side with no judged moves is perfect.
pub fn side_accuracy(drops: &[f64]) -> f64 {
    if drops.is_empty() {
        return 100.0;
    }
    let accuracies: Vec<f64> = drops.iter().map(|d| move_accuracy(*d)).collect();
    let n = accuracies.len() as f64;
    let mean = accuracies.iter().sum::<f64>() / n;
    let harmonic = n / accuracies.iter().map(|a| 1.0 / a).sum::<f64>();
    ((mean + harmonic) / 2.0).clamp(0.0, 100.0)
}

/// Rating implied by an accuracy, optionally pulled toward a known rating.
pub fn estimate_rating(accuracy: f64, known_rating: Option<u32>) -> f64 {
    let curve = 400.0 + 2800.0 * (accuracy.clamp(0.0, 100.0) / 100.0).powi(4);
    let blended = match known_rating {
        Some(rating) => CURVE_WEIGHT * curve + (1.0 - CURVE_WEIGHT) * rating as f64,
        None => curve,
    };
    blended.clamp(MIN_RATING, MAX_RATING)
}

/// Win probability drops of each side's classified moves, in game order.
pub fn drops_by_side(evaluations: &[PositionEvaluation]) -> SideValues<Vec<f64>> {
    let mut drops = SideValues::<Vec<f64>>::default();
    for pair in evaluations.windows(2) {
        if let Some(drop) = pair[1].win_probability_drop {
            let mover = side_to_move(&pair[0].position.fen);
            drops.get_mut(mover).push(drop);
        }
    }
    drops
}

/// Per-side accuracy and, when both sides played enough judged moves,
/// estimated ratings.
///
/// The rating gate is shared: if either side has fewer than
/// [`MIN_MOVES_FOR_RATING`] judged moves, neither side gets an estimate, even
/// one with plenty of moves. Ratings are reported as a pair or not at all.
pub fn summarize(
    evaluations: &[PositionEvaluation],
    ratings: &PlayersRatings,
) -> (SideValues<f64>, Option<SideValues<f64>>) {
    let drops = drops_by_side(evaluations);
    let accuracy = SideValues::new(side_accuracy(&drops.white), side_accuracy(&drops.black));

    let enough = drops.white.len() >= MIN_MOVES_FOR_RATING && drops.black.len() >= MIN_MOVES_FOR_RATING;
    let estimated = enough.then(|| {
        SideValues::new(
            estimate_rating(accuracy.white, ratings.white),
            estimate_rating(accuracy.black, ratings.black),
        )
    });

    (accuracy, estimated)
}
