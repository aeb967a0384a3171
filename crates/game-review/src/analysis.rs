/// Score transforms: engine scores to win probabilities, pure functions only
/// (No Engine/Pool/Scheduler dependencies)

use shakmaty::Color;

use crate::engine::Score;

/// Centipawn scores are clamped to this magnitude before conversion
pub const CP_CEILING: i32 = 1000;

/// Logistic slope per centipawn
const WIN_PROBABILITY_SLOPE: f64 = 0.003_682_08;

/// Mates further away than this all map to the ceiling
const MATE_HORIZON: i32 = 20;

/// Extra pseudo-centipawns per move of mate distance inside the horizon
const MATE_STEP_CP: i32 = 100;

/// Pseudo-centipawn value of a score, White's perspective.
///
/// Mates saturate beyond [`CP_CEILING`], closer mates further out, so a
/// faster mate always compares as better than a slower one.
pub fn score_to_centipawns(score: Score) -> i32 {
    match score {
        Score::Centipawns(cp) => cp.clamp(-CP_CEILING, CP_CEILING),
        Score::Mate(n) => {
            let distance = n.abs().min(MATE_HORIZON);
            let magnitude = CP_CEILING + (MATE_HORIZON - distance) * MATE_STEP_CP;
            if n >= 0 { magnitude } else { -magnitude }
        }
    }
}

/// Probability in [0, 1] that White wins.
pub fn win_probability(score: Score) -> f64 {
    let cp = score_to_centipawns(score) as f64;
    1.0 / (1.0 + (-WIN_PROBABILITY_SLOPE * cp).exp())
}

/// Win probability from `color`'s point of view.
pub fn win_probability_for(score: Score, color: Color) -> f64 {
    let white = win_probability(score);
    match color {
        Color::White => white,
        Color::Black => 1.0 - white,
    }
}

/// Win probability the mover gave up by reaching `played` instead of `best`.
/// Never negative: a move that scores above the reference line costs nothing.
pub fn win_probability_drop(best: Score, played: Score, mover: Color) -> f64 {
    (win_probability_for(best, mover) - win_probability_for(played, mover)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_position_is_half() {
        assert!((win_probability(Score::Centipawns(0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_win_probability_is_symmetric() {
        for cp in [15, 80, 250, 600] {
            let w = win_probability(Score::Centipawns(cp));
            let b = win_probability(Score::Centipawns(-cp));
            assert!((w + b - 1.0).abs() < 1e-12);
            assert!(w > 0.5);
        }
    }

    #[test]
    fn test_centipawns_are_clamped() {
        assert_eq!(score_to_centipawns(Score::Centipawns(5000)), CP_CEILING);
        assert_eq!(score_to_centipawns(Score::Centipawns(-5000)), -CP_CEILING);
        assert_eq!(
            win_probability(Score::Centipawns(1500)),
            win_probability(Score::Centipawns(1000))
        );
    }

    #[test]
    fn test_mate_ordering() {
        let m1 = score_to_centipawns(Score::Mate(1));
        let m5 = score_to_centipawns(Score::Mate(5));
        let m40 = score_to_centipawns(Score::Mate(40));
        assert!(m1 > m5);
        assert!(m5 > m40);
        assert!(m40 >= score_to_centipawns(Score::Centipawns(900)));
        assert_eq!(score_to_centipawns(Score::Mate(-3)), -score_to_centipawns(Score::Mate(3)));
    }

    #[test]
    fn test_win_probability_for_black() {
        let score = Score::Centipawns(200);
        let white = win_probability_for(score, Color::White);
        let black = win_probability_for(score, Color::Black);
        assert!((white + black - 1.0).abs() < 1e-12);
        assert!(black < 0.5);
    }

    #[test]
    fn test_drop_from_mover_perspective() {
        // Black lets a level game slip to +3 for White
        let drop = win_probability_drop(Score::Centipawns(0), Score::Centipawns(300), Color::Black);
        assert!(drop > 0.2);
        // Same swing is a gain for White, so nothing is lost
        let gain = win_probability_drop(Score::Centipawns(0), Score::Centipawns(300), Color::White);
        assert_eq!(gain, 0.0);
    }
}
