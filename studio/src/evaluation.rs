//! Evaluation model: turns side-to-move relative engine scores into the
//! player-relative label and bar value shown to the user.

use chess::PlayerSide;
use engine::{EvaluationSample, Score};
use serde::Serialize;

/// Centipawn magnitude beyond which the bar is saturated.
const CP_CLAMP: i32 = 1000;

/// Steepness of the logistic mapping from centipawns to bar height.
const CP_SCALE: f64 = 110.0;

/// Current evaluation from the human player's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Player-relative score, `None` before the engine reported one.
    pub score: Option<Score>,
    pub label: String,
    /// Bar fill in `[0, 1]`; above 0.5 favours the player.
    pub bar: f64,
}

impl Evaluation {
    pub fn neutral() -> Self {
        Self {
            score: None,
            label: format_score(None),
            bar: normalize(None),
        }
    }

    /// Build the player-facing evaluation from an engine reading.
    pub fn from_sample(sample: EvaluationSample, side_to_move: PlayerSide, human: PlayerSide) -> Self {
        let score = sample
            .score
            .map(|score| to_player_perspective(score, side_to_move, human));
        Self {
            score,
            label: format_score(score),
            bar: normalize(score),
        }
    }
}

impl Default for Evaluation {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Flip an engine score (relative to the side to move) so that it is
/// relative to `human`.
pub fn to_player_perspective(score: Score, side_to_move: PlayerSide, human: PlayerSide) -> Score {
    if side_to_move == human {
        score
    } else {
        score.negate()
    }
}

/// Map a score onto `[0, 1]`. Mates saturate; centipawns follow a logistic
/// curve clamped at ±10 pawns.
pub fn normalize(score: Option<Score>) -> f64 {
    match score {
        None => 0.5,
        Some(Score::Mate(n)) if n > 0 => 1.0,
        Some(Score::Mate(_)) => 0.0,
        Some(Score::Centipawns(cp)) => {
            let cp = f64::from(cp.clamp(-CP_CLAMP, CP_CLAMP));
            1.0 / (1.0 + (-cp / CP_SCALE).exp())
        }
    }
}

/// Display label: `+0.34`, `-1.20`, `0.00`, `M3`, `M-3`.
pub fn format_score(score: Option<Score>) -> String {
    match score {
        None => "0.00".to_string(),
        Some(Score::Centipawns(cp)) => {
            let pawns = f64::from(cp) / 100.0;
            if pawns.abs() < 0.01 {
                "0.00".to_string()
            } else {
                format!("{:+.2}", pawns)
            }
        }
        Some(Score::Mate(n)) if n < 0 => format!("M-{}", n.unsigned_abs()),
        Some(Score::Mate(n)) => format!("M{}", n),
    }
}
