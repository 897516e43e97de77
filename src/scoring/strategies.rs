//! Alternative ways of turning checkpoints into a final score.
//!
//! Every strategy returns points in the same `{possible, achieved}` shape
//! as the raw checkpoints and never awards more than is possible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Checkpoint;

/// Weighted checkpoint score.
///
/// Weights are normalised to sum to one. If their count does not match the
/// checkpoints, every checkpoint is weighted equally.
pub fn weighted_checkpoint_score(checkpoints: &[Checkpoint], weights: &[f64]) -> Checkpoint {
    if checkpoints.is_empty() {
        return Checkpoint::default();
    }

    let weight_sum: f64 = weights.iter().sum();
    let normalized: Vec<f64> = if weights.len() != checkpoints.len() || weight_sum <= 0.0 {
        vec![1.0 / checkpoints.len() as f64; checkpoints.len()]
    } else {
        weights.iter().map(|w| w / weight_sum).collect()
    };

    let possible = Checkpoint::sum(checkpoints).possible;
    let achieved: f64 = checkpoints
        .iter()
        .zip(&normalized)
        .map(|(cp, w)| f64::from(cp.achieved) * w)
        .sum();

    bounded(possible, achieved)
}

/// Outcome of [`time_penalized_score`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePenalized {
    pub points: Checkpoint,
    /// Seconds spent beyond the allowance.
    pub overtime_secs: f64,
}

/// Reduces achieved points by `penalty_factor` per allowance-length of overtime,
/// capped at losing everything.
pub fn time_penalized_score(
    checkpoints: &[Checkpoint],
    elapsed: Duration,
    allowance: Duration,
    penalty_factor: f64,
) -> TimePenalized {
    let base = Checkpoint::sum(checkpoints);
    let elapsed = elapsed.as_secs_f64();
    let allowance = allowance.as_secs_f64();

    if elapsed <= allowance {
        return TimePenalized {
            points: base,
            overtime_secs: 0.0,
        };
    }

    let overtime = elapsed - allowance;
    let penalty = if allowance > 0.0 {
        (overtime / allowance * penalty_factor).clamp(0.0, 1.0)
    } else {
        1.0
    };

    TimePenalized {
        points: bounded(base.possible, f64::from(base.achieved) * (1.0 - penalty)),
        overtime_secs: overtime,
    }
}

/// Efficiency in `[0, 1]`: 1.0 at or below the optimal action count, then
/// `optimal / actual`.
pub fn efficiency_score(action_count: usize, optimal_action_count: usize) -> f64 {
    if action_count <= optimal_action_count {
        1.0
    } else {
        optimal_action_count as f64 / action_count as f64
    }
}

/// Relative weights of the composite score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub checkpoint: f64,
    pub efficiency: f64,
    pub time: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            checkpoint: 0.7,
            efficiency: 0.2,
            time: 0.1,
        }
    }
}

/// Per-component view of a composite score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub checkpoint_score: f64,
    pub efficiency_score: f64,
    pub time_score: f64,
    pub composite_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub points: Checkpoint,
    pub breakdown: ScoreBreakdown,
}

/// Blends checkpoint ratio, efficiency and speed, then rescales onto the
/// checkpoint total.
pub fn composite_score(
    checkpoints: &[Checkpoint],
    efficiency: f64,
    elapsed: Duration,
    max_time: Duration,
    weights: CompositeWeights,
) -> CompositeScore {
    let base = Checkpoint::sum(checkpoints);
    let checkpoint_score = base.ratio();
    let time_score = if max_time.is_zero() {
        1.0
    } else {
        (1.0 - elapsed.as_secs_f64() / max_time.as_secs_f64()).max(0.0)
    };

    let composite = checkpoint_score * weights.checkpoint
        + efficiency * weights.efficiency
        + time_score * weights.time;

    CompositeScore {
        points: bounded(base.possible, composite * f64::from(base.possible)),
        breakdown: ScoreBreakdown {
            checkpoint_score,
            efficiency_score: efficiency,
            time_score,
            composite_score: composite,
        },
    }
}

/// Adds up to `bonus_factor` of the achieved points, scaled by a quality
/// metric in `[0, 1]`. Returns the points and the raw bonus.
pub fn quality_bonus_score(
    checkpoints: &[Checkpoint],
    quality: f64,
    bonus_factor: f64,
) -> (Checkpoint, f64) {
    let base = Checkpoint::sum(checkpoints);
    let bonus = f64::from(base.achieved) * quality * bonus_factor;
    (bounded(base.possible, f64::from(base.achieved) + bonus), bonus)
}

/// Truncates to whole points and caps at `possible`.
fn bounded(possible: u32, achieved: f64) -> Checkpoint {
    let achieved = achieved.max(0.0).floor().min(f64::from(possible)) as u32;
    Checkpoint::new(possible, achieved)
}
