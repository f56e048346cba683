// Points policy for logged workouts.
//
// 10 points base, +1 per full 10 kg lifted, +1 per full 10 minutes.
// The ledger only accepts bounded non-negative deltas, so the result is
// clamped to [0, MAX_WORKOUT_AWARD].

pub const BASE_POINTS: i64 = 10;
pub const MAX_WORKOUT_AWARD: i64 = 500;

const WEIGHT_DIVISOR: i64 = 10;
const DURATION_DIVISOR: i64 = 10;

/// Compute the award delta for a logged workout.
pub fn workout_points(weight_kg: Option<i64>, duration_min: Option<i64>) -> i64 {
    let mut points = BASE_POINTS;
    if let Some(weight) = weight_kg {
        points += weight.max(0) / WEIGHT_DIVISOR;
    }
    if let Some(duration) = duration_min {
        points += duration.max(0) / DURATION_DIVISOR;
    }
    points.min(MAX_WORKOUT_AWARD)
}
