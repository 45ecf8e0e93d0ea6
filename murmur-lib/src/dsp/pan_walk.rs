//! Bounded random walk math for the autonomous pan effect.

use rand::Rng;

/// Pick a walk destination uniformly in `[-limit, limit]`.
pub fn pick_target<R: Rng + ?Sized>(rng: &mut R, limit: f32) -> f32 {
    let limit = limit.abs();
    if limit == 0.0 {
        return 0.0;
    }
    rng.gen_range(-limit..=limit)
}

/// Return true once `current` is within `tolerance` of `target`.
pub fn reached(current: f32, target: f32, tolerance: f32) -> bool {
    (current - target).abs() < tolerance
}

/// Move `current` a `fraction` of the remaining distance toward `target`,
/// never by more than `max_step`, and keep the result inside `[-limit, limit]`.
pub fn step_toward(current: f32, target: f32, fraction: f32, max_step: f32, limit: f32) -> f32 {
    let step = ((target - current) * fraction).clamp(-max_step, max_step);
    let limit = limit.abs();
    (current + step).clamp(-limit, limit)
}
