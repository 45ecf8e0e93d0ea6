use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, used as the breathing phase clock.
///
/// A clock set before the epoch reads as zero.
pub(crate) fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
