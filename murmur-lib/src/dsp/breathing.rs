//! Breathing waveform: a slow sinusoidal swell around a base volume.

use super::pan::clamp_volume;

/// Volume of the breathing waveform at `time_seconds`.
///
/// `base * (1 + intensity * sin(time * angular_rate))`, clamped to `[0, 1]`.
pub fn breathing_level(base_volume: f32, intensity: f32, angular_rate: f32, time_seconds: f64) -> f32 {
    let phase = (time_seconds * angular_rate as f64).sin() as f32;
    clamp_volume(base_volume * (1.0 + intensity * phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_stays_within_intensity_band() {
        let base = 0.6;
        for step in 0..200 {
            let level = breathing_level(base, 0.2, 0.5, step as f64 * 0.37);
            assert!(level >= base * 0.8 - 1e-6 && level <= base * 1.2 + 1e-6);
        }
    }

    #[test]
    fn level_is_base_at_zero_phase() {
        assert_eq!(breathing_level(0.5, 0.2, 0.5, 0.0), 0.5);
    }

    #[test]
    fn level_clamps_loud_bases() {
        let peak = breathing_level(1.0, 0.2, 1.0, std::f64::consts::FRAC_PI_2);
        assert_eq!(peak, 1.0);
    }
}
