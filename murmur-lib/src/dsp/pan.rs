//! Volume/pan to stereo gain mapping.
//!
//! The law attenuates only the side opposite the pan direction, linearly:
//! the favoured side always keeps the full logical volume.

/// Lowest and highest logical volume.
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
/// Full left and full right pan positions.
pub const PAN_RANGE: (f32, f32) = (-1.0, 1.0);

/// Map a clamped `(volume, pan)` pair to `(left_gain, right_gain)`.
///
/// Callers clamp first; out-of-range input gives unspecified gains.
///
/// # Example
/// ```rust
/// use murmur_lib::dsp::pan::stereo_gains;
///
/// assert_eq!(stereo_gains(0.8, 0.5), (0.4, 0.8));
/// assert_eq!(stereo_gains(0.8, -0.5), (0.8, 0.4));
/// ```
pub fn stereo_gains(volume: f32, pan: f32) -> (f32, f32) {
    if pan >= 0.0 {
        (volume * (1.0 - pan), volume)
    } else {
        (volume, volume * (1.0 + pan))
    }
}

/// Clamp a logical volume into `[0, 1]`, mapping NaN to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return VOLUME_RANGE.0;
    }
    volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1)
}

/// Clamp a pan position into `[-1, 1]`, mapping NaN to center.
pub fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() {
        return 0.0;
    }
    pan.clamp(PAN_RANGE.0, PAN_RANGE.1)
}
