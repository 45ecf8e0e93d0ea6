//! Engine-wide timing and policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_VOICE_BUDGET: usize = 3;
const DEFAULT_VOLUME: f32 = 0.5;
const DEFAULT_FADE_STEPS: u32 = 30;
const DEFAULT_FADE_INTERVAL_MS: u64 = 30;

/// How the random pan walk moves between destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanWalkMode {
    /// Glide to each destination with a standard fade, then rest 2-5 s.
    Faded,
    /// Nudge the pan a fraction of the remaining distance on every tick.
    Stepped,
}

/// Breathing effect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingSettings {
    pub interval_ms: u64,
    pub intensity: f32,
    /// Radians per wall-clock second.
    pub angular_rate: f32,
}

impl Default for BreathingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            intensity: 0.2,
            angular_rate: 0.5,
        }
    }
}

/// Random pan walk parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanWalkSettings {
    pub mode: PanWalkMode,
    /// Destinations are drawn from `[-limit, limit]`.
    pub limit: f32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub tick_ms: u64,
    pub tolerance: f32,
    pub step_fraction: f32,
    pub max_step: f32,
}

impl Default for PanWalkSettings {
    fn default() -> Self {
        Self {
            mode: PanWalkMode::Faded,
            limit: 0.8,
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            tick_ms: 100,
            tolerance: 0.01,
            step_fraction: 0.1,
            max_step: 0.1,
        }
    }
}

/// Configuration for a [`crate::mixer::Mixer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Maximum number of voices playing at once.
    pub voice_budget: usize,
    /// Output channels requested from the device back-end.
    pub channel_count: usize,
    /// Logical volume given to newly registered voices.
    pub default_volume: f32,
    pub fade_steps: u32,
    pub fade_interval_ms: u64,
    pub breathing: BreathingSettings,
    pub pan_walk: PanWalkSettings,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            voice_budget: DEFAULT_VOICE_BUDGET,
            channel_count: DEFAULT_VOICE_BUDGET * 2,
            default_volume: DEFAULT_VOLUME,
            fade_steps: DEFAULT_FADE_STEPS,
            fade_interval_ms: DEFAULT_FADE_INTERVAL_MS,
            breathing: BreathingSettings::default(),
            pan_walk: PanWalkSettings::default(),
        }
    }
}

impl MixerConfig {
    /// Return a copy with every value forced into a usable range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let breathing = BreathingSettings {
            interval_ms: self.breathing.interval_ms.max(1),
            intensity: finite_or(self.breathing.intensity, defaults.breathing.intensity)
                .clamp(0.0, 1.0),
            angular_rate: finite_or(self.breathing.angular_rate, defaults.breathing.angular_rate),
        };
        let min_delay_ms = self.pan_walk.min_delay_ms;
        let pan_walk = PanWalkSettings {
            mode: self.pan_walk.mode,
            limit: finite_or(self.pan_walk.limit, defaults.pan_walk.limit)
                .abs()
                .min(1.0),
            min_delay_ms,
            max_delay_ms: self.pan_walk.max_delay_ms.max(min_delay_ms),
            tick_ms: self.pan_walk.tick_ms.max(1),
            tolerance: finite_or(self.pan_walk.tolerance, defaults.pan_walk.tolerance).abs(),
            step_fraction: finite_or(self.pan_walk.step_fraction, defaults.pan_walk.step_fraction)
                .clamp(0.0, 1.0),
            max_step: finite_or(self.pan_walk.max_step, defaults.pan_walk.max_step).abs(),
        };
        let voice_budget = self.voice_budget.max(1);

        Self {
            voice_budget,
            channel_count: self.channel_count.max(voice_budget),
            default_volume: finite_or(self.default_volume, DEFAULT_VOLUME).clamp(0.0, 1.0),
            fade_steps: self.fade_steps.max(1),
            fade_interval_ms: self.fade_interval_ms,
            breathing,
            pan_walk,
        }
    }

    pub fn fade_interval(&self) -> Duration {
        Duration::from_millis(self.fade_interval_ms)
    }

    /// Wall time of one complete fade.
    pub fn fade_duration(&self) -> Duration {
        self.fade_interval() * self.fade_steps
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
