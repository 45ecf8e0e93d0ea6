//! # Murmur Mixing Library
//!
//! Core engine for layering looping ambient sounds. Each sound is a voice with
//! its own volume and pan, smooth stepped fades, and two autonomous modulation
//! effects (breathing and a random pan walk). A voice budget caps how many
//! sounds play at once, and an optional auto-balance keeps the mix level.
//!
//! The [`Mixer`] is the entry point; output goes through a
//! [`output::ChannelProvider`] (rodio for real playback, an in-memory pool for
//! headless use and tests).

pub mod audio;
pub mod dsp;
pub mod error;
pub mod mixer;
pub mod output;
pub mod settings;
mod tools;

pub use error::MixerError;
pub use mixer::{
    Effect, Mixer, MixerConfig, Parameter, PanWalkMode, PlaybackState, VoiceSnapshot,
};
pub use settings::{MixerSettings, SettingsError, SoundSettings};
