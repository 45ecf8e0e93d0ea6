//! Error types shared by the mixing engine and its collaborators.

use std::fmt::{Display, Formatter};

/// Recoverable and fatal failures reported by [`crate::mixer::Mixer`].
///
/// Everything except [`MixerError::Device`] is returned to the immediate
/// caller and leaves the engine usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    /// Voice budget or output channel pool is saturated.
    ResourceExhausted(String),
    /// No voice is registered under the given identity.
    NotFound(String),
    /// The operation does not apply to the voice's current state.
    InvalidState(String),
    /// A sound source could not be opened or decoded.
    SourceUnavailable(String),
    /// The audio output device could not be opened at all.
    Device(String),
}

impl MixerError {
    /// Return true for failures the surrounding application cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

impl Display for MixerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            Self::NotFound(identity) => write!(f, "voice not found: {}", identity),
            Self::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Self::SourceUnavailable(msg) => write!(f, "source unavailable: {}", msg),
            Self::Device(msg) => write!(f, "audio device error: {}", msg),
        }
    }
}

impl std::error::Error for MixerError {}
