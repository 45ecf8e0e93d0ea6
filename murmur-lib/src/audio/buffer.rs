//! Decoded, in-memory sound buffers and the loaders that produce them.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rodio::{Decoder, Source};

use crate::error::MixerError;

/// Interleaved, fully decoded audio shared between voices and channels.
///
/// Cloning is cheap: samples live behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    channels: u16,
    sample_rate: u32,
    samples: Arc<[f32]>,
}

impl SoundBuffer {
    /// Build a buffer from interleaved samples.
    ///
    /// A trailing partial frame is dropped so loops stay frame-aligned.
    pub fn new(channels: u16, sample_rate: u32, mut samples: Vec<f32>) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            channels,
            sample_rate,
            samples: samples.into(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of one pass through the buffer.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Source of decoded buffers for [`crate::mixer::Mixer::load`].
pub trait SoundLoader: Send + Sync {
    /// Decode the file at `path` completely into memory.
    fn load(&self, path: &Path) -> Result<SoundBuffer, MixerError>;
}

/// Loader that decodes files with `rodio`'s bundled decoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioLoader;

impl SoundLoader for RodioLoader {
    fn load(&self, path: &Path) -> Result<SoundBuffer, MixerError> {
        let file = File::open(path).map_err(|err| {
            MixerError::SourceUnavailable(format!("{}: {}", path.display(), err))
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|err| {
            MixerError::SourceUnavailable(format!("{}: {}", path.display(), err))
        })?;

        let channels = source.channels();
        if channels == 0 {
            return Err(MixerError::SourceUnavailable(format!(
                "{}: no audio channels",
                path.display()
            )));
        }
        let sample_rate = source.sample_rate();
        let samples: Vec<f32> = source.map(|sample| sample as f32).collect();

        debug!(
            "decoded {} ({} ch, {} Hz, {} samples)",
            path.display(),
            channels,
            sample_rate,
            samples.len()
        );

        Ok(SoundBuffer::new(channels, sample_rate, samples))
    }
}
