//! The mixing engine.
//!
//! [`Mixer`] owns the voice registry and exposes the control surface.
//! Implementation is split across:
//! - `controls`: load/play/pause/resume/stop, volume, pan, auto-balance, cleanup.
//! - `effects`: breathing and random pan walk tasks.
//! - `persist`: capture and restore of [`crate::settings::MixerSettings`].
//! - `transition`: stepped fades shared by user pans and the pan walk.
//! - `task`: cancellable task threads.
//!
//! Locking: the registry mutex is always taken before a voice mutex, task
//! threads only ever take their own voice mutex, and observers run with no
//! lock held.

mod allocator;
mod config;
mod controls;
mod effects;
mod persist;
mod task;
mod transition;
mod voice;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{RodioLoader, SoundLoader};
use crate::error::MixerError;
use crate::output::{ChannelProvider, MemoryChannelPool, MemoryProbe, RodioChannelPool};
use crate::tools::sync::lock;

pub use allocator::VoiceAllocator;
pub use config::{BreathingSettings, MixerConfig, PanWalkMode, PanWalkSettings};
pub use voice::{Effect, Observer, Parameter, PlaybackState, VoiceSnapshot};

use transition::FadeTiming;
use voice::Voice;

type VoiceHandle = Arc<Mutex<Voice>>;

/// Multi-voice ambient mixer.
///
/// All operations take `&self`; fades and effects run on background task
/// threads that are cancelled by [`Mixer::stop`], [`Mixer::remove`] and
/// [`Mixer::cleanup`]. Dropping the mixer runs `cleanup`.
pub struct Mixer {
    config: MixerConfig,
    allocator: VoiceAllocator,
    provider: Mutex<Box<dyn ChannelProvider>>,
    loader: Box<dyn SoundLoader>,
    voices: Mutex<HashMap<String, VoiceHandle>>,
    auto_balance: AtomicBool,
}

impl Mixer {
    /// Create a mixer over `provider`, decoding files with [`RodioLoader`].
    pub fn new(config: MixerConfig, provider: Box<dyn ChannelProvider>) -> Self {
        Self::with_loader(config, provider, Box::new(RodioLoader))
    }

    /// Create a mixer with a custom sound loader.
    pub fn with_loader(
        config: MixerConfig,
        provider: Box<dyn ChannelProvider>,
        loader: Box<dyn SoundLoader>,
    ) -> Self {
        let config = config.sanitized();
        Self {
            allocator: VoiceAllocator::new(config.voice_budget),
            config,
            provider: Mutex::new(provider),
            loader,
            voices: Mutex::new(HashMap::new()),
            auto_balance: AtomicBool::new(false),
        }
    }

    /// Open the default audio device.
    ///
    /// # Errors
    ///
    /// [`MixerError::Device`] when no output stream can be opened; callers
    /// should treat this as fatal.
    pub fn open_default(config: MixerConfig) -> Result<Self, MixerError> {
        let config = config.sanitized();
        let pool = RodioChannelPool::open(config.channel_count)?;
        Ok(Self::new(config, Box::new(pool)))
    }

    /// Build a mixer on silent in-memory channels.
    ///
    /// The returned probe shows what each channel was told to do.
    pub fn headless(config: MixerConfig) -> (Self, MemoryProbe) {
        let config = config.sanitized();
        let pool = MemoryChannelPool::new(config.channel_count);
        let probe = pool.probe();
        (Self::new(config, Box::new(pool)), probe)
    }

    /// Effective (sanitized) configuration.
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn voice_budget(&self) -> usize {
        self.allocator.voice_budget()
    }

    /// Registered identities in sorted order.
    pub fn voice_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.voices).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, identity: &str) -> bool {
        lock(&self.voices).contains_key(identity)
    }

    /// Consistent copy of one voice's state.
    pub fn snapshot(&self, identity: &str) -> Result<VoiceSnapshot, MixerError> {
        let handle = self.voice_handle(identity)?;
        let snapshot = lock(&handle).snapshot();
        Ok(snapshot)
    }

    /// Snapshots of every voice, sorted by identity.
    pub fn snapshots(&self) -> Vec<VoiceSnapshot> {
        let handles: Vec<VoiceHandle> = lock(&self.voices).values().cloned().collect();
        let mut snapshots: Vec<VoiceSnapshot> =
            handles.iter().map(|handle| lock(handle).snapshot()).collect();
        snapshots.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshots
    }

    /// Number of voices currently in [`PlaybackState::Playing`].
    pub fn playing_count(&self) -> usize {
        count_playing(&lock(&self.voices))
    }

    pub fn auto_balance_enabled(&self) -> bool {
        self.auto_balance.load(Ordering::SeqCst)
    }

    fn voice_handle(&self, identity: &str) -> Result<VoiceHandle, MixerError> {
        lock(&self.voices)
            .get(identity)
            .cloned()
            .ok_or_else(|| MixerError::NotFound(identity.to_string()))
    }

    fn fade_timing(&self) -> FadeTiming {
        FadeTiming {
            steps: self.config.fade_steps,
            interval: self.config.fade_interval(),
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Count playing voices. Caller holds the registry lock.
fn count_playing(voices: &HashMap<String, VoiceHandle>) -> usize {
    voices
        .values()
        .filter(|handle| lock(handle).is_playing())
        .count()
}
