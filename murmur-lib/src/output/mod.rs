//! Output channel abstraction and its back-ends.
//!
//! The engine only sees [`ChannelProvider`] and [`OutputChannel`]:
//! - `rodio_pool`: real playback through the default output device.
//! - `memory`: silent channels that record every command, for headless runs.

pub mod memory;
pub mod rodio_pool;

use crate::audio::SoundBuffer;

pub use memory::{MemoryChannelPool, MemoryChannelState, MemoryProbe};
pub use rodio_pool::RodioChannelPool;

/// One hardware/mixer voice slot claimed by a playing sound.
///
/// A channel is released back to its pool by [`OutputChannel::stop`] or by
/// dropping it.
pub trait OutputChannel: Send {
    /// Start playing `buffer`, looping forever when `looped` is set.
    fn play(&mut self, buffer: &SoundBuffer, looped: bool);
    /// Set the left and right gains applied to the playing buffer.
    fn set_gain(&mut self, left: f32, right: f32);
    fn pause(&mut self);
    fn resume(&mut self);
    /// Stop playback and release the slot.
    fn stop(&mut self);
    /// Return true while the channel is claimed and has audio queued.
    fn is_active(&self) -> bool;
}

/// Pool of output channels.
pub trait ChannelProvider: Send {
    /// Claim a free channel, or `None` when every slot is in use.
    fn find_free_channel(&mut self) -> Option<Box<dyn OutputChannel>>;
}
