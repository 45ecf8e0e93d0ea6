//! Decoded audio buffers and sound loading.

pub mod buffer;

pub use buffer::{RodioLoader, SoundBuffer, SoundLoader};
