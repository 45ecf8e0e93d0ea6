//! Silent channel pool that records what the engine asked of it.

use std::sync::{Arc, Mutex};

use crate::audio::SoundBuffer;
use crate::tools::sync::lock;

use super::{ChannelProvider, OutputChannel};

/// Observable state of one in-memory channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryChannelState {
    pub claimed: bool,
    pub playing: bool,
    pub paused: bool,
    pub looped: bool,
    pub frames: usize,
    pub gains: Option<(f32, f32)>,
    pub gain_writes: usize,
    pub plays: usize,
}

type SharedSlots = Arc<Mutex<Vec<MemoryChannelState>>>;

/// Fixed-size pool of channels that never produce sound.
pub struct MemoryChannelPool {
    slots: SharedSlots,
}

impl MemoryChannelPool {
    pub fn new(channel_count: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![
                MemoryChannelState::default();
                channel_count
            ])),
        }
    }

    /// Handle for inspecting channel state after the pool moved into a mixer.
    pub fn probe(&self) -> MemoryProbe {
        MemoryProbe {
            slots: self.slots.clone(),
        }
    }
}

impl ChannelProvider for MemoryChannelPool {
    fn find_free_channel(&mut self) -> Option<Box<dyn OutputChannel>> {
        let mut slots = lock(&self.slots);
        let index = slots.iter().position(|slot| !slot.claimed)?;
        slots[index] = MemoryChannelState {
            claimed: true,
            ..MemoryChannelState::default()
        };
        Some(Box::new(MemoryChannel {
            index,
            slots: self.slots.clone(),
            released: false,
        }))
    }
}

/// Read-only view of a [`MemoryChannelPool`].
#[derive(Clone)]
pub struct MemoryProbe {
    slots: SharedSlots,
}

impl MemoryProbe {
    pub fn channels(&self) -> Vec<MemoryChannelState> {
        lock(&self.slots).clone()
    }

    pub fn claimed_count(&self) -> usize {
        lock(&self.slots).iter().filter(|slot| slot.claimed).count()
    }
}

struct MemoryChannel {
    index: usize,
    slots: SharedSlots,
    released: bool,
}

impl MemoryChannel {
    fn with_slot(&self, update: impl FnOnce(&mut MemoryChannelState)) {
        if self.released {
            return;
        }
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get_mut(self.index) {
            update(slot);
        }
    }
}

impl OutputChannel for MemoryChannel {
    fn play(&mut self, buffer: &SoundBuffer, looped: bool) {
        self.with_slot(|slot| {
            slot.playing = true;
            slot.paused = false;
            slot.looped = looped;
            slot.frames = buffer.frames();
            slot.plays += 1;
        });
    }

    fn set_gain(&mut self, left: f32, right: f32) {
        self.with_slot(|slot| {
            slot.gains = Some((left, right));
            slot.gain_writes += 1;
        });
    }

    fn pause(&mut self) {
        self.with_slot(|slot| slot.paused = true);
    }

    fn resume(&mut self) {
        self.with_slot(|slot| slot.paused = false);
    }

    fn stop(&mut self) {
        self.with_slot(|slot| {
            slot.playing = false;
            slot.paused = false;
            slot.claimed = false;
        });
        self.released = true;
    }

    fn is_active(&self) -> bool {
        if self.released {
            return false;
        }
        lock(&self.slots)
            .get(self.index)
            .map(|slot| slot.claimed && slot.playing)
            .unwrap_or(false)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.stop();
    }
}
