//! Per-sound playback record.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::SoundBuffer;
use crate::dsp::pan::{clamp_pan, clamp_volume, stereo_gains};
use crate::output::OutputChannel;
use crate::tools::sync::lock;

use super::task::TaskHandle;

/// Callback receiving every applied volume or pan value of a voice.
pub type Observer = Arc<dyn Fn(f32) + Send + Sync>;

/// Transport state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Autonomous modulation effects a voice can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Breathing,
    PanWalk,
}

/// Scalar voice parameter animated by fades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Volume,
    Pan,
}

/// Point-in-time copy of a voice for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSnapshot {
    pub identity: String,
    pub volume: f32,
    pub pan: f32,
    pub state: PlaybackState,
    pub effects: Vec<Effect>,
    pub pan_walk_target: Option<f32>,
    /// Last `(left, right)` gains sent to the output channel.
    pub applied_gains: Option<(f32, f32)>,
}

impl VoiceSnapshot {
    pub fn has_effect(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

/// One tracked sound. Always accessed behind its own mutex.
pub(crate) struct Voice {
    pub(crate) identity: String,
    pub(crate) buffer: SoundBuffer,
    pub(crate) channel: Option<Box<dyn OutputChannel>>,
    pub(crate) volume: f32,
    pub(crate) pan: f32,
    pub(crate) state: PlaybackState,
    pub(crate) applied: Option<(f32, f32)>,
    /// Auto-balance gain that replaces the logical volume on output.
    pub(crate) balance: Option<f32>,
    pub(crate) volume_fade: Option<TaskHandle>,
    pub(crate) pan_fade: Option<TaskHandle>,
    pub(crate) breathing: Option<TaskHandle>,
    pub(crate) pan_walk: Option<TaskHandle>,
    pub(crate) pan_walk_target: Option<f32>,
    pub(crate) on_volume: Option<Observer>,
    pub(crate) on_pan: Option<Observer>,
    pub(crate) dispatch: Arc<ObserverDispatch>,
}

impl Voice {
    pub(crate) fn new(identity: String, buffer: SoundBuffer, volume: f32) -> Self {
        Self {
            identity,
            buffer,
            channel: None,
            volume: clamp_volume(volume),
            pan: 0.0,
            state: PlaybackState::Stopped,
            applied: None,
            balance: None,
            volume_fade: None,
            pan_fade: None,
            breathing: None,
            pan_walk: None,
            pan_walk_target: None,
            on_volume: None,
            on_pan: None,
            dispatch: Arc::new(ObserverDispatch::default()),
        }
    }

    pub(crate) fn parameter(&self, parameter: Parameter) -> f32 {
        match parameter {
            Parameter::Volume => self.volume,
            Parameter::Pan => self.pan,
        }
    }

    pub(crate) fn set_parameter(&mut self, parameter: Parameter, value: f32) {
        match parameter {
            Parameter::Volume => self.volume = clamp_volume(value),
            Parameter::Pan => self.pan = clamp_pan(value),
        }
    }

    pub(crate) fn fade_slot(&mut self, parameter: Parameter) -> &mut Option<TaskHandle> {
        match parameter {
            Parameter::Volume => &mut self.volume_fade,
            Parameter::Pan => &mut self.pan_fade,
        }
    }

    pub(crate) fn observer(&self, parameter: Parameter) -> Option<Observer> {
        match parameter {
            Parameter::Volume => self.on_volume.clone(),
            Parameter::Pan => self.on_pan.clone(),
        }
    }

    /// Push `(volume, pan)` through the pan law to the output channel.
    ///
    /// Stored logical values are untouched; a voice without a channel only
    /// forgets its applied gains.
    pub(crate) fn apply(&mut self, volume: f32, pan: f32) {
        let Some(channel) = self.channel.as_mut() else {
            self.applied = None;
            return;
        };
        let (left, right) = stereo_gains(clamp_volume(volume), clamp_pan(pan));
        channel.set_gain(left, right);
        self.applied = Some((left, right));
    }

    /// Apply the stored pan with the logical volume, or the auto-balance
    /// gain while one is set.
    pub(crate) fn apply_logical(&mut self) {
        let volume = self.balance.unwrap_or(self.volume);
        self.apply(volume, self.pan);
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub(crate) fn has_effect(&self, effect: Effect) -> bool {
        match effect {
            Effect::Breathing => self.breathing.is_some(),
            Effect::PanWalk => self.pan_walk.is_some(),
        }
    }

    /// Cancel every fade and effect task of this voice.
    pub(crate) fn cancel_activities(&mut self) {
        self.volume_fade = None;
        self.pan_fade = None;
        self.breathing = None;
        self.pan_walk = None;
        self.pan_walk_target = None;
    }

    pub(crate) fn snapshot(&self) -> VoiceSnapshot {
        let effects = [Effect::Breathing, Effect::PanWalk]
            .into_iter()
            .filter(|effect| self.has_effect(*effect))
            .collect();
        VoiceSnapshot {
            identity: self.identity.clone(),
            volume: self.volume,
            pan: self.pan,
            state: self.state,
            effects,
            pan_walk_target: self.pan_walk_target,
            applied_gains: self.applied,
        }
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("identity", &self.identity)
            .field("volume", &self.volume)
            .field("pan", &self.pan)
            .field("state", &self.state)
            .field("has_channel", &self.channel.is_some())
            .field("applied", &self.applied)
            .finish()
    }
}

/// Serialized, newest-wins delivery of one voice's observer calls.
///
/// Sequence numbers are taken under the voice lock, so they follow the order
/// values were applied. A value older than one already delivered for the same
/// parameter is dropped. Only one thread delivers at a time; a thread that
/// finds delivery busy queues its calls for the active deliverer and returns,
/// which also covers observers that call back into the mixer.
#[derive(Default)]
pub(crate) struct ObserverDispatch {
    next_seq: AtomicU64,
    state: Mutex<DispatchState>,
}

#[derive(Default)]
struct DispatchState {
    busy: bool,
    queue: VecDeque<Pending>,
    delivered: [u64; 2],
}

struct Pending {
    seq: u64,
    parameter: Parameter,
    observer: Observer,
    value: f32,
}

impl ObserverDispatch {
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn deliver(&self, pending: Vec<Pending>) {
        let mut state = lock(&self.state);
        state.queue.extend(pending);
        if state.busy {
            return;
        }
        state.busy = true;
        while let Some(next) = state.queue.pop_front() {
            let slot = match next.parameter {
                Parameter::Volume => 0,
                Parameter::Pan => 1,
            };
            if next.seq <= state.delivered[slot] {
                continue;
            }
            state.delivered[slot] = next.seq;
            drop(state);
            (next.observer)(next.value);
            state = lock(&self.state);
        }
        state.busy = false;
    }
}

/// Observer calls collected under a voice lock and fired after it is released.
///
/// Observers may call back into the mixer, so they never run while a voice
/// lock is held.
#[derive(Default)]
pub(crate) struct Notifications {
    pending: Vec<(Arc<ObserverDispatch>, Pending)>,
}

impl Notifications {
    /// Record a call for `parameter`. The caller holds the voice lock.
    pub(crate) fn push(&mut self, voice: &Voice, parameter: Parameter, value: f32) {
        if let Some(observer) = voice.observer(parameter) {
            let pending = Pending {
                seq: voice.dispatch.next_seq(),
                parameter,
                observer,
                value,
            };
            self.pending.push((voice.dispatch.clone(), pending));
        }
    }

    pub(crate) fn fire(self) {
        let mut batch: Vec<Pending> = Vec::new();
        let mut current: Option<Arc<ObserverDispatch>> = None;
        for (dispatch, pending) in self.pending {
            if let Some(active) = current.as_ref() {
                if !Arc::ptr_eq(active, &dispatch) {
                    active.deliver(std::mem::take(&mut batch));
                }
            }
            current = Some(dispatch);
            batch.push(pending);
        }
        if let Some(active) = current {
            active.deliver(batch);
        }
    }
}
