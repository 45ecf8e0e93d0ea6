//! Stepped linear fades of a single voice parameter.
//!
//! A fade applies `steps + 1` values: the start value immediately on the
//! calling thread, then one interpolated value per interval on a task thread,
//! ending exactly on the target. At most one fade per (voice, parameter) is in
//! flight; starting a new one cancels the previous before its first value is
//! applied.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::debug;

use crate::dsp::pan::{clamp_pan, clamp_volume};
use crate::tools::sync::lock;

use super::task::{CancelToken, TaskHandle};
use super::voice::{Notifications, Parameter, Voice};

/// Callback fired once after a fade applied its final value.
pub(crate) type Completion = Box<dyn FnOnce() + Send>;

/// Step count and spacing shared by every fade of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FadeTiming {
    pub(crate) steps: u32,
    pub(crate) interval: Duration,
}

/// Value of step `step` out of `steps` on the line from `start` to `target`.
pub(crate) fn interpolate(start: f32, target: f32, step: u32, steps: u32) -> f32 {
    if step >= steps {
        return target;
    }
    start + (target - start) * step as f32 / steps as f32
}

/// Start a fade on a voice whose lock the caller holds.
///
/// `handle` is the registry entry for `voice`; the task keeps only a weak
/// reference and stops quietly once the voice is dropped.
#[allow(clippy::too_many_arguments)]
pub(crate) fn start_transition(
    handle: &Arc<Mutex<Voice>>,
    voice: &mut Voice,
    parameter: Parameter,
    start: f32,
    target: f32,
    timing: FadeTiming,
    on_complete: Option<Completion>,
    notes: &mut Notifications,
) {
    let (start, target) = match parameter {
        Parameter::Volume => (clamp_volume(start), clamp_volume(target)),
        Parameter::Pan => (clamp_pan(start), clamp_pan(target)),
    };

    // Superseded fade is cancelled while we still hold the voice lock.
    voice.fade_slot(parameter).take();
    apply_step(voice, parameter, start, notes);

    debug!(
        "{}: {:?} fade {:.2} -> {:.2} over {} steps",
        voice.identity, parameter, start, target, timing.steps
    );

    let weak = Arc::downgrade(handle);
    let name = match parameter {
        Parameter::Volume => "volume-fade",
        Parameter::Pan => "pan-fade",
    };
    let task = TaskHandle::spawn(name, move |token| {
        run_transition(weak, token, parameter, start, target, timing, on_complete)
    });
    *voice.fade_slot(parameter) = Some(task);
}

fn run_transition(
    voice: Weak<Mutex<Voice>>,
    token: Arc<CancelToken>,
    parameter: Parameter,
    start: f32,
    target: f32,
    timing: FadeTiming,
    on_complete: Option<Completion>,
) {
    for step in 1..=timing.steps {
        if !token.sleep(timing.interval) {
            return;
        }
        let Some(handle) = voice.upgrade() else {
            return;
        };

        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            if token.is_cancelled() {
                return;
            }
            let value = interpolate(start, target, step, timing.steps);
            apply_step(&mut voice, parameter, value, &mut notes);
            if step == timing.steps {
                voice.fade_slot(parameter).take();
            }
        }
        notes.fire();
    }

    if let Some(on_complete) = on_complete {
        on_complete();
    }
}

fn apply_step(voice: &mut Voice, parameter: Parameter, value: f32, notes: &mut Notifications) {
    voice.set_parameter(parameter, value);
    voice.apply_logical();
    let stored = voice.parameter(parameter);
    notes.push(voice, parameter, stored);
}
