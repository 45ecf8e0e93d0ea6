//! Autonomous modulation effects: breathing and the random pan walk.
//!
//! Each effect runs on its own task thread holding a weak reference to its
//! voice. Effects keep ticking while a voice is paused; they are cancelled by
//! their stop call, by `stop`, `remove` and `cleanup`.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, info};
use rand::Rng;

use crate::dsp::breathing::breathing_level;
use crate::dsp::pan_walk::{pick_target, reached, step_toward};
use crate::error::MixerError;
use crate::tools::clock::wall_clock_seconds;
use crate::tools::sync::lock;

use super::config::{BreathingSettings, PanWalkMode, PanWalkSettings};
use super::task::{CancelToken, TaskHandle};
use super::transition::{start_transition, Completion, FadeTiming};
use super::voice::{Effect, Notifications, Parameter, Voice};
use super::Mixer;

impl Mixer {
    /// Start the breathing swell around the voice's current logical volume.
    ///
    /// Starting an active effect succeeds without restarting it.
    ///
    /// # Errors
    ///
    /// [`MixerError::InvalidState`] when the voice is not playing.
    pub fn start_breathing(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut voice = lock(&handle);
        if !begin_effect(&voice, Effect::Breathing)? {
            return Ok(());
        }
        let base_volume = voice.volume;
        let settings = self.config.breathing;
        let weak = Arc::downgrade(&handle);
        voice.breathing = Some(TaskHandle::spawn("breathing", move |token| {
            run_breathing(weak, token, base_volume, settings)
        }));
        info!("{}: breathing around {:.2}", identity, base_volume);
        Ok(())
    }

    /// Stop breathing and restore the logical volume exactly.
    pub fn stop_breathing(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            if voice.breathing.take().is_none() {
                return Err(MixerError::InvalidState(format!(
                    "{} is not breathing",
                    identity
                )));
            }
            voice.apply_logical();
            let volume = voice.volume;
            notes.push(&voice, Parameter::Volume, volume);
        }
        notes.fire();
        info!("{}: breathing stopped", identity);
        Ok(())
    }

    /// Start wandering the pan between random targets.
    ///
    /// Starting an active walk succeeds without restarting it.
    ///
    /// # Errors
    ///
    /// [`MixerError::InvalidState`] when the voice is not playing.
    pub fn start_pan_walk(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut voice = lock(&handle);
        if !begin_effect(&voice, Effect::PanWalk)? {
            return Ok(());
        }
        let settings = self.config.pan_walk;
        let timing = self.fade_timing();
        let weak = Arc::downgrade(&handle);
        let task = match settings.mode {
            PanWalkMode::Faded => TaskHandle::spawn("pan-walk", move |token| {
                run_faded_walk(weak, token, settings, timing)
            }),
            PanWalkMode::Stepped => TaskHandle::spawn("pan-walk", move |token| {
                run_stepped_walk(weak, token, settings)
            }),
        };
        voice.pan_walk = Some(task);
        info!("{}: pan walk started ({:?})", identity, settings.mode);
        Ok(())
    }

    /// Stop the pan walk and snap the pan back to center.
    pub fn stop_pan_walk(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            if voice.pan_walk.take().is_none() {
                return Err(MixerError::InvalidState(format!(
                    "{} has no pan walk",
                    identity
                )));
            }
            voice.pan_fade = None;
            voice.pan_walk_target = None;
            voice.set_parameter(Parameter::Pan, 0.0);
            voice.apply_logical();
            notes.push(&voice, Parameter::Pan, 0.0);
        }
        notes.fire();
        info!("{}: pan walk stopped", identity);
        Ok(())
    }
}

/// Check that `effect` may start. `Ok(false)` means it is already running.
fn begin_effect(voice: &Voice, effect: Effect) -> Result<bool, MixerError> {
    if voice.has_effect(effect) {
        return Ok(false);
    }
    if !voice.is_playing() {
        return Err(MixerError::InvalidState(format!(
            "{} is not playing",
            voice.identity
        )));
    }
    Ok(true)
}

fn run_breathing(
    voice: Weak<Mutex<Voice>>,
    token: Arc<CancelToken>,
    base_volume: f32,
    settings: BreathingSettings,
) {
    let interval = Duration::from_millis(settings.interval_ms);
    loop {
        let Some(handle) = voice.upgrade() else {
            return;
        };
        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            if token.is_cancelled() {
                return;
            }
            let level = breathing_level(
                base_volume,
                settings.intensity,
                settings.angular_rate,
                wall_clock_seconds(),
            );
            let pan = voice.pan;
            voice.apply(level, pan);
            notes.push(&voice, Parameter::Volume, level);
        }
        drop(handle);
        notes.fire();

        if !token.sleep(interval) {
            return;
        }
    }
}

/// Fade to a random target, rest for a random delay, repeat.
fn run_faded_walk(
    voice: Weak<Mutex<Voice>>,
    token: Arc<CancelToken>,
    settings: PanWalkSettings,
    timing: FadeTiming,
) {
    let mut rng = rand::thread_rng();
    let poll = Duration::from_millis(settings.tick_ms);
    loop {
        let target = pick_target(&mut rng, settings.limit);
        let (done_tx, done_rx) = mpsc::channel();
        {
            let Some(handle) = voice.upgrade() else {
                return;
            };
            let mut notes = Notifications::default();
            {
                let mut voice = lock(&handle);
                if token.is_cancelled() {
                    return;
                }
                let start = voice.pan.clamp(-settings.limit, settings.limit);
                voice.pan_walk_target = Some(target);
                debug!("{}: pan walk to {:.2}", voice.identity, target);
                let on_complete: Completion = Box::new(move || {
                    let _ = done_tx.send(());
                });
                start_transition(
                    &handle,
                    &mut voice,
                    Parameter::Pan,
                    start,
                    target,
                    timing,
                    Some(on_complete),
                    &mut notes,
                );
            }
            notes.fire();
        }

        // A superseded fade drops its sender; the walk then rests as usual.
        loop {
            match done_rx.recv_timeout(poll) {
                Ok(()) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    clear_walk_target(&voice, &token, target);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_cancelled() {
                        return;
                    }
                }
            }
        }

        let delay = rng.gen_range(settings.min_delay_ms..=settings.max_delay_ms);
        if !token.sleep(Duration::from_millis(delay)) {
            return;
        }
    }
}

/// Forget a target whose fade was replaced before it arrived.
fn clear_walk_target(voice: &Weak<Mutex<Voice>>, token: &CancelToken, target: f32) {
    let Some(handle) = voice.upgrade() else {
        return;
    };
    let mut voice = lock(&handle);
    if !token.is_cancelled() && voice.pan_walk_target == Some(target) {
        voice.pan_walk_target = None;
    }
}

/// Nudge the pan toward a random target on every tick.
fn run_stepped_walk(voice: Weak<Mutex<Voice>>, token: Arc<CancelToken>, settings: PanWalkSettings) {
    let mut rng = rand::thread_rng();
    let tick = Duration::from_millis(settings.tick_ms);
    loop {
        if !token.sleep(tick) {
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
            match voice.pan_walk_target {
                Some(target) if !reached(voice.pan, target, settings.tolerance) => {
                    let pan = step_toward(
                        voice.pan,
                        target,
                        settings.step_fraction,
                        settings.max_step,
                        settings.limit,
                    );
                    voice.set_parameter(Parameter::Pan, pan);
                    voice.apply_logical();
                    notes.push(&voice, Parameter::Pan, pan);
                }
                _ => {
                    let target = pick_target(&mut rng, settings.limit);
                    voice.pan_walk_target = Some(target);
                    debug!("{}: pan walk to {:.2}", voice.identity, target);
                }
            }
        }
        drop(handle);
        notes.fire();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::super::test_support::*;
    use super::*;
    use crate::mixer::PlaybackState;

    fn walk_mixer(mode: PanWalkMode) -> (Mixer, crate::output::MemoryProbe) {
        let mut config = fast_config();
        config.pan_walk.mode = mode;
        let (mixer, probe) = Mixer::headless(config);
        mixer.load_buffer("wind", tone()).unwrap();
        (mixer, probe)
    }

    /// Record whether any observed pan left `[-limit, limit]`.
    fn watch_pan(mixer: &Mixer, identity: &str, limit: f32) -> (Arc<AtomicBool>, Arc<Mutex<usize>>) {
        let escaped = Arc::new(AtomicBool::new(false));
        let count = Arc::new(Mutex::new(0usize));
        let flag = escaped.clone();
        let seen = count.clone();
        mixer
            .on_pan_change(identity, move |pan| {
                if pan.abs() > limit + 1e-6 {
                    flag.store(true, Ordering::SeqCst);
                }
                *seen.lock().unwrap() += 1;
            })
            .unwrap();
        (escaped, count)
    }

    #[test]
    fn breathing_swings_then_restores_exactly() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.set_volume("rain", 0.6).unwrap();
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        assert!(mixer.snapshot("rain").unwrap().has_effect(Effect::Breathing));

        wait_until(|| probe.channels()[0].gain_writes > 10);
        let (left, right) = mixer.snapshot("rain").unwrap().applied_gains.unwrap();
        assert!(left >= 0.6 * 0.8 - 1e-6 && left <= 0.6 * 1.2 + 1e-6);
        assert_eq!(left, right);

        mixer.stop_breathing("rain").unwrap();
        let writes = probe.channels()[0].gain_writes;
        thread::sleep(Duration::from_millis(20));

        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.volume, 0.6);
        assert_eq!(snapshot.applied_gains, Some((0.6, 0.6)));
        assert!(!snapshot.has_effect(Effect::Breathing));
        assert_eq!(probe.channels()[0].gain_writes, writes);
    }

    #[test]
    fn breathing_keeps_its_base_after_volume_change() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.set_volume("rain", 0.5).unwrap();
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        mixer.set_volume("rain", 0.1).unwrap();

        let start = probe.channels()[0].gain_writes;
        wait_until(|| probe.channels()[0].gain_writes > start + 3);
        let (left, _) = mixer.snapshot("rain").unwrap().applied_gains.unwrap();
        assert!(left >= 0.5 * 0.8 - 1e-6);
        assert_eq!(mixer.snapshot("rain").unwrap().volume, 0.1);

        mixer.stop_breathing("rain").unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().applied_gains, Some((0.1, 0.1)));
    }

    #[test]
    fn stopping_breathing_notifies_restored_volume() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mixer
            .on_volume_change("rain", move |v| sink.lock().unwrap().push(v))
            .unwrap();
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        wait_until(|| seen.lock().unwrap().len() > 3);

        let before = seen.lock().unwrap().len();
        mixer.stop_breathing("rain").unwrap();
        thread::sleep(Duration::from_millis(20));
        let seen = seen.lock().unwrap();
        assert!(seen[before..].contains(&0.5));
        assert!(seen.len() <= before + 3);
    }

    #[test]
    fn effects_require_a_playing_voice() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        assert!(matches!(
            mixer.start_breathing("rain"),
            Err(MixerError::InvalidState(_))
        ));
        assert!(matches!(
            mixer.start_pan_walk("rain"),
            Err(MixerError::InvalidState(_))
        ));

        mixer.play("rain").unwrap();
        mixer.pause("rain").unwrap();
        assert!(matches!(
            mixer.start_breathing("rain"),
            Err(MixerError::InvalidState(_))
        ));
    }

    #[test]
    fn starting_twice_is_a_no_op() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        mixer.start_pan_walk("rain").unwrap();
        mixer.start_pan_walk("rain").unwrap();
        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.effects, vec![Effect::Breathing, Effect::PanWalk]);
    }

    #[test]
    fn stopping_inactive_effects_is_invalid() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        assert!(matches!(
            mixer.stop_breathing("rain"),
            Err(MixerError::InvalidState(_))
        ));
        assert!(matches!(
            mixer.stop_pan_walk("rain"),
            Err(MixerError::InvalidState(_))
        ));
        assert!(matches!(
            mixer.stop_breathing("thunder"),
            Err(MixerError::NotFound(_))
        ));
    }

    #[test]
    fn faded_walk_stays_in_bounds_and_recenters() {
        let (mixer, _probe) = walk_mixer(PanWalkMode::Faded);
        let (escaped, count) = watch_pan(&mixer, "wind", 0.8);
        mixer.play("wind").unwrap();
        mixer.start_pan_walk("wind").unwrap();

        wait_until(|| *count.lock().unwrap() > 100);
        let snapshot = mixer.snapshot("wind").unwrap();
        assert!(snapshot.has_effect(Effect::PanWalk));
        assert!(snapshot.pan_walk_target.is_some());
        assert!(!escaped.load(Ordering::SeqCst));

        mixer.stop_pan_walk("wind").unwrap();
        thread::sleep(Duration::from_millis(30));
        let snapshot = mixer.snapshot("wind").unwrap();
        assert_eq!(snapshot.pan, 0.0);
        assert_eq!(snapshot.applied_gains, Some((0.5, 0.5)));
        assert_eq!(snapshot.pan_walk_target, None);
    }

    #[test]
    fn faded_walk_pulls_extreme_pan_inside_limit() {
        let (mixer, _probe) = walk_mixer(PanWalkMode::Faded);
        mixer.play("wind").unwrap();
        mixer.set_pan("wind", 1.0).unwrap();
        wait_for_fade(&mixer, "wind", Parameter::Pan);

        let (escaped, count) = watch_pan(&mixer, "wind", 0.8);
        mixer.start_pan_walk("wind").unwrap();
        wait_until(|| *count.lock().unwrap() > 40);
        assert!(!escaped.load(Ordering::SeqCst));
        mixer.stop_pan_walk("wind").unwrap();
    }

    #[test]
    fn stepped_walk_stays_in_bounds_and_recenters() {
        let (mixer, _probe) = walk_mixer(PanWalkMode::Stepped);
        let (escaped, count) = watch_pan(&mixer, "wind", 0.8);
        mixer.play("wind").unwrap();
        mixer.start_pan_walk("wind").unwrap();

        wait_until(|| *count.lock().unwrap() > 100);
        assert!(!escaped.load(Ordering::SeqCst));

        mixer.stop_pan_walk("wind").unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(mixer.snapshot("wind").unwrap().pan, 0.0);
    }

    #[test]
    fn user_pan_during_walk_is_superseded_safely() {
        let (mixer, _probe) = walk_mixer(PanWalkMode::Faded);
        let (escaped, count) = watch_pan(&mixer, "wind", 1.0);
        mixer.play("wind").unwrap();
        mixer.start_pan_walk("wind").unwrap();
        mixer.set_pan("wind", -1.0).unwrap();

        let seen = *count.lock().unwrap();
        wait_until(|| *count.lock().unwrap() > seen + 60);
        assert!(!escaped.load(Ordering::SeqCst));
        assert!(mixer.snapshot("wind").unwrap().has_effect(Effect::PanWalk));
        mixer.stop_pan_walk("wind").unwrap();
    }

    #[test]
    fn replaced_walk_fade_forgets_its_target() {
        let mut config = fast_config();
        config.fade_interval_ms = 20;
        config.pan_walk.min_delay_ms = 10_000;
        config.pan_walk.max_delay_ms = 10_000;
        let (mixer, _probe) = Mixer::headless(config);
        mixer.load_buffer("wind", tone()).unwrap();
        mixer.play("wind").unwrap();
        mixer.start_pan_walk("wind").unwrap();
        wait_until(|| mixer.snapshot("wind").unwrap().pan_walk_target.is_some());

        mixer.set_pan("wind", 0.0).unwrap();
        wait_until(|| mixer.snapshot("wind").unwrap().pan_walk_target.is_none());
        assert!(mixer.snapshot("wind").unwrap().has_effect(Effect::PanWalk));
        mixer.stop_pan_walk("wind").unwrap();
    }

    #[test]
    fn slow_observer_ends_on_the_restored_volume() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.set_volume("rain", 0.6).unwrap();

        let first = Arc::new(AtomicBool::new(true));
        let entered = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let (first, entered, seen) = (first.clone(), entered.clone(), seen.clone());
            mixer
                .on_volume_change("rain", move |volume| {
                    if first.swap(false, Ordering::SeqCst) {
                        entered.store(true, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                    }
                    seen.lock().unwrap().push(volume);
                })
                .unwrap();
        }
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        wait_until(|| entered.load(Ordering::SeqCst));

        mixer.stop_breathing("rain").unwrap();
        thread::sleep(Duration::from_millis(250));

        assert_eq!(seen.lock().unwrap().last(), Some(&0.6));
        assert_eq!(mixer.snapshot("rain").unwrap().applied_gains, Some((0.6, 0.6)));
    }

    #[test]
    fn effects_tick_while_paused() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        mixer.pause("rain").unwrap();
        let writes = probe.channels()[0].gain_writes;
        wait_until(|| probe.channels()[0].gain_writes > writes + 3);
        assert_eq!(mixer.snapshot("rain").unwrap().state, PlaybackState::Paused);
    }

    #[test]
    fn stop_cancels_every_effect() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.start_breathing("rain").unwrap();
        mixer.start_pan_walk("rain").unwrap();
        mixer.stop("rain").unwrap();

        let snapshot = mixer.snapshot("rain").unwrap();
        assert!(snapshot.effects.is_empty());
        assert_eq!(probe.claimed_count(), 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(mixer.snapshot("rain").unwrap().applied_gains, None);
    }
}
