//! Transport, level and lifecycle operations for `Mixer`.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::audio::SoundBuffer;
use crate::error::MixerError;
use crate::tools::sync::lock;

use super::transition::start_transition;
use super::voice::{Notifications, Parameter, PlaybackState, Voice};
use super::{count_playing, Mixer, VoiceHandle};

impl Mixer {
    /// Decode `source` and register it as `name` without playing it.
    ///
    /// # Errors
    ///
    /// [`MixerError::SourceUnavailable`] when the file cannot be opened or
    /// decoded, [`MixerError::InvalidState`] when `name` is already registered.
    pub fn load(&self, name: &str, source: impl AsRef<Path>) -> Result<(), MixerError> {
        if self.contains(name) {
            return Err(MixerError::InvalidState(format!("{} is already loaded", name)));
        }
        let buffer = self.loader.load(source.as_ref())?;
        self.load_buffer(name, buffer)
    }

    /// Register an already decoded buffer as `name`.
    pub fn load_buffer(&self, name: &str, buffer: SoundBuffer) -> Result<(), MixerError> {
        let mut voices = lock(&self.voices);
        if voices.contains_key(name) {
            return Err(MixerError::InvalidState(format!("{} is already loaded", name)));
        }
        let voice = Voice::new(name.to_string(), buffer, self.config.default_volume);
        voices.insert(name.to_string(), Arc::new(std::sync::Mutex::new(voice)));
        info!("loaded sound: {}", name);
        Ok(())
    }

    /// Play the file at `path`, registering it under its path on first use.
    pub fn play_path(&self, path: impl AsRef<Path>) -> Result<(), MixerError> {
        let path = path.as_ref();
        let identity = path.to_string_lossy().into_owned();
        if !self.contains(&identity) {
            self.load(&identity, path)?;
        }
        self.play(&identity)
    }

    /// Start a stopped voice at its last-known volume and pan.
    ///
    /// A paused voice is resumed instead.
    ///
    /// # Errors
    ///
    /// [`MixerError::ResourceExhausted`] when the voice budget is used up or
    /// no output channel is free; [`MixerError::InvalidState`] when the voice
    /// is already playing.
    pub fn play(&self, identity: &str) -> Result<(), MixerError> {
        let voices = lock(&self.voices);
        let handle = voices
            .get(identity)
            .cloned()
            .ok_or_else(|| MixerError::NotFound(identity.to_string()))?;

        let state = lock(&handle).state;
        match state {
            PlaybackState::Playing => {
                return Err(MixerError::InvalidState(format!(
                    "{} is already playing",
                    identity
                )))
            }
            PlaybackState::Paused => {
                drop(voices);
                return self.resume(identity);
            }
            PlaybackState::Stopped => {}
        }

        let playing = count_playing(&voices);
        if !self.allocator.can_start(playing) {
            warn!("voice budget reached, not starting {}", identity);
            return Err(MixerError::ResourceExhausted(format!(
                "voice budget of {} reached",
                self.allocator.voice_budget()
            )));
        }

        let channel = lock(&self.provider).find_free_channel().ok_or_else(|| {
            warn!("no free output channel for {}", identity);
            MixerError::ResourceExhausted("no free output channel".to_string())
        })?;

        {
            let mut voice = lock(&handle);
            voice.channel = Some(channel);
            voice.state = PlaybackState::Playing;
            voice.apply_logical();
            let buffer = voice.buffer.clone();
            if let Some(channel) = voice.channel.as_mut() {
                channel.play(&buffer, true);
            }
            info!(
                "playing {} (vol={:.2}, pan={:.2})",
                identity, voice.volume, voice.pan
            );
        }
        drop(voices);

        self.rebalance_if_enabled();
        Ok(())
    }

    /// Pause a playing voice. Its channel and effects stay alive.
    pub fn pause(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        {
            let mut voice = lock(&handle);
            if !voice.is_playing() {
                return Err(MixerError::InvalidState(format!(
                    "{} is not playing",
                    identity
                )));
            }
            if let Some(channel) = voice.channel.as_mut() {
                channel.pause();
            }
            voice.state = PlaybackState::Paused;
        }
        info!("paused {}", identity);
        self.rebalance_if_enabled();
        Ok(())
    }

    /// Resume a paused voice, subject to the voice budget.
    pub fn resume(&self, identity: &str) -> Result<(), MixerError> {
        let voices = lock(&self.voices);
        let handle = voices
            .get(identity)
            .cloned()
            .ok_or_else(|| MixerError::NotFound(identity.to_string()))?;

        if lock(&handle).state != PlaybackState::Paused {
            return Err(MixerError::InvalidState(format!(
                "{} is not paused",
                identity
            )));
        }
        if !self.allocator.can_start(count_playing(&voices)) {
            warn!("voice budget reached, not resuming {}", identity);
            return Err(MixerError::ResourceExhausted(format!(
                "voice budget of {} reached",
                self.allocator.voice_budget()
            )));
        }

        {
            let mut voice = lock(&handle);
            if let Some(channel) = voice.channel.as_mut() {
                channel.resume();
            }
            voice.state = PlaybackState::Playing;
        }
        drop(voices);
        info!("resumed {}", identity);
        self.rebalance_if_enabled();
        Ok(())
    }

    /// Stop a voice: cancel its fades and effects and release its channel.
    ///
    /// The voice stays registered with its last volume and pan. Stopping a
    /// stopped voice succeeds.
    pub fn stop(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let was_sounding = stop_voice(&mut lock(&handle));
        if was_sounding {
            info!("stopped {}", identity);
            self.rebalance_if_enabled();
        }
        Ok(())
    }

    /// Stop a voice and drop it from the registry.
    pub fn remove(&self, identity: &str) -> Result<(), MixerError> {
        let handle = lock(&self.voices)
            .remove(identity)
            .ok_or_else(|| MixerError::NotFound(identity.to_string()))?;
        let was_sounding = stop_voice(&mut lock(&handle));
        info!("removed {}", identity);
        if was_sounding {
            self.rebalance_if_enabled();
        }
        Ok(())
    }

    /// Set the logical volume instantly and apply it.
    ///
    /// A volume fade in flight is cancelled. A running breathing effect keeps
    /// swelling around the volume it captured when it started.
    pub fn set_volume(&self, identity: &str, volume: f32) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            voice.volume_fade = None;
            voice.set_parameter(Parameter::Volume, volume);
            voice.apply_logical();
            let volume = voice.volume;
            notes.push(&voice, Parameter::Volume, volume);
        }
        notes.fire();
        self.rebalance_if_enabled();
        Ok(())
    }

    /// Glide the pan from its current value to `pan` over one fade.
    ///
    /// Pan changes are always faded; there is no instant variant.
    pub fn set_pan(&self, identity: &str, pan: f32) -> Result<(), MixerError> {
        self.fade_parameter(identity, Parameter::Pan, pan)
    }

    /// Glide the logical volume from its current value to `volume`.
    pub fn fade_volume(&self, identity: &str, volume: f32) -> Result<(), MixerError> {
        self.fade_parameter(identity, Parameter::Volume, volume)
    }

    fn fade_parameter(
        &self,
        identity: &str,
        parameter: Parameter,
        target: f32,
    ) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut notes = Notifications::default();
        {
            let mut voice = lock(&handle);
            let start = voice.parameter(parameter);
            start_transition(
                &handle,
                &mut voice,
                parameter,
                start,
                target,
                self.fade_timing(),
                None,
                &mut notes,
            );
        }
        notes.fire();
        Ok(())
    }

    /// Enable or disable auto-balance.
    ///
    /// Enabling applies `min(1, 1 / playing)` to every playing voice without
    /// touching their logical volumes; disabling reapplies those volumes.
    pub fn toggle_auto_balance(&self, enabled: bool) {
        self.auto_balance.store(enabled, Ordering::SeqCst);
        info!("auto-balance {}", if enabled { "on" } else { "off" });
        if enabled {
            self.rebalance();
        } else {
            let handles: Vec<VoiceHandle> = lock(&self.voices).values().cloned().collect();
            for handle in handles {
                let mut voice = lock(&handle);
                voice.balance = None;
                voice.apply_logical();
            }
        }
    }

    /// Register a callback for every applied volume change of a voice.
    pub fn on_volume_change<F>(&self, identity: &str, observer: F) -> Result<(), MixerError>
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        let handle = self.voice_handle(identity)?;
        lock(&handle).on_volume = Some(Arc::new(observer));
        Ok(())
    }

    /// Register a callback for every applied pan change of a voice.
    pub fn on_pan_change<F>(&self, identity: &str, observer: F) -> Result<(), MixerError>
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        let handle = self.voice_handle(identity)?;
        lock(&handle).on_pan = Some(Arc::new(observer));
        Ok(())
    }

    /// Drop both observers of a voice.
    pub fn clear_observers(&self, identity: &str) -> Result<(), MixerError> {
        let handle = self.voice_handle(identity)?;
        let mut voice = lock(&handle);
        voice.on_volume = None;
        voice.on_pan = None;
        Ok(())
    }

    /// Stop and forget every voice. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let drained: Vec<VoiceHandle> = lock(&self.voices).drain().map(|(_, h)| h).collect();
        let count = drained.len();
        for handle in drained {
            stop_voice(&mut lock(&handle));
        }
        self.auto_balance.store(false, Ordering::SeqCst);
        if count > 0 {
            info!("mixer cleaned up ({} voices)", count);
        }
    }

    fn rebalance_if_enabled(&self) {
        if self.auto_balance_enabled() {
            self.rebalance();
        }
    }

    /// Apply the balanced gain to a stable snapshot of playing voices.
    fn rebalance(&self) {
        let playing = self.playing_handles();
        if playing.is_empty() {
            return;
        }
        let balanced = (1.0 / playing.len() as f32).min(1.0);
        debug!("auto-balance: {} voices at {:.2}", playing.len(), balanced);
        for handle in playing {
            let mut voice = lock(&handle);
            if voice.is_playing() {
                voice.balance = Some(balanced);
                voice.apply_logical();
            }
        }
    }

    fn playing_handles(&self) -> Vec<VoiceHandle> {
        let voices = lock(&self.voices);
        voices
            .values()
            .filter(|handle| lock(handle).is_playing())
            .cloned()
            .collect()
    }
}

/// Cancel every activity of `voice` and release its channel.
///
/// Returns true if the voice was playing or paused.
fn stop_voice(voice: &mut Voice) -> bool {
    voice.cancel_activities();
    if let Some(mut channel) = voice.channel.take() {
        channel.stop();
    }
    voice.applied = None;
    voice.balance = None;
    let was_sounding = voice.state != PlaybackState::Stopped;
    voice.state = PlaybackState::Stopped;
    was_sounding
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use super::super::test_support::*;
    use super::*;
    use crate::dsp::pan::stereo_gains;

    #[test]
    fn load_rejects_duplicates_and_bad_sources() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        assert!(matches!(
            mixer.load_buffer("rain", tone()),
            Err(MixerError::InvalidState(_))
        ));
        assert!(matches!(
            mixer.load("wind", "/missing/wind.wav"),
            Err(MixerError::SourceUnavailable(_))
        ));
        assert!(!mixer.contains("wind"));
    }

    #[test]
    fn play_applies_last_known_levels_immediately() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.set_volume("rain", 0.8).unwrap();
        mixer.play("rain").unwrap();

        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.applied_gains, Some((0.8, 0.8)));
        let channel = &probe.channels()[0];
        assert!(channel.playing && channel.looped);
        assert_eq!(channel.gains, Some((0.8, 0.8)));
    }

    #[test]
    fn playing_twice_is_invalid() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        assert!(matches!(mixer.play("rain"), Err(MixerError::InvalidState(_))));
    }

    #[test]
    fn fourth_voice_exceeds_budget_until_one_stops() {
        let (mixer, _probe) = mixer_with(&["a", "b", "c", "d"]);
        for name in ["a", "b", "c"] {
            mixer.play(name).unwrap();
        }
        assert!(matches!(
            mixer.play("d"),
            Err(MixerError::ResourceExhausted(_))
        ));
        for name in ["a", "b", "c"] {
            assert_eq!(mixer.snapshot(name).unwrap().state, PlaybackState::Playing);
        }

        mixer.stop("b").unwrap();
        mixer.play("d").unwrap();
        assert_eq!(mixer.playing_count(), 3);
    }

    #[test]
    fn concurrent_plays_respect_budget() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let mixer = Arc::new(mixer_with(&names).0);
        let workers: Vec<_> = names
            .iter()
            .map(|&name| {
                let mixer = mixer.clone();
                thread::spawn(move || mixer.play(name))
            })
            .collect();
        let results: Vec<_> = workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 3);
        assert!(results.iter().all(|result| matches!(
            result,
            Ok(()) | Err(MixerError::ResourceExhausted(_))
        )));
        assert_eq!(mixer.playing_count(), 3);
    }

    #[test]
    fn channel_shortage_is_resource_exhausted() {
        let mut config = fast_config();
        config.voice_budget = 3;
        config.channel_count = 3;
        let pool = crate::output::MemoryChannelPool::new(1);
        let mixer = Mixer::new(config, Box::new(pool));
        mixer.load_buffer("a", tone()).unwrap();
        mixer.load_buffer("b", tone()).unwrap();
        mixer.play("a").unwrap();
        assert!(matches!(
            mixer.play("b"),
            Err(MixerError::ResourceExhausted(_))
        ));
        assert_eq!(mixer.snapshot("b").unwrap().state, PlaybackState::Stopped);
    }

    #[test]
    fn pause_keeps_channel_and_resume_restarts_it() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.pause("rain").unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().state, PlaybackState::Paused);
        assert!(probe.channels()[0].paused);
        assert_eq!(probe.claimed_count(), 1);

        mixer.resume("rain").unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().state, PlaybackState::Playing);
        assert!(!probe.channels()[0].paused);
        assert!(matches!(mixer.resume("rain"), Err(MixerError::InvalidState(_))));
    }

    #[test]
    fn play_on_paused_voice_resumes() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.pause("rain").unwrap();
        mixer.play("rain").unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().state, PlaybackState::Playing);
        assert_eq!(probe.channels()[0].plays, 1);
    }

    #[test]
    fn resume_respects_budget() {
        let mut config = fast_config();
        config.voice_budget = 1;
        let (mixer, _probe) = Mixer::headless(config);
        mixer.load_buffer("a", tone()).unwrap();
        mixer.load_buffer("b", tone()).unwrap();
        mixer.play("a").unwrap();
        mixer.pause("a").unwrap();
        mixer.play("b").unwrap();
        assert!(matches!(
            mixer.resume("a"),
            Err(MixerError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn stop_is_idempotent_and_releases_channel() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.stop("rain").unwrap();
        mixer.stop("rain").unwrap();

        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.state, PlaybackState::Stopped);
        assert_eq!(snapshot.applied_gains, None);
        assert_eq!(probe.claimed_count(), 0);
        assert!(matches!(mixer.stop("wind"), Err(MixerError::NotFound(_))));
    }

    #[test]
    fn stopped_voice_keeps_levels_for_replay() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.set_volume("rain", 0.3).unwrap();
        mixer.set_pan("rain", 1.0).unwrap();
        wait_for_fade(&mixer, "rain", Parameter::Pan);
        mixer.stop("rain").unwrap();

        mixer.play("rain").unwrap();
        let expected = stereo_gains(0.3, 1.0);
        assert_eq!(mixer.snapshot("rain").unwrap().applied_gains, Some(expected));
        assert_eq!(probe.claimed_count(), 1);
    }

    #[test]
    fn set_volume_is_instant_and_clamped() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.set_volume("rain", 1.7).unwrap();
        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.volume, 1.0);
        assert_eq!(snapshot.applied_gains, Some((1.0, 1.0)));
    }

    #[test]
    fn set_pan_is_faded_not_instant() {
        let mut config = fast_config();
        config.fade_interval_ms = 50;
        let (mixer, _probe) = Mixer::headless(config);
        mixer.load_buffer("rain", tone()).unwrap();
        mixer.play("rain").unwrap();
        mixer.set_pan("rain", 1.0).unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().pan, 0.0);
        mixer.stop("rain").unwrap();
    }

    #[test]
    fn repeated_identical_fade_lands_once() {
        let (mixer, probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.set_pan("rain", 0.5).unwrap();
        mixer.set_pan("rain", 0.5).unwrap();
        wait_for_fade(&mixer, "rain", Parameter::Pan);
        thread::sleep(Duration::from_millis(40));

        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.pan, 0.5);
        assert_eq!(snapshot.applied_gains, Some(stereo_gains(0.5, 0.5)));
        assert_eq!(probe.channels()[0].gains, Some(stereo_gains(0.5, 0.5)));
    }

    #[test]
    fn superseded_pan_fade_never_wins() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.set_pan("rain", 1.0).unwrap();
        mixer.set_pan("rain", -0.4).unwrap();
        wait_for_fade(&mixer, "rain", Parameter::Pan);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(mixer.snapshot("rain").unwrap().pan, -0.4);
    }

    #[test]
    fn fade_volume_reaches_target() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        mixer.play("rain").unwrap();
        mixer.fade_volume("rain", 0.9).unwrap();
        wait_for_fade(&mixer, "rain", Parameter::Volume);
        let snapshot = mixer.snapshot("rain").unwrap();
        assert_eq!(snapshot.volume, 0.9);
        assert_eq!(snapshot.applied_gains, Some((0.9, 0.9)));
    }

    #[test]
    fn two_voice_scenario() {
        let (mixer, probe) = mixer_with(&["a", "b"]);
        mixer.play("a").unwrap();
        mixer.play("b").unwrap();
        mixer.set_volume("a", 0.8).unwrap();
        mixer.set_pan("b", -0.5).unwrap();
        wait_for_fade(&mixer, "b", Parameter::Pan);

        let b = mixer.snapshot("b").unwrap();
        let expected = stereo_gains(b.volume, -0.5);
        assert_eq!(b.applied_gains, Some(expected));
        assert_eq!(probe.channels()[1].gains, Some(expected));
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((0.8, 0.8)));
    }

    #[test]
    fn auto_balance_scales_and_restores() {
        let (mixer, _probe) = mixer_with(&["a", "b"]);
        mixer.set_volume("a", 0.9).unwrap();
        mixer.set_volume("b", 0.3).unwrap();
        mixer.play("a").unwrap();
        mixer.play("b").unwrap();

        mixer.toggle_auto_balance(true);
        assert!(mixer.auto_balance_enabled());
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((0.5, 0.5)));
        assert_eq!(mixer.snapshot("b").unwrap().applied_gains, Some((0.5, 0.5)));
        assert_eq!(mixer.snapshot("a").unwrap().volume, 0.9);

        mixer.toggle_auto_balance(false);
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((0.9, 0.9)));
        assert_eq!(mixer.snapshot("b").unwrap().applied_gains, Some((0.3, 0.3)));
    }

    #[test]
    fn auto_balance_follows_playing_count() {
        let (mixer, _probe) = mixer_with(&["a", "b"]);
        mixer.play("a").unwrap();
        mixer.toggle_auto_balance(true);
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((1.0, 1.0)));

        mixer.play("b").unwrap();
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((0.5, 0.5)));

        mixer.set_volume("b", 0.2).unwrap();
        assert_eq!(mixer.snapshot("b").unwrap().applied_gains, Some((0.5, 0.5)));
        assert_eq!(mixer.snapshot("b").unwrap().volume, 0.2);

        mixer.stop("b").unwrap();
        assert_eq!(mixer.snapshot("a").unwrap().applied_gains, Some((1.0, 1.0)));
    }

    #[test]
    fn pan_fade_keeps_balanced_gain() {
        let (mixer, _probe) = mixer_with(&["a", "b"]);
        mixer.set_volume("a", 0.9).unwrap();
        mixer.play("a").unwrap();
        mixer.play("b").unwrap();
        mixer.toggle_auto_balance(true);
        mixer.set_pan("a", 1.0).unwrap();
        wait_for_fade(&mixer, "a", Parameter::Pan);
        assert_eq!(
            mixer.snapshot("a").unwrap().applied_gains,
            Some(stereo_gains(0.5, 1.0))
        );
    }

    #[test]
    fn observers_see_user_and_fade_changes() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        let volumes = Arc::new(Mutex::new(Vec::new()));
        let pans = Arc::new(Mutex::new(Vec::new()));
        let volume_log = volumes.clone();
        let pan_log = pans.clone();
        mixer
            .on_volume_change("rain", move |v| volume_log.lock().unwrap().push(v))
            .unwrap();
        mixer
            .on_pan_change("rain", move |p| pan_log.lock().unwrap().push(p))
            .unwrap();

        mixer.play("rain").unwrap();
        mixer.set_volume("rain", 0.7).unwrap();
        mixer.set_pan("rain", 0.3).unwrap();
        wait_until(|| pans.lock().unwrap().last() == Some(&0.3));

        assert_eq!(*volumes.lock().unwrap(), vec![0.7]);
        let pans = pans.lock().unwrap();
        assert!(pans.len() <= 31);
        assert!(pans.windows(2).all(|pair| pair[0] < pair[1]));

        mixer.clear_observers("rain").unwrap();
        mixer.set_volume("rain", 0.1).unwrap();
        assert_eq!(volumes.lock().unwrap().len(), 1);
    }

    #[test]
    fn observer_may_call_back_into_the_mixer() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        let mixer = Arc::new(mixer);
        let weak = Arc::downgrade(&mixer);
        mixer
            .on_volume_change("rain", move |_| {
                if let Some(mixer) = weak.upgrade() {
                    let _ = mixer.snapshot("rain");
                }
            })
            .unwrap();
        mixer.set_volume("rain", 0.4).unwrap();
        assert_eq!(mixer.snapshot("rain").unwrap().volume, 0.4);
    }

    #[test]
    fn observer_may_change_its_own_voice() {
        let (mixer, _probe) = mixer_with(&["rain"]);
        let mixer = Arc::new(mixer);
        let weak = Arc::downgrade(&mixer);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        mixer
            .on_volume_change("rain", move |volume| {
                sink.lock().unwrap().push(volume);
                if volume < 0.5 {
                    if let Some(mixer) = weak.upgrade() {
                        mixer.set_volume("rain", 0.5).unwrap();
                    }
                }
            })
            .unwrap();

        mixer.set_volume("rain", 0.4).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.4, 0.5]);
        assert_eq!(mixer.snapshot("rain").unwrap().volume, 0.5);
    }

    #[test]
    fn remove_cancels_in_flight_fade() {
        let mut config = fast_config();
        config.fade_interval_ms = 5;
        let (mixer, probe) = Mixer::headless(config);
        mixer.load_buffer("rain", tone()).unwrap();
        mixer.play("rain").unwrap();
        mixer.set_pan("rain", 1.0).unwrap();
        mixer.remove("rain").unwrap();

        let writes = probe.channels()[0].gain_writes;
        thread::sleep(Duration::from_millis(60));
        assert_eq!(probe.channels()[0].gain_writes, writes);
        assert!(!mixer.contains("rain"));
        assert!(matches!(mixer.remove("rain"), Err(MixerError::NotFound(_))));
    }

    #[test]
    fn cleanup_is_repeatable() {
        let (mixer, probe) = mixer_with(&["a", "b"]);
        mixer.play("a").unwrap();
        mixer.play("b").unwrap();
        mixer.toggle_auto_balance(true);
        mixer.cleanup();
        mixer.cleanup();

        assert!(mixer.voice_ids().is_empty());
        assert_eq!(probe.claimed_count(), 0);
        assert!(!mixer.auto_balance_enabled());
    }

    #[test]
    fn play_path_registers_by_path() {
        let (mixer, _probe) = mixer_with(&[]);
        assert!(matches!(
            mixer.play_path("/missing/rain.wav"),
            Err(MixerError::SourceUnavailable(_))
        ));
        assert!(mixer.voice_ids().is_empty());
    }
}
