//! Capture and restore of [`MixerSettings`].

use log::{info, warn};

use crate::error::MixerError;
use crate::settings::{MixerSettings, SoundSettings};
use crate::tools::sync::lock;

use super::voice::{Notifications, Parameter, PlaybackState};
use super::Mixer;

impl Mixer {
    /// Current logical levels and playing flags of every registered voice.
    pub fn capture_settings(&self) -> MixerSettings {
        let sounds = self
            .snapshots()
            .into_iter()
            .map(|snapshot| {
                let settings = SoundSettings {
                    volume: snapshot.volume,
                    pan: snapshot.pan,
                    playing: snapshot.state == PlaybackState::Playing,
                };
                (snapshot.identity, settings)
            })
            .collect();
        MixerSettings {
            sounds,
            auto_balance: self.auto_balance_enabled(),
            ..MixerSettings::default()
        }
    }

    /// Apply stored levels instantly, restore auto-balance, then replay the
    /// voices that were playing while the budget allows.
    ///
    /// Identities that are not registered are skipped. Voices that fail to
    /// start are returned with their error instead of aborting the restore.
    pub fn restore_settings(&self, settings: &MixerSettings) -> Vec<(String, MixerError)> {
        for (identity, sound) in &settings.sounds {
            let Ok(handle) = self.voice_handle(identity) else {
                continue;
            };
            let mut notes = Notifications::default();
            {
                let mut voice = lock(&handle);
                voice.volume_fade = None;
                voice.pan_fade = None;
                voice.set_parameter(Parameter::Volume, sound.volume);
                voice.set_parameter(Parameter::Pan, sound.pan);
                voice.apply_logical();
                let (volume, pan) = (voice.volume, voice.pan);
                notes.push(&voice, Parameter::Volume, volume);
                notes.push(&voice, Parameter::Pan, pan);
            }
            notes.fire();
        }

        if settings.auto_balance != self.auto_balance_enabled() {
            self.toggle_auto_balance(settings.auto_balance);
        }

        let mut failures = Vec::new();
        for (identity, sound) in &settings.sounds {
            if !sound.playing || !self.contains(identity) {
                continue;
            }
            let already = self
                .snapshot(identity)
                .map(|snapshot| snapshot.state == PlaybackState::Playing)
                .unwrap_or(false);
            if already {
                continue;
            }
            if let Err(err) = self.play(identity) {
                warn!("could not restore {}: {}", identity, err);
                failures.push((identity.clone(), err));
            }
        }
        info!(
            "restored settings for {} sounds ({} failed to start)",
            settings.sounds.len(),
            failures.len()
        );
        failures
    }
}
