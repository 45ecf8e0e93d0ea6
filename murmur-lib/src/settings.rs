//! Persisted per-sound levels and mixer flags (`settings.json`).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stored state of one sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSettings {
    pub volume: f32,
    pub pan: f32,
    pub playing: bool,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            volume: 0.5,
            pan: 0.0,
            playing: false,
        }
    }
}

/// Whole settings file. Keys other than `sounds` and `auto_balance` are kept
/// as-is so files shared with other front-ends survive a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixerSettings {
    #[serde(default)]
    pub sounds: BTreeMap<String, SoundSettings>,
    #[serde(default)]
    pub auto_balance: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "settings io error: {}", err),
            Self::Parse(err) => write!(f, "settings parse error: {}", err),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl MixerSettings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let settings: Self = serde_json::from_str(&text)?;
        info!(
            "loaded settings for {} sounds from {}",
            settings.sounds.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!("saved settings to {}", path.display());
        Ok(())
    }
}
