use std::fmt::{Display, Formatter};

use murmur_lib::{MixerError, SettingsError};

/// Failures that end a `murmur` run.
#[derive(Debug)]
pub enum CliError {
    Mixer(MixerError),
    Settings(SettingsError),
    Config(String),
    Io(std::io::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mixer(err) => write!(f, "{}", err),
            Self::Settings(err) => write!(f, "{}", err),
            Self::Config(msg) => write!(f, "config error: {}", msg),
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CliError {}

impl From<MixerError> for CliError {
    fn from(value: MixerError) -> Self {
        Self::Mixer(value)
    }
}

impl From<SettingsError> for CliError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
