//! Text rendering of mixer state for the console.

use murmur_lib::{Effect, PlaybackState, VoiceSnapshot};

/// One status line, e.g. `rain      playing   vol  80%  pan +0.00  breathing`.
pub fn status_line(snapshot: &VoiceSnapshot) -> String {
    let state = match snapshot.state {
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
        PlaybackState::Stopped => "stopped",
    };
    let effects: Vec<&str> = snapshot
        .effects
        .iter()
        .map(|effect| match effect {
            Effect::Breathing => "breathing",
            Effect::PanWalk => "wander",
        })
        .collect();

    let mut line = format!(
        "{:<12} {:<8} vol {:>3.0}%  pan {:+.2}",
        snapshot.identity,
        state,
        snapshot.volume * 100.0,
        snapshot.pan
    );
    if !effects.is_empty() {
        line.push_str("  ");
        line.push_str(&effects.join(", "));
    }
    line
}
