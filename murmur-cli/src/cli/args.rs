//! CLI argument definitions for `murmur`.

use clap::{Arg, ArgAction, Command};

/// Build the CLI argument parser.
pub fn build_cli() -> Command {
    Command::new("murmur")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mix looping ambient sounds from a directory of .wav files")
        .arg(
            Arg::new("SOUND_DIR")
                .help("Directory holding the .wav layers")
                .default_value("assets")
                .index(1),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .short('s')
                .value_name("PATH")
                .help("Settings file (defaults to SOUND_DIR/settings.json)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .help("JSON file with mixer tuning (voice budget, fade timing, effects)"),
        )
        .arg(
            Arg::new("voices")
                .long("voices")
                .value_name("COUNT")
                .value_parser(clap::value_parser!(usize))
                .help("Maximum number of sounds playing at once"),
        )
        .arg(
            Arg::new("headless")
                .long("headless")
                .action(ArgAction::SetTrue)
                .help("Run without an audio device (silent in-memory output)"),
        )
}
