use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use clap::ArgMatches;
use log::{info, warn};
use murmur_lib::{Effect, Mixer, MixerConfig, MixerSettings};

use crate::commands::{self, Command, HELP};
use crate::error::CliError;
use crate::logging::{self, LogBuffer};
use crate::status::status_line;

const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5);
const INPUT_POLL: Duration = Duration::from_millis(250);

/// Console session state: the mixer plus where its settings live.
struct Session {
    mixer: Mixer,
    settings: MixerSettings,
    settings_path: PathBuf,
    log_buffer: LogBuffer,
}

pub fn run(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, CliError> {
    info!("Starting murmur");
    let sound_dir = PathBuf::from(
        args.get_one::<String>("SOUND_DIR")
            .map(String::as_str)
            .unwrap_or("assets"),
    );
    let settings_path = args
        .get_one::<String>("settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| sound_dir.join("settings.json"));
    let config = load_config(args)?;

    let mixer = if args.get_flag("headless") {
        info!("running headless");
        Mixer::headless(config).0
    } else {
        Mixer::open_default(config)?
    };

    let loaded = load_sounds(&mixer, &sound_dir)?;
    println!("loaded {} sounds from {}", loaded, sound_dir.display());

    let settings = match MixerSettings::load_from_file(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            warn!("ignoring settings at {}: {}", settings_path.display(), err);
            println!("could not read settings: {}", err);
            MixerSettings::default()
        }
    };
    for (identity, err) in mixer.restore_settings(&settings) {
        println!("could not resume {}: {}", identity, err);
    }

    let mut session = Session {
        mixer,
        settings,
        settings_path,
        log_buffer,
    };
    println!("type help for commands");
    session.console()?;

    session.save();
    session.mixer.cleanup();
    info!("murmur stopped");
    Ok(0)
}

/// Mixer tuning from `--config`, with `--voices` applied on top.
fn load_config(args: &ArgMatches) -> Result<MixerConfig, CliError> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| CliError::Config(format!("{}: {}", path, err)))?;
            serde_json::from_str::<MixerConfig>(&text)
                .map_err(|err| CliError::Config(format!("{}: {}", path, err)))?
        }
        None => MixerConfig::default(),
    };
    if let Some(voices) = args.get_one::<usize>("voices") {
        if *voices == 0 {
            return Err(CliError::Config("--voices must be at least 1".to_string()));
        }
        config.voice_budget = *voices;
        config.channel_count = config.channel_count.max(*voices);
    }
    Ok(config)
}

/// Register every `.wav` file in `dir` under its file stem.
fn load_sounds(mixer: &Mixer, dir: &Path) -> Result<usize, CliError> {
    if !dir.exists() {
        info!("creating sound directory {}", dir.display());
        fs::create_dir_all(dir)?;
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        match mixer.load(name, &path) {
            Ok(()) => loaded += 1,
            Err(err) => {
                warn!("skipping {}: {}", path.display(), err);
                println!("skipping {}: {}", path.display(), err);
            }
        }
    }
    Ok(loaded)
}

/// Read stdin lines on a helper thread so the main loop can autosave.
fn spawn_input_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

impl Session {
    fn console(&mut self) -> Result<(), CliError> {
        let input = spawn_input_reader();
        let mut last_save = Instant::now();
        prompt()?;

        loop {
            match input.recv_timeout(INPUT_POLL) {
                Ok(line) => {
                    match commands::parse(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => self.execute(command),
                        Ok(None) => {}
                        Err(message) => println!("{}", message),
                    }
                    prompt()?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_save.elapsed() >= AUTOSAVE_INTERVAL {
                self.save();
                last_save = Instant::now();
            }
        }
        Ok(())
    }

    fn execute(&mut self, command: Command) {
        let mixer = &self.mixer;
        let result = match command {
            Command::List => {
                for name in mixer.voice_ids() {
                    println!("{}", name);
                }
                Ok(())
            }
            Command::Status => {
                let snapshots = mixer.snapshots();
                if snapshots.is_empty() {
                    println!("no sounds loaded");
                }
                for snapshot in &snapshots {
                    println!("{}", status_line(snapshot));
                }
                println!(
                    "{}/{} playing, auto-balance {}",
                    mixer.playing_count(),
                    mixer.voice_budget(),
                    if mixer.auto_balance_enabled() { "on" } else { "off" }
                );
                Ok(())
            }
            Command::Play(name) => mixer.play(&name),
            Command::Pause(name) => mixer.pause(&name),
            Command::Resume(name) => mixer.resume(&name),
            Command::Stop(name) => mixer.stop(&name),
            Command::Volume(name, volume) => mixer.set_volume(&name, volume),
            Command::Fade(name, volume) => mixer.fade_volume(&name, volume),
            Command::Pan(name, pan) => mixer.set_pan(&name, pan),
            Command::Breathe(name) => toggle_effect(mixer, &name, Effect::Breathing),
            Command::Wander(name) => toggle_effect(mixer, &name, Effect::PanWalk),
            Command::Balance(enabled) => {
                mixer.toggle_auto_balance(enabled);
                Ok(())
            }
            Command::Save => {
                self.save();
                println!("saved {}", self.settings_path.display());
                Ok(())
            }
            Command::Log => {
                for line in logging::snapshot(&self.log_buffer) {
                    println!("{}", line);
                }
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => Ok(()),
        };
        if let Err(err) = result {
            println!("error: {}", err);
        }
    }

    /// Merge the mixer state into the loaded settings and write them out.
    fn save(&mut self) {
        let captured = self.mixer.capture_settings();
        self.settings.sounds.extend(captured.sounds);
        self.settings.auto_balance = captured.auto_balance;
        if let Err(err) = self.settings.save_to_file(&self.settings_path) {
            warn!("could not save settings: {}", err);
        }
    }
}

fn toggle_effect(mixer: &Mixer, name: &str, effect: Effect) -> Result<(), murmur_lib::MixerError> {
    let active = mixer.snapshot(name)?.has_effect(effect);
    match (effect, active) {
        (Effect::Breathing, false) => mixer.start_breathing(name),
        (Effect::Breathing, true) => mixer.stop_breathing(name),
        (Effect::PanWalk, false) => mixer.start_pan_walk(name),
        (Effect::PanWalk, true) => mixer.stop_pan_walk(name),
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "murmur> ")?;
    stdout.flush()
}
