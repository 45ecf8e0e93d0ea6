//! Console command parsing.

/// One line typed at the `murmur>` prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Status,
    Play(String),
    Pause(String),
    Resume(String),
    Stop(String),
    /// Instant volume, 0.0..=1.0.
    Volume(String, f32),
    /// Faded volume, 0.0..=1.0.
    Fade(String, f32),
    /// Faded pan, -1.0..=1.0.
    Pan(String, f32),
    Breathe(String),
    Wander(String),
    Balance(bool),
    Save,
    Log,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                  registered sounds
  status                state of every sound
  play|pause|resume|stop NAME
  vol NAME 0-100        set volume now
  fade NAME 0-100       glide volume
  pan NAME -100..100    glide pan (left to right)
  breathe NAME          toggle breathing
  wander NAME           toggle random pan walk
  balance on|off        auto-balance playing sounds
  save                  write settings now
  log                   recent log lines
  help                  this text
  quit                  save and exit";

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match verb.to_lowercase().as_str() {
        "list" | "ls" => Command::List,
        "status" | "st" => Command::Status,
        "play" => Command::Play(name(&args, verb)?),
        "pause" => Command::Pause(name(&args, verb)?),
        "resume" => Command::Resume(name(&args, verb)?),
        "stop" => Command::Stop(name(&args, verb)?),
        "vol" | "volume" => {
            let (name, value) = name_and_percent(&args, verb, 0.0, 100.0)?;
            Command::Volume(name, value)
        }
        "fade" => {
            let (name, value) = name_and_percent(&args, verb, 0.0, 100.0)?;
            Command::Fade(name, value)
        }
        "pan" => {
            let (name, value) = name_and_percent(&args, verb, -100.0, 100.0)?;
            Command::Pan(name, value)
        }
        "breathe" => Command::Breathe(name(&args, verb)?),
        "wander" => Command::Wander(name(&args, verb)?),
        "balance" => match args.as_slice() {
            ["on"] => Command::Balance(true),
            ["off"] => Command::Balance(false),
            _ => return Err("usage: balance on|off".to_string()),
        },
        "save" => Command::Save,
        "log" => Command::Log,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {} (try help)", other)),
    };
    Ok(Some(command))
}

fn name(args: &[&str], verb: &str) -> Result<String, String> {
    match args {
        [name] => Ok((*name).to_string()),
        _ => Err(format!("usage: {} NAME", verb)),
    }
}

/// `NAME VALUE` with VALUE given in percent and returned as a fraction.
fn name_and_percent(
    args: &[&str],
    verb: &str,
    min: f32,
    max: f32,
) -> Result<(String, f32), String> {
    let usage = || format!("usage: {} NAME {}..{}", verb, min, max);
    let [name, value] = args else {
        return Err(usage());
    };
    let value: f32 = value.parse().map_err(|_| usage())?;
    if !value.is_finite() || value < min || value > max {
        return Err(usage());
    }
    Ok(((*name).to_string(), value / 100.0))
}
