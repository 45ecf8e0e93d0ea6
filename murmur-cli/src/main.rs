//! # Murmur
//!
//! A console mixer for looping ambient sound layers.

use log::error;

mod cli;
mod commands;
mod error;
mod logging;
mod runner;
mod status;

fn main() {
    dotenv::dotenv().ok();
    let log_buffer = logging::init();
    let args = cli::args::build_cli().get_matches();

    let code = match runner::run(&args, log_buffer) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            eprintln!("murmur: {}", err.to_string().to_lowercase());
            1
        }
    };

    std::process::exit(code)
}
