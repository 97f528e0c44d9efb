//! oscillate - play MIDI files through a patchable synth
//!
//! Run with: cargo run -- play song.mid

mod app;
mod ui;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use tracing::Level;

#[derive(Parser)]
#[command(name = "oscillate", version, about = "Patchable polyphonic synth with MIDI file playback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a MIDI file through oscillator -> envelope -> filter -> output
    Play(PlayArgs),
    /// Print the notes parsed from a MIDI file
    Inspect {
        file: PathBuf,
    },
}

#[derive(Args)]
pub struct PlayArgs {
    /// Standard MIDI file to play
    pub file: PathBuf,
    /// Engine settings (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,
    /// sine, square, triangle or saw
    #[arg(long, default_value = "sine")]
    pub waveform: String,
    /// Output sample rate; defaults to the device's rate
    #[arg(long)]
    pub sample_rate: Option<u32>,
    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
    /// Write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// No terminal UI; play to the end and exit
    #[arg(long)]
    pub headless: bool,
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;

    match Cli::parse().command {
        Command::Play(args) => {
            init_logging(&args)?;
            app::play(args)
        }
        Command::Inspect { file } => app::inspect(&file),
    }
}

/// Logs go to `--log-file` when given. Without one they go to stderr, but
/// only in headless mode: the TUI owns the terminal otherwise.
fn init_logging(args: &PlayArgs) -> EyreResult<()> {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else if args.headless {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
