// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use keyboard_anywhere::Config;
use keyboard_anywhere::constants::APP_DIR_NAME;
use std::path::PathBuf;
use std::sync::Mutex;

mod cli;

#[derive(Parser)]
#[command(name = "keyboard-anywhere")]
#[command(about = "Play a virtual piano on any flat surface with a depth camera")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: ~/.config/keyboard-anywhere/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at info level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play without the terminal viewer (Ctrl+C to stop)
    Run,

    /// Calibrate from three points given in sensor coordinates
    Calibrate {
        /// Lower left corner as x,y,z
        #[arg(long, value_parser = cli::parse_point, allow_hyphen_values = true)]
        p0: nalgebra::Point3<f64>,

        /// Lower right corner as x,y,z
        #[arg(long, value_parser = cli::parse_point, allow_hyphen_values = true)]
        p1: nalgebra::Point3<f64>,

        /// Any other point on the surface as x,y,z
        #[arg(long, value_parser = cli::parse_point, allow_hyphen_values = true)]
        p2: nalgebra::Point3<f64>,
    },

    /// Adjust the saved calibration in small steps
    Nudge {
        /// Rotate about the local Y axis or shift along the local Z axis
        axis: NudgeAxis,

        /// Direction, +1 or -1
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        sign: i8,

        /// Number of steps to apply
        #[arg(long, default_value = "1")]
        steps: u32,
    },

    /// Print the saved calibration
    Show,

    /// Delete the saved calibration
    Reset,

    /// List depth sensors and MIDI output ports
    List,

    /// Record raw depth frames for replay
    Record {
        /// Number of frames to record
        #[arg(short, long, default_value = "300")]
        frames: usize,

        /// Output file (default: ./depth_TIMESTAMP.raw)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NudgeAxis {
    Roll,
    Z,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.is_none());

    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        None => cli::run_terminal(&config),
        Some(Commands::Run) => cli::run_headless(&config),
        Some(Commands::Calibrate { p0, p1, p2 }) => cli::calibrate(&config, p0, p1, p2),
        Some(Commands::Nudge { axis, sign, steps }) => cli::nudge(&config, axis, sign, steps),
        Some(Commands::Show) => cli::show(&config),
        Some(Commands::Reset) => cli::reset(&config),
        Some(Commands::List) => cli::list(),
        Some(Commands::Record { frames, output }) => cli::record(&config, frames, output),
    }
}

/// Set up tracing
///
/// RUST_LOG overrides the level (e.g. RUST_LOG=keyboard_anywhere=debug).
/// The terminal viewer owns the screen, so it logs to a file in the cache
/// directory instead of stderr.
fn init_logging(verbose: bool, terminal_mode: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "info" } else { "warn" })
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    if !terminal_mode {
        builder.init();
        return;
    }

    let log_file = dirs::cache_dir().map(|dir| dir.join(APP_DIR_NAME)).and_then(|dir| {
        std::fs::create_dir_all(&dir).ok()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", APP_DIR_NAME)))
            .ok()
    });

    match log_file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        None => builder.with_writer(std::io::sink).init(),
    }
}
