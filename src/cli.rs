use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Film transport control for the frame-by-frame capture rig
#[derive(Parser, Debug)]
#[command(name = "filmcap", version, about = "Film transport control for the frame-by-frame capture rig")]
pub struct Args {
    /// Path to the config file
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value_os = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Calibrate (if configured) and run a capture session. The default.
    Capture,
    /// Center the current frame in the gate
    Calibrate,
    /// Wind whole frames forward
    Wind {
        #[arg(default_value_t = 1)]
        frames: u32,
    },
    /// Wind whole frames backwards with backlash compensation
    Rewind {
        #[arg(default_value_t = 1)]
        frames: u32,
    },
    /// Run continuously, then stop and re-center the frame
    Run {
        /// Run in reverse instead of forward
        #[arg(short, long)]
        reverse: bool,
        /// How long to run; Ctrl-C stops early
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f64,
        /// Requested speed in percent (accepted, currently without effect)
        #[arg(long)]
        speed: Option<u8>,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Capture)
    }
}
