//! Error types for the film transport core.

use std::fmt;

use thiserror::Error;

/// Errors raised by a digital I/O line.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The line could not be claimed or configured. Fatal at startup.
    #[error("failed to set up GPIO {pin}: {reason}")]
    Setup { pin: u8, reason: String },
    /// A read or write on an already configured line failed.
    #[error("GPIO {pin} I/O failed: {reason}")]
    Io { pin: u8, reason: String },
}

/// Which seek loop of the homing routine a sensor timeout happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPhase {
    /// Waiting for the sensor to become engaged.
    Engage,
    /// Waiting for the trailing edge of the engagement window.
    TrailingEdge,
}

impl fmt::Display for SeekPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekPhase::Engage => write!(f, "engage"),
            SeekPhase::TrailingEdge => write!(f, "trailing edge"),
        }
    }
}

/// Error type for motor operations.
#[derive(Debug, Error)]
pub enum MotorError {
    /// A GPIO line failed.
    #[error(transparent)]
    Gpio(#[from] GpioError),
    /// A timing constant was zero, negative or not finite.
    #[error("invalid step timing: {0}")]
    InvalidTiming(&'static str),
    /// Cushion percentages must lie in `0..=100`.
    #[error("invalid cushion percentage {0}, expected 0..=100")]
    InvalidCushion(u8),
    /// A homing seek phase hit its configured step limit without seeing the
    /// expected sensor transition.
    #[error("trigger sensor never changed state during {phase} seek after {steps} steps")]
    SensorTimeout { phase: SeekPhase, steps: u64 },
    /// A homing seek phase was abandoned on request.
    #[error("{phase} seek interrupted after {steps} steps")]
    Interrupted { phase: SeekPhase, steps: u64 },
    /// A background thread could not be started.
    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
