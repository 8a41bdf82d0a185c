//! Step timing constants and the delay primitive every wait goes through.

use std::time::Duration;

use spin_sleep::SpinSleeper;

use crate::error::MotorError;

/// Nominal steps for one frame pitch (one sprocket revolution).
pub const DEFAULT_STEPS_PER_REV: u32 = 4200;
/// Nominal sprocket rate.
pub const DEFAULT_REV_PER_SEC: f64 = 1.0;

/// Fixed step timing for the process lifetime.
///
/// The pulse rate is derived once from `steps_per_rev` and `rev_per_sec`;
/// there is no runtime speed scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTiming {
    steps_per_rev: u32,
    rev_per_sec: f64,
}

impl StepTiming {
    /// Construct validated step timing.
    ///
    /// # Arguments
    ///
    /// * `steps_per_rev`: Step pulses per frame pitch. Must be non-zero.
    /// * `rev_per_sec`: Nominal revolutions per second. Must be positive and finite,
    ///   and leave a half-period of at least 1 ns.
    pub fn new(steps_per_rev: u32, rev_per_sec: f64) -> Result<Self, MotorError> {
        if steps_per_rev == 0 {
            return Err(MotorError::InvalidTiming("steps per revolution must be non-zero"));
        }
        if !rev_per_sec.is_finite() || rev_per_sec <= 0.0 {
            return Err(MotorError::InvalidTiming("revolutions per second must be positive"));
        }
        match Duration::try_from_secs_f64(0.5 / (rev_per_sec * steps_per_rev as f64)) {
            Ok(half_period) if half_period >= Duration::from_nanos(1) => {}
            _ => return Err(MotorError::InvalidTiming("step half-period must be at least 1ns and representable")),
        }
        Ok(Self { steps_per_rev, rev_per_sec })
    }

    pub fn steps_per_rev(&self) -> u32 {
        self.steps_per_rev
    }

    pub fn rev_per_sec(&self) -> f64 {
        self.rev_per_sec
    }

    /// Step frequency of the continuous pulse train, in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.steps_per_rev as f64 * self.rev_per_sec
    }

    /// Duration of each high and each low half of a step pulse.
    pub fn half_period(&self) -> Duration {
        Duration::from_secs_f64(0.5 / (self.rev_per_sec * self.steps_per_rev as f64))
    }

    /// Step pulses needed to wind `frames` whole frames.
    pub fn frame_steps(&self, frames: u32) -> u64 {
        self.steps_per_rev as u64 * frames as u64
    }
}

impl Default for StepTiming {
    fn default() -> Self {
        Self { steps_per_rev: DEFAULT_STEPS_PER_REV, rev_per_sec: DEFAULT_REV_PER_SEC }
    }
}

/// Fixed pauses inserted after state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// After every wake/sleep transition of the driver.
    pub power: Duration,
    /// Between stopping the pulse train and restarting it for a continuous run.
    pub pre_run: Duration,
    /// After the trigger sensor first reads engaged.
    pub debounce: Duration,
    /// Between a reverse overshoot and its forward correction.
    pub backlash: Duration,
    /// After setting direction, before the cushion steps.
    pub pre_cushion: Duration,
    /// Upper bound for each wait on the capture signal.
    pub capture_wait: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            power: Duration::from_millis(100),
            pre_run: Duration::from_millis(500),
            debounce: Duration::from_millis(200),
            backlash: Duration::from_millis(250),
            pre_cushion: Duration::from_millis(10),
            capture_wait: Duration::from_secs(2),
        }
    }
}

/// Blocking wait used for step half-periods and settle pauses.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

impl Delay for SpinSleeper {
    fn delay(&mut self, duration: Duration) {
        self.sleep(duration);
    }
}
