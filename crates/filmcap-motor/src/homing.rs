//! Frame registration against the photo-optic trigger sensor.
//!
//! Centering always seeks in the forward direction, whatever direction the
//! transport arrived from. Only the extra correction frame after a reverse
//! arrival depends on the caller's direction.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::axis::{Direction, MotorAxis};
use crate::error::{MotorError, SeekPhase};
use crate::gpio::{DigitalInput, DigitalOutput};
use crate::pulse::PulseTrain;
use crate::sync::Signal;
use crate::timing::{Delay, StepTiming};

/// Which input level means "engaged".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPolarity {
    #[default]
    ActiveHigh,
    ActiveLow,
}

impl TriggerPolarity {
    pub fn engaged_level(self) -> bool {
        matches!(self, TriggerPolarity::ActiveHigh)
    }
}

/// The trigger sensor input. Read only.
pub struct TriggerSensor<I> {
    pin: I,
    polarity: TriggerPolarity,
}

impl<I: DigitalInput> TriggerSensor<I> {
    pub fn new(pin: I, polarity: TriggerPolarity) -> Self {
        Self { pin, polarity }
    }

    pub fn polarity(&self) -> TriggerPolarity {
        self.polarity
    }

    pub fn is_engaged(&self) -> Result<bool, MotorError> {
        Ok(self.pin.is_high()? == self.polarity.engaged_level())
    }
}

/// Share of a frame pitch left between the trigger's trailing edge and the
/// rest position. The transport advances the remaining `100 - cushion`
/// percent past the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CushionPercent(u8);

impl CushionPercent {
    pub fn new(percent: u8) -> Result<Self, MotorError> {
        if percent > 100 {
            return Err(MotorError::InvalidCushion(percent));
        }
        Ok(Self(percent))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Forward steps to take after the trailing edge.
    pub fn steps(&self, timing: &StepTiming) -> u64 {
        let steps = timing.steps_per_rev() as f64 * (100 - self.0) as f64 / 100.0;
        steps.round() as u64
    }
}

impl Default for CushionPercent {
    fn default() -> Self {
        Self(50)
    }
}

/// What one centering pass did, in step pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CenterReport {
    /// Steps until the sensor engaged.
    pub engage_steps: u64,
    /// Steps from engagement to the trailing edge.
    pub edge_steps: u64,
    /// Whole frames wound to take up reverse backlash (0 or 1).
    pub backlash_frames: u32,
    pub cushion_steps: u64,
}

/// Sensor-guided centering of a frame in the gate.
#[derive(Debug, Clone, Default)]
pub struct HomingCenterer {
    max_seek_steps: Option<u64>,
    abort: Option<Arc<Signal>>,
}

impl HomingCenterer {
    /// A centerer whose seeks never give up. A dead sensor blocks forever.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each seek phase to `max_steps` pulses; past that the pass fails
    /// with [`MotorError::SensorTimeout`].
    pub fn with_step_limit(max_steps: u64) -> Self {
        Self { max_seek_steps: Some(max_steps), abort: None }
    }

    /// Give up a seek with [`MotorError::Interrupted`] once `abort` is set.
    /// Checked before every step.
    pub fn with_abort(mut self, abort: Arc<Signal>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn max_seek_steps(&self) -> Option<u64> {
        self.max_seek_steps
    }

    /// Find the trailing edge of the trigger window and park `cushion` short
    /// of a full frame pitch past it.
    ///
    /// The caller stops any continuous run first. The driver is woken if it
    /// sleeps and left awake afterwards.
    pub fn center<O, T, D, I>(
        &self,
        axis: &mut MotorAxis<O, T, D>,
        sensor: &TriggerSensor<I>,
        cushion: CushionPercent,
        arrived_from: Direction,
    ) -> Result<CenterReport, MotorError>
    where
        O: DigitalOutput,
        T: PulseTrain,
        D: Delay + Clone,
        I: DigitalInput,
    {
        debug!(cushion = cushion.value(), ?arrived_from, "Center a frame");
        let delays = axis.delays();
        axis.ensure_awake()?;
        axis.set_direction(Direction::Forward)?;

        let engage_steps = self.seek(axis, sensor, SeekPhase::Engage)?;
        axis.settle(delays.debounce);
        let edge_steps = self.seek(axis, sensor, SeekPhase::TrailingEdge)?;

        let backlash_frames = if arrived_from == Direction::Reverse {
            debug!("Winding 1 frame");
            axis.wind(1)?;
            1
        } else {
            0
        };

        let cushion_steps = cushion.steps(&axis.timing());
        axis.set_direction(Direction::Forward)?;
        axis.settle(delays.pre_cushion);
        debug!("Forward {}", cushion_steps);
        axis.emit(cushion_steps)?;

        Ok(CenterReport { engage_steps, edge_steps, backlash_frames, cushion_steps })
    }

    /// Step forward until the sensor leaves the state this phase waits out.
    fn seek<O, T, D, I>(
        &self,
        axis: &mut MotorAxis<O, T, D>,
        sensor: &TriggerSensor<I>,
        phase: SeekPhase,
    ) -> Result<u64, MotorError>
    where
        O: DigitalOutput,
        T: PulseTrain,
        D: Delay + Clone,
        I: DigitalInput,
    {
        let engaged_while_stepping = phase == SeekPhase::TrailingEdge;
        let mut steps = 0u64;
        while sensor.is_engaged()? == engaged_while_stepping {
            if self.abort.as_ref().is_some_and(|abort| abort.is_set()) {
                return Err(MotorError::Interrupted { phase, steps });
            }
            if self.max_seek_steps.is_some_and(|limit| steps >= limit) {
                return Err(MotorError::SensorTimeout { phase, steps });
            }
            axis.step()?;
            steps += 1;
        }
        debug!(%phase, steps, "Seek done");
        Ok(steps)
    }
}
