//! Direction, power and motion state of the film transport driver.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MotorError;
use crate::gpio::{DigitalOutput, SharedPin};
use crate::pulse::{PulseTrain, StepEmitter};
use crate::timing::{Delay, SettleDelays, StepTiming};

/// Duty cycle of the continuous pulse train used by `fwd`/`rev`.
pub const RUN_DUTY_PERCENT: f64 = 20.0;

/// Film travel direction. Forward drives the direction line low.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Level of the direction line for this direction.
    pub fn level(self) -> bool {
        matches!(self, Direction::Reverse)
    }

    pub fn from_level(high: bool) -> Self {
        if high { Direction::Reverse } else { Direction::Forward }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Forward,
    Reverse,
}

/// Driver power. The sleep line is high while asleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Asleep,
    Awake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisState {
    pub motion: MotionState,
    pub power: PowerState,
    pub direction: Direction,
}

impl Default for AxisState {
    fn default() -> Self {
        Self { motion: MotionState::Idle, power: PowerState::Asleep, direction: Direction::Forward }
    }
}

/// Requested speed for continuous runs, in percent.
///
/// Accepted by [`MotorAxis::fwd`] and [`MotorAxis::rev`] and ignored: the
/// pulse rate always comes from [`StepTiming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed(pub u8);

impl Default for Speed {
    fn default() -> Self {
        Speed(100)
    }
}

/// Output lines the axis drives.
pub struct AxisPins<O> {
    pub direction: O,
    pub sleep: O,
    pub step: SharedPin<O>,
}

/// The film transport stepper: direction, sleep/wake and stepping.
///
/// Every operation blocks for the physical duration of the motion. Callers
/// must not overlap motor commands.
pub struct MotorAxis<O: DigitalOutput, T: PulseTrain, D: Delay + Clone> {
    direction_pin: O,
    sleep_pin: O,
    step_pin: SharedPin<O>,
    emitter: StepEmitter<O, D>,
    pulses: T,
    delay: D,
    timing: StepTiming,
    delays: SettleDelays,
    state: AxisState,
}

impl<O: DigitalOutput, T: PulseTrain, D: Delay + Clone> MotorAxis<O, T, D> {
    /// Take ownership of the driver lines and park them: direction forward,
    /// step low, driver asleep.
    pub fn new(
        pins: AxisPins<O>,
        pulses: T,
        timing: StepTiming,
        delays: SettleDelays,
        delay: D,
    ) -> Result<Self, MotorError> {
        let AxisPins { mut direction, mut sleep, step } = pins;
        direction.set_level(Direction::Forward.level())?;
        step.set_low()?;
        sleep.set_high()?;

        Ok(Self {
            direction_pin: direction,
            sleep_pin: sleep,
            emitter: StepEmitter::new(step.clone(), &timing, delay.clone()),
            step_pin: step,
            pulses,
            delay,
            timing,
            delays,
            state: AxisState::default(),
        })
    }

    pub fn state(&self) -> AxisState {
        self.state
    }

    pub fn timing(&self) -> StepTiming {
        self.timing
    }

    pub fn delays(&self) -> SettleDelays {
        self.delays
    }

    /// Another handle on the step line, for the frame-advance thread.
    pub fn step_pin(&self) -> SharedPin<O> {
        self.step_pin.clone()
    }

    pub fn wake(&mut self) -> Result<(), MotorError> {
        self.sleep_pin.set_low()?;
        self.state.power = PowerState::Awake;
        debug!("motor waking");
        self.settle(self.delays.power);
        Ok(())
    }

    pub fn sleep(&mut self) -> Result<(), MotorError> {
        self.sleep_pin.set_high()?;
        self.state.power = PowerState::Asleep;
        debug!("motor sleeping");
        self.settle(self.delays.power);
        Ok(())
    }

    /// Wake the driver unless it already is.
    pub fn ensure_awake(&mut self) -> Result<(), MotorError> {
        if self.state.power == PowerState::Asleep {
            self.wake()?;
        }
        Ok(())
    }

    /// Drive the direction line. Takes effect for every following pulse.
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), MotorError> {
        self.direction_pin.set_level(direction.level())?;
        self.state.direction = direction;
        Ok(())
    }

    /// Run forward continuously until [`stop`](Self::stop).
    pub fn fwd(&mut self, speed: Speed) -> Result<(), MotorError> {
        self.run(Direction::Forward, speed)
    }

    /// Run in reverse continuously until [`stop`](Self::stop).
    pub fn rev(&mut self, speed: Speed) -> Result<(), MotorError> {
        self.run(Direction::Reverse, speed)
    }

    fn run(&mut self, direction: Direction, speed: Speed) -> Result<(), MotorError> {
        self.ensure_awake()?;
        self.pulses.stop()?;
        self.settle(self.delays.pre_run);

        // Speed is accepted but has no effect on the pulse rate.
        let _ = speed;
        let hz = self.timing.frequency_hz();
        debug!("change_frequency: {}", hz);
        self.pulses.configure(hz)?;

        self.set_direction(direction)?;
        debug!(?direction, "motor starting");
        self.pulses.start(RUN_DUTY_PERCENT)?;
        self.state.motion = match direction {
            Direction::Forward => MotionState::Forward,
            Direction::Reverse => MotionState::Reverse,
        };
        Ok(())
    }

    /// Halt continuous motion and reset the direction line to forward.
    /// Power is left as is.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        self.pulses.stop()?;
        self.set_direction(Direction::Forward)?;
        self.state.motion = MotionState::Idle;
        Ok(())
    }

    /// Wake, wind `frames` whole frames in the current direction, sleep.
    pub fn wind_frame(&mut self, frames: u32) -> Result<(), MotorError> {
        self.wake()?;
        debug!("fwdFrame {}", frames);
        self.wind(frames)?;
        self.sleep()
    }

    /// Wind `frames` frames backwards with backlash compensation.
    ///
    /// More than one frame overshoots by one frame and winds it back forward
    /// after a pause. A single frame skips the compensation, since overshoot
    /// and correction would cancel step for step.
    pub fn rev_frame(&mut self, frames: u32) -> Result<(), MotorError> {
        debug!("revFrame {}", frames);
        if frames == 0 {
            return Ok(());
        }
        self.wake()?;
        self.set_direction(Direction::Reverse)?;
        if frames == 1 {
            self.wind(1)?;
            self.set_direction(Direction::Forward)?;
        } else {
            self.wind(frames + 1)?;
            self.set_direction(Direction::Forward)?;
            self.settle(self.delays.backlash);
            self.wind(1)?;
        }
        self.sleep()
    }

    /// Stop motion and put the driver to sleep.
    pub fn shutdown(&mut self) -> Result<(), MotorError> {
        self.stop()?;
        self.sleep()
    }

    /// Wind whole frames without touching power state.
    pub(crate) fn wind(&mut self, frames: u32) -> Result<(), MotorError> {
        self.emitter.emit(self.timing.frame_steps(frames))
    }

    pub(crate) fn step(&mut self) -> Result<(), MotorError> {
        self.emitter.pulse()
    }

    pub(crate) fn emit(&mut self, steps: u64) -> Result<(), MotorError> {
        self.emitter.emit(steps)
    }

    pub(crate) fn settle(&mut self, duration: Duration) {
        self.delay.delay(duration);
    }
}

impl<O: DigitalOutput, T: PulseTrain, D: Delay + Clone> Drop for MotorAxis<O, T, D> {
    fn drop(&mut self) {
        if self.state.power == PowerState::Awake || self.state.motion != MotionState::Idle {
            if let Err(e) = self.shutdown() {
                warn!("Failed to park motor on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimBench, SimDelay, SimLine, SimOutput, SimPulseTrain, StepRun};

    const SPR: u32 = 40;

    fn sim_axis(bench: &SimBench) -> (MotorAxis<SimOutput, SimPulseTrain, SimDelay>, SimPulseTrain, SimDelay) {
        let pulses = SimPulseTrain::new();
        let delay = SimDelay::new();
        let pins = AxisPins {
            direction: bench.output(SimLine::Direction),
            sleep: bench.output(SimLine::Sleep),
            step: SharedPin::new(bench.output(SimLine::Step)),
        };
        let timing = StepTiming::new(SPR, 1.0).unwrap();
        let axis = MotorAxis::new(pins, pulses.clone(), timing, SettleDelays::default(), delay.clone()).unwrap();
        (axis, pulses, delay)
    }

    #[test]
    fn test_initial_state() {
        let bench = SimBench::new();
        let (axis, _, _) = sim_axis(&bench);
        assert_eq!(axis.state(), AxisState::default());
        let state = bench.snapshot();
        assert!(state.is_asleep());
        assert!(!state.direction_high);
        assert!(!state.step_high);
    }

    #[test]
    fn test_wake_and_sleep_settle() {
        let bench = SimBench::new();
        let (mut axis, _, delay) = sim_axis(&bench);

        axis.wake().unwrap();
        assert_eq!(axis.state().power, PowerState::Awake);
        assert!(!bench.snapshot().is_asleep());

        axis.sleep().unwrap();
        assert_eq!(axis.state().power, PowerState::Asleep);
        assert!(bench.snapshot().is_asleep());
        assert_eq!(delay.count(Duration::from_millis(100)), 2);
    }

    #[test]
    fn test_wind_frame_emits_whole_frames_and_sleeps() {
        let bench = SimBench::new();
        let (mut axis, _, _) = sim_axis(&bench);

        axis.wind_frame(3).unwrap();

        let state = bench.snapshot();
        assert_eq!(state.forward_pulses, 3 * SPR as u64);
        assert_eq!(state.reverse_pulses, 0);
        assert_eq!(state.pulses_while_asleep, 0);
        assert!(state.is_asleep());
        assert_eq!(axis.state().power, PowerState::Asleep);
    }

    #[test]
    fn test_rev_frame_single_has_no_compensation() {
        let bench = SimBench::new();
        let (mut axis, _, delay) = sim_axis(&bench);

        axis.rev_frame(1).unwrap();

        let state = bench.snapshot();
        assert_eq!(state.runs, vec![StepRun { direction: Direction::Reverse, pulses: SPR as u64 }]);
        assert_eq!(state.position, -(SPR as i64));
        assert!(!state.direction_high);
        assert!(state.is_asleep());
        assert_eq!(delay.count(Duration::from_millis(250)), 0);
        assert_eq!(axis.state().direction, Direction::Forward);
    }

    #[test]
    fn test_rev_frame_overshoots_and_corrects() {
        let bench = SimBench::new();
        let (mut axis, _, delay) = sim_axis(&bench);

        axis.rev_frame(3).unwrap();

        let state = bench.snapshot();
        assert_eq!(
            state.runs,
            vec![
                StepRun { direction: Direction::Reverse, pulses: 4 * SPR as u64 },
                StepRun { direction: Direction::Forward, pulses: SPR as u64 },
            ]
        );
        assert_eq!(state.position, -3 * SPR as i64);
        assert_eq!(state.pulses_while_asleep, 0);
        assert!(state.is_asleep());
        assert_eq!(delay.count(Duration::from_millis(250)), 1);
    }

    #[test]
    fn test_fwd_ignores_speed() {
        let bench = SimBench::new();
        let (mut axis, pulses, delay) = sim_axis(&bench);

        axis.fwd(Speed(10)).unwrap();
        axis.stop().unwrap();
        axis.fwd(Speed(100)).unwrap();

        let log = pulses.log();
        assert_eq!(log.configures, vec![SPR as f64, SPR as f64]);
        assert_eq!(log.duty_percent, Some(RUN_DUTY_PERCENT));
        assert!(log.running);
        assert_eq!(axis.state().motion, MotionState::Forward);
        assert_eq!(axis.state().power, PowerState::Awake);
        assert_eq!(delay.count(Duration::from_millis(500)), 2);
        // Only the first run had to wake the driver.
        assert_eq!(delay.count(Duration::from_millis(100)), 1);
    }

    #[test]
    fn test_rev_sets_direction_before_start() {
        let bench = SimBench::new();
        let (mut axis, pulses, _) = sim_axis(&bench);

        axis.rev(Speed::default()).unwrap();

        assert!(bench.snapshot().direction_high);
        assert!(pulses.is_running());
        assert_eq!(axis.state().motion, MotionState::Reverse);
        assert_eq!(axis.state().direction, Direction::Reverse);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let bench = SimBench::new();
        let (mut axis, pulses, _) = sim_axis(&bench);

        axis.rev(Speed::default()).unwrap();
        axis.stop().unwrap();
        let once = axis.state();
        axis.stop().unwrap();

        assert_eq!(axis.state(), once);
        assert_eq!(once.motion, MotionState::Idle);
        assert_eq!(once.direction, Direction::Forward);
        // Stop leaves power alone.
        assert_eq!(once.power, PowerState::Awake);
        assert!(!bench.snapshot().direction_high);
        assert_eq!(pulses.log().stops, 1);
        assert!(!pulses.is_running());
    }

    #[test]
    fn test_drop_parks_driver() {
        let bench = SimBench::new();
        let (mut axis, pulses, _) = sim_axis(&bench);
        axis.fwd(Speed::default()).unwrap();
        drop(axis);

        assert!(bench.snapshot().is_asleep());
        assert!(!pulses.is_running());
    }
}
