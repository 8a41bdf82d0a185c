//! Simulated film transport bench.
//!
//! The bench tracks the three driver lines and a film position. Each rising
//! edge on the step line moves the film one step in the direction the
//! direction line selects, as long as the driver is awake. A simulated
//! trigger sensor reads engaged while the position sits inside a window of
//! each frame pitch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::axis::Direction;
use crate::error::{GpioError, MotorError};
use crate::gpio::{DigitalInput, DigitalOutput};
use crate::hal::Board;
use crate::homing::TriggerPolarity;
use crate::pulse::PulseTrain;
use crate::timing::Delay;

/// Consecutive step pulses emitted in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRun {
    pub direction: Direction,
    pub pulses: u64,
}

/// Snapshot of everything the bench has observed.
#[derive(Debug, Clone)]
pub struct BenchState {
    pub direction_high: bool,
    pub sleep_high: bool,
    pub step_high: bool,
    /// Film position in steps, forward positive.
    pub position: i64,
    pub forward_pulses: u64,
    pub reverse_pulses: u64,
    /// Rising step edges seen while the driver slept. Must stay zero.
    pub pulses_while_asleep: u64,
    pub runs: Vec<StepRun>,
}

impl Default for BenchState {
    fn default() -> Self {
        Self {
            direction_high: false,
            sleep_high: true,
            step_high: false,
            position: 0,
            forward_pulses: 0,
            reverse_pulses: 0,
            pulses_while_asleep: 0,
            runs: Vec::new(),
        }
    }
}

impl BenchState {
    pub fn is_asleep(&self) -> bool {
        self.sleep_high
    }

    pub fn direction(&self) -> Direction {
        Direction::from_level(self.direction_high)
    }

    fn rising_step(&mut self) {
        if self.sleep_high {
            self.pulses_while_asleep += 1;
            return;
        }
        let direction = self.direction();
        match direction {
            Direction::Forward => {
                self.position += 1;
                self.forward_pulses += 1;
            }
            Direction::Reverse => {
                self.position -= 1;
                self.reverse_pulses += 1;
            }
        }
        match self.runs.last_mut() {
            Some(run) if run.direction == direction => run.pulses += 1,
            _ => self.runs.push(StepRun { direction, pulses: 1 }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimLine {
    Direction,
    Step,
    Sleep,
}

/// Where the trigger sensor engages within each frame pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerWindow {
    /// Steps between repeats of the window.
    pub pitch: u64,
    /// First engaged position (inclusive).
    pub start: u64,
    /// First disengaged position after the window (exclusive end).
    pub end: u64,
}

impl TriggerWindow {
    pub fn new(pitch: u64, start: u64, end: u64) -> Self {
        Self { pitch, start, end }
    }

    pub fn is_engaged(&self, position: i64) -> bool {
        let offset = position.rem_euclid(self.pitch.max(1) as i64) as u64;
        offset >= self.start && offset < self.end
    }
}

#[derive(Clone, Default)]
pub struct SimBench {
    state: Arc<Mutex<BenchState>>,
}

impl SimBench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self, line: SimLine) -> SimOutput {
        SimOutput { line, state: Arc::clone(&self.state) }
    }

    /// A trigger sensor engaged over `window`, reporting levels for `polarity`.
    pub fn trigger(&self, window: TriggerWindow, polarity: TriggerPolarity) -> SimInput {
        SimInput {
            source: InputSource::Window { state: Arc::clone(&self.state), window, polarity },
        }
    }

    pub fn board(&self, window: TriggerWindow, polarity: TriggerPolarity) -> Board<SimOutput, SimInput> {
        Board {
            direction: self.output(SimLine::Direction),
            step: self.output(SimLine::Step),
            sleep: self.output(SimLine::Sleep),
            trigger: self.trigger(window, polarity),
        }
    }

    pub fn snapshot(&self) -> BenchState {
        self.state.lock().clone()
    }

    /// Move the film without stepping, e.g. to start a test mid-frame.
    pub fn set_position(&self, position: i64) {
        self.state.lock().position = position;
    }
}

pub struct SimOutput {
    line: SimLine,
    state: Arc<Mutex<BenchState>>,
}

impl DigitalOutput for SimOutput {
    fn set_high(&mut self) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        match self.line {
            SimLine::Direction => state.direction_high = true,
            SimLine::Sleep => state.sleep_high = true,
            SimLine::Step => {
                if !state.step_high {
                    state.rising_step();
                }
                state.step_high = true;
            }
        }
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        match self.line {
            SimLine::Direction => state.direction_high = false,
            SimLine::Sleep => state.sleep_high = false,
            SimLine::Step => state.step_high = false,
        }
        Ok(())
    }

    fn is_set_high(&self) -> bool {
        let state = self.state.lock();
        match self.line {
            SimLine::Direction => state.direction_high,
            SimLine::Sleep => state.sleep_high,
            SimLine::Step => state.step_high,
        }
    }
}

enum InputSource {
    Window { state: Arc<Mutex<BenchState>>, window: TriggerWindow, polarity: TriggerPolarity },
    Fixed(bool),
}

pub struct SimInput {
    source: InputSource,
}

impl SimInput {
    /// An input stuck at one level, for sensor failure scenarios.
    pub fn stuck(high: bool) -> Self {
        Self { source: InputSource::Fixed(high) }
    }
}

impl DigitalInput for SimInput {
    fn is_high(&self) -> Result<bool, GpioError> {
        match &self.source {
            InputSource::Fixed(level) => Ok(*level),
            InputSource::Window { state, window, polarity } => {
                let engaged = window.is_engaged(state.lock().position);
                Ok(engaged == polarity.engaged_level())
            }
        }
    }
}

/// Delay that returns immediately and records what was requested.
#[derive(Clone, Default)]
pub struct SimDelay {
    log: Arc<Mutex<Vec<Duration>>>,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times exactly `duration` was requested.
    pub fn count(&self, duration: Duration) -> usize {
        self.log.lock().iter().filter(|d| **d == duration).count()
    }
}

impl Delay for SimDelay {
    fn delay(&mut self, duration: Duration) {
        self.log.lock().push(duration);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseLog {
    pub frequency_hz: Option<f64>,
    pub running: bool,
    pub duty_percent: Option<f64>,
    pub configures: Vec<f64>,
    pub starts: u32,
    pub stops: u32,
}

/// Pulse train that only records calls. Clones share one log.
#[derive(Clone, Default)]
pub struct SimPulseTrain {
    log: Arc<Mutex<PulseLog>>,
}

impl SimPulseTrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> PulseLog {
        self.log.lock().clone()
    }
}

impl PulseTrain for SimPulseTrain {
    fn configure(&mut self, frequency_hz: f64) -> Result<(), MotorError> {
        let mut log = self.log.lock();
        log.frequency_hz = Some(frequency_hz);
        log.configures.push(frequency_hz);
        Ok(())
    }

    fn start(&mut self, duty_percent: f64) -> Result<(), MotorError> {
        let mut log = self.log.lock();
        if !log.running {
            log.running = true;
            log.duty_percent = Some(duty_percent);
            log.starts += 1;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MotorError> {
        let mut log = self.log.lock();
        if log.running {
            log.running = false;
            log.stops += 1;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.log.lock().running
    }
}
