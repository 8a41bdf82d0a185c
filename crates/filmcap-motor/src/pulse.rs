//! Step pulse generation.
//!
//! Two ways of producing steps live here: [`PulseTrain`] for continuous
//! square waves that run until stopped, and [`StepEmitter`] for bounded,
//! bit-banged pulse counts on the caller's thread. Homing and frame advance
//! only ever talk to a `StepEmitter`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::MotorError;
use crate::gpio::{DigitalOutput, SharedPin};
use crate::timing::{Delay, StepTiming};

/// Continuous fixed-frequency square wave on one output.
pub trait PulseTrain {
    /// Set the emission frequency. A running train keeps its old frequency
    /// until the next `start`, so callers stop before reconfiguring.
    fn configure(&mut self, frequency_hz: f64) -> Result<(), MotorError>;

    /// Begin emitting at the configured frequency. No-op while running.
    fn start(&mut self, duty_percent: f64) -> Result<(), MotorError>;

    /// Halt emission and leave the output low. No-op while stopped.
    fn stop(&mut self) -> Result<(), MotorError>;

    fn is_running(&self) -> bool;
}

/// Software pulse train: a dedicated thread toggling the step line with
/// spin-assisted sleeps.
pub struct SoftPulseTrain<P, D> {
    pin: SharedPin<P>,
    delay: D,
    frequency_hz: f64,
    period: Option<Duration>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<P, D> SoftPulseTrain<P, D>
where
    P: DigitalOutput + Send + 'static,
    D: Delay + Clone + Send + 'static,
{
    pub fn new(pin: SharedPin<P>, delay: D) -> Self {
        Self {
            pin,
            delay,
            frequency_hz: 0.0,
            period: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }
}

impl<P, D> PulseTrain for SoftPulseTrain<P, D>
where
    P: DigitalOutput + Send + 'static,
    D: Delay + Clone + Send + 'static,
{
    fn configure(&mut self, frequency_hz: f64) -> Result<(), MotorError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(MotorError::InvalidTiming("pulse frequency must be positive"));
        }
        let period = match Duration::try_from_secs_f64(1.0 / frequency_hz) {
            Ok(period) if period >= Duration::from_nanos(2) => period,
            _ => return Err(MotorError::InvalidTiming("pulse period must be at least 2ns and representable")),
        };
        self.frequency_hz = frequency_hz;
        self.period = Some(period);
        Ok(())
    }

    fn start(&mut self, duty_percent: f64) -> Result<(), MotorError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(period) = self.period else {
            return Err(MotorError::InvalidTiming("pulse train started before configure"));
        };
        if duty_percent.is_nan() {
            return Err(MotorError::InvalidTiming("duty cycle must be a number"));
        }

        let high = period.mul_f64(duty_percent.clamp(0.0, 100.0) / 100.0);
        let low = period.saturating_sub(high);
        debug!(frequency_hz = self.frequency_hz, duty_percent, "Pulse train starting");

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let pin = self.pin.clone();
        let mut delay = self.delay.clone();

        let worker = std::thread::Builder::new()
            .name("pulse-train".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    if let Err(e) = pin.set_high() {
                        error!("Pulse train stopped: {}", e);
                        break;
                    }
                    delay.delay(high);
                    if let Err(e) = pin.set_low() {
                        error!("Pulse train stopped: {}", e);
                        break;
                    }
                    delay.delay(low);
                }
                running.store(false, Ordering::Release);
            })
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                MotorError::Spawn { name: "pulse-train", source }
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MotorError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        if worker.join().is_err() {
            warn!("Pulse train thread panicked");
        }
        self.pin.set_low()?;
        debug!("Pulse train stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::Acquire)
    }
}

impl<P, D> Drop for SoftPulseTrain<P, D> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Bounded step pulses at a fixed half-period, emitted on the calling thread.
pub struct StepEmitter<P, D> {
    pin: SharedPin<P>,
    half_period: Duration,
    delay: D,
}

impl<P: DigitalOutput, D: Delay> StepEmitter<P, D> {
    pub fn new(pin: SharedPin<P>, timing: &StepTiming, delay: D) -> Self {
        Self { pin, half_period: timing.half_period(), delay }
    }

    pub fn half_period(&self) -> Duration {
        self.half_period
    }

    /// One step: high for a half-period, then low for a half-period.
    pub fn pulse(&mut self) -> Result<(), MotorError> {
        self.pin.set_high()?;
        self.delay.delay(self.half_period);
        self.pin.set_low()?;
        self.delay.delay(self.half_period);
        Ok(())
    }

    pub fn emit(&mut self, steps: u64) -> Result<(), MotorError> {
        for _ in 0..steps {
            self.pulse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimBench, SimDelay, SimLine};
    use spin_sleep::SpinSleeper;

    #[test]
    fn test_emitter_counts_and_half_periods() {
        let bench = SimBench::new();
        bench.output(SimLine::Sleep).set_low().unwrap();
        let timing = StepTiming::new(50, 1.0).unwrap();
        let delay = SimDelay::new();
        let mut emitter = StepEmitter::new(SharedPin::new(bench.output(SimLine::Step)), &timing, delay.clone());

        emitter.emit(7).unwrap();

        let state = bench.snapshot();
        assert_eq!(state.forward_pulses, 7);
        assert!(!state.step_high);
        assert_eq!(delay.count(timing.half_period()), 14);
        assert_eq!(emitter.half_period(), Duration::from_millis(10));
    }

    #[test]
    fn test_soft_pulse_train_start_stop() {
        let bench = SimBench::new();
        bench.output(SimLine::Sleep).set_low().unwrap();
        let pin = SharedPin::new(bench.output(SimLine::Step));
        let mut train = SoftPulseTrain::new(pin.clone(), SpinSleeper::default());

        assert!(matches!(train.start(20.0), Err(MotorError::InvalidTiming(_))));
        train.configure(2_000.0).unwrap();
        train.start(20.0).unwrap();
        // Second start is a no-op.
        train.start(50.0).unwrap();
        assert!(train.is_running());

        std::thread::sleep(Duration::from_millis(50));
        train.stop().unwrap();

        assert!(!train.is_running());
        assert!(!pin.is_set_high());
        let pulses = bench.snapshot().forward_pulses;
        assert!(pulses > 0);

        // Stopping again changes nothing.
        train.stop().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(bench.snapshot().forward_pulses, pulses);
    }

    #[test]
    fn test_soft_pulse_train_rejects_bad_frequency() {
        let bench = SimBench::new();
        let mut train = SoftPulseTrain::new(SharedPin::new(bench.output(SimLine::Step)), SpinSleeper::default());
        assert!(train.configure(0.0).is_err());
        assert!(train.configure(f64::INFINITY).is_err());
        // Periods of zero or beyond what a Duration holds.
        assert!(train.configure(1e12).is_err());
        assert!(train.configure(1e-320).is_err());
        assert_eq!(train.frequency_hz(), 0.0);

        train.configure(1_000.0).unwrap();
        assert!(matches!(train.start(f64::NAN), Err(MotorError::InvalidTiming(_))));
        assert!(!train.is_running());
    }
}
