use std::time::{Duration, Instant};

use filmcap_motor::{
    AxisState, CenterReport, CushionPercent, Delay, DigitalInput, DigitalOutput, Direction, HomingCenterer,
    MotorAxis, MotorError, PulseTrain, SharedPin, Signal, Speed, TimingStatsBuffer, TriggerSensor,
};
use tracing::{debug, info};

/// Film transport as the control context sees it: continuous runs that
/// re-register the frame when they stop, calibration, and trigger/photo
/// timing bookkeeping.
pub struct FilmTransport<O: DigitalOutput, T: PulseTrain, D: Delay + Clone, I> {
    axis: MotorAxis<O, T, D>,
    sensor: TriggerSensor<I>,
    centerer: HomingCenterer,
    cushion: CushionPercent,
    speed: Speed,
    /// Direction of the current continuous run, if any.
    motion: Option<Direction>,
    stats: TimingStatsBuffer,
    trigger_time: Option<Instant>,
}

impl<O, T, D, I> FilmTransport<O, T, D, I>
where
    O: DigitalOutput,
    T: PulseTrain,
    D: Delay + Clone,
    I: DigitalInput,
{
    pub fn new(
        axis: MotorAxis<O, T, D>,
        sensor: TriggerSensor<I>,
        centerer: HomingCenterer,
        cushion: CushionPercent,
        speed: Speed,
    ) -> Self {
        info!(cushion = cushion.value(), polarity = ?sensor.polarity(), "Film transport ready");
        Self {
            axis,
            sensor,
            centerer,
            cushion,
            speed,
            motion: None,
            stats: TimingStatsBuffer::new(),
            trigger_time: None,
        }
    }

    pub fn state(&self) -> AxisState {
        self.axis.state()
    }

    pub fn stats(&self) -> &TimingStatsBuffer {
        &self.stats
    }

    pub fn step_pin(&self) -> SharedPin<O> {
        self.axis.step_pin()
    }

    pub fn wake(&mut self) -> Result<(), MotorError> {
        self.axis.wake()
    }

    pub fn sleep(&mut self) -> Result<(), MotorError> {
        self.axis.sleep()
    }

    pub fn motor_fwd(&mut self, speed: Option<Speed>) -> Result<(), MotorError> {
        self.axis.fwd(speed.unwrap_or(self.speed))?;
        self.motion = Some(Direction::Forward);
        Ok(())
    }

    pub fn motor_rev(&mut self, speed: Option<Speed>) -> Result<(), MotorError> {
        self.axis.rev(speed.unwrap_or(self.speed))?;
        self.motion = Some(Direction::Reverse);
        Ok(())
    }

    /// Stop, re-center the frame if the transport was running, then sleep.
    ///
    /// The driver is put to sleep even when centering fails.
    pub fn motor_stop(&mut self) -> Result<Option<CenterReport>, MotorError> {
        self.axis.stop()?;
        self.stats.clear();
        self.trigger_time = None;

        let centered = match self.motion.take() {
            Some(arrived_from) => self
                .centerer
                .center(&mut self.axis, &self.sensor, self.cushion, arrived_from)
                .map(Some),
            None => Ok(None),
        };
        self.axis.sleep()?;
        centered
    }

    /// Run continuously in `direction` for `duration`, or until `interrupt`
    /// is set, then stop and re-center.
    pub fn jog(
        &mut self,
        direction: Direction,
        speed: Option<Speed>,
        duration: Duration,
        interrupt: &Signal,
    ) -> Result<Option<CenterReport>, MotorError> {
        match direction {
            Direction::Forward => self.motor_fwd(speed)?,
            Direction::Reverse => self.motor_rev(speed)?,
        }
        if interrupt.wait_timeout(duration) {
            info!(?direction, "Run interrupted");
        }
        self.motor_stop()
    }

    /// Wind whole frames forward.
    pub fn wind_frames(&mut self, frames: u32) -> Result<(), MotorError> {
        info!(frames, "Winding");
        self.axis.set_direction(Direction::Forward)?;
        self.axis.wind_frame(frames)
    }

    /// Wind whole frames backwards with backlash compensation.
    pub fn rewind_frames(&mut self, frames: u32) -> Result<(), MotorError> {
        info!(frames, "Rewinding");
        self.axis.rev_frame(frames)
    }

    /// Center the current frame as if arriving forward, then sleep.
    pub fn calibrate(&mut self) -> Result<CenterReport, MotorError> {
        info!("Calibrating frame position");
        let centered = self.centerer.center(&mut self.axis, &self.sensor, self.cushion, Direction::Forward);
        self.axis.sleep()?;
        let report = centered?;
        debug!(?report, "Calibration done");
        Ok(report)
    }

    /// Note a trigger event; the gap since the previous one is recorded.
    pub fn mark_trigger(&mut self) {
        let now = Instant::now();
        if let Some(previous) = self.trigger_time.replace(now) {
            self.stats.record_trigger(now - previous);
        }
    }

    /// Note a finished photo; the latency since the last trigger is recorded.
    pub fn end_photo(&mut self) {
        if let Some(trigger_time) = self.trigger_time {
            self.stats.record_photo(trigger_time.elapsed());
        }
    }

    pub fn cleanup(&mut self) -> Result<(), MotorError> {
        info!("Cleaning up GPIO");
        self.motion = None;
        self.axis.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use filmcap_motor::hal::sim::{SimBench, SimDelay, SimInput, SimLine, SimOutput, SimPulseTrain, StepRun, TriggerWindow};
    use filmcap_motor::{AxisPins, MotionState, PowerState, SettleDelays, StepTiming, TriggerPolarity};

    const SPR: u32 = 40;

    type SimTransport = FilmTransport<SimOutput, SimPulseTrain, SimDelay, SimInput>;

    fn sim_transport(bench: &SimBench, window: TriggerWindow) -> (SimTransport, SimPulseTrain) {
        sim_transport_with(bench, window, HomingCenterer::new())
    }

    fn sim_transport_with(
        bench: &SimBench,
        window: TriggerWindow,
        centerer: HomingCenterer,
    ) -> (SimTransport, SimPulseTrain) {
        let pulses = SimPulseTrain::new();
        let pins = AxisPins {
            direction: bench.output(SimLine::Direction),
            sleep: bench.output(SimLine::Sleep),
            step: SharedPin::new(bench.output(SimLine::Step)),
        };
        let timing = StepTiming::new(SPR, 1.0).unwrap();
        let axis = MotorAxis::new(pins, pulses.clone(), timing, SettleDelays::default(), SimDelay::new()).unwrap();
        let sensor = TriggerSensor::new(bench.trigger(window, TriggerPolarity::ActiveHigh), TriggerPolarity::ActiveHigh);
        let transport = FilmTransport::new(axis, sensor, centerer, CushionPercent::default(), Speed::default());
        (transport, pulses)
    }

    #[test]
    fn test_stop_after_forward_run_recenters() {
        let bench = SimBench::new();
        let (mut transport, pulses) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        transport.motor_fwd(None).unwrap();
        assert!(pulses.is_running());
        let report = transport.motor_stop().unwrap().unwrap();

        assert!(!pulses.is_running());
        assert_eq!(report.engage_steps, 10);
        assert_eq!(report.edge_steps, 10);
        assert_eq!(report.backlash_frames, 0);
        assert_eq!(report.cushion_steps, 20);
        let state = transport.state();
        assert_eq!(state.motion, MotionState::Idle);
        assert_eq!(state.power, PowerState::Asleep);
        assert!(bench.snapshot().is_asleep());
    }

    #[test]
    fn test_stop_after_reverse_run_winds_extra_frame() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        transport.motor_rev(Some(Speed(50))).unwrap();
        let report = transport.motor_stop().unwrap().unwrap();

        assert_eq!(report.backlash_frames, 1);
        let state = bench.snapshot();
        assert_eq!(state.runs, vec![StepRun { direction: Direction::Forward, pulses: 20 + SPR as u64 + 20 }]);
    }

    #[test]
    fn test_stop_while_idle_does_not_center() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        assert_eq!(transport.motor_stop().unwrap(), None);
        assert_eq!(bench.snapshot().forward_pulses, 0);
        assert!(bench.snapshot().is_asleep());
    }

    #[test]
    fn test_calibrate_sleeps_driver() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        let report = transport.calibrate().unwrap();

        assert_eq!(report.backlash_frames, 0);
        let state = bench.snapshot();
        assert_eq!(state.position, 40);
        assert_eq!(state.pulses_while_asleep, 0);
        assert!(state.is_asleep());
    }

    #[test]
    fn test_photo_and_trigger_stats() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        transport.end_photo();
        assert!(transport.stats().is_empty());

        transport.mark_trigger();
        transport.end_photo();
        transport.mark_trigger();
        assert_eq!(transport.stats().photos().count(), 1);
        assert_eq!(transport.stats().triggers().count(), 1);

        transport.motor_stop().unwrap();
        assert!(transport.stats().is_empty());
    }

    #[test]
    fn test_cleanup_parks_driver() {
        let bench = SimBench::new();
        let (mut transport, pulses) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        transport.motor_fwd(None).unwrap();
        transport.cleanup().unwrap();

        assert!(!pulses.is_running());
        assert!(bench.snapshot().is_asleep());
        assert!(!bench.snapshot().direction_high);
    }

    #[test]
    fn test_jog_runs_until_interrupted_then_recenters() {
        let bench = SimBench::new();
        let (mut transport, pulses) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));
        let interrupt = Arc::new(Signal::new());
        let setter = Arc::clone(&interrupt);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        let started = Instant::now();
        let report = transport
            .jog(Direction::Reverse, None, Duration::from_secs(30), &interrupt)
            .unwrap()
            .unwrap();
        handle.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(pulses.log().starts, 1);
        assert!(!pulses.is_running());
        assert_eq!(report.backlash_frames, 1);
        assert_eq!(transport.state().motion, MotionState::Idle);
        assert!(bench.snapshot().is_asleep());
    }

    #[test]
    fn test_jog_for_a_duration() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        let report = transport
            .jog(Direction::Forward, Some(Speed(30)), Duration::from_millis(5), &Signal::new())
            .unwrap()
            .unwrap();

        assert_eq!(report.backlash_frames, 0);
        assert_eq!(bench.snapshot().runs, vec![StepRun { direction: Direction::Forward, pulses: 40 }]);
    }

    #[test]
    fn test_wind_and_rewind_frames() {
        let bench = SimBench::new();
        let (mut transport, _) = sim_transport(&bench, TriggerWindow::new(SPR as u64, 10, 20));

        transport.wind_frames(2).unwrap();
        assert_eq!(bench.snapshot().position, 2 * SPR as i64);

        transport.rewind_frames(2).unwrap();
        let state = bench.snapshot();
        assert_eq!(state.position, 0);
        assert_eq!(state.reverse_pulses, 3 * SPR as u64);
        assert!(state.is_asleep());
        assert_eq!(transport.state().direction, Direction::Forward);
    }

    #[test]
    fn test_interrupted_calibration_still_sleeps() {
        let bench = SimBench::new();
        let abort = Arc::new(Signal::new());
        abort.set();
        let centerer = HomingCenterer::new().with_abort(abort);
        // Trigger never engages.
        let (mut transport, _) = sim_transport_with(&bench, TriggerWindow::new(SPR as u64, 0, 0), centerer);

        let result = transport.calibrate();

        assert!(matches!(result, Err(MotorError::Interrupted { steps: 0, .. })));
        assert_eq!(transport.state().power, PowerState::Asleep);
        assert!(bench.snapshot().is_asleep());
    }
}
