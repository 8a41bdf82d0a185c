use std::time::Duration;

use filmcap_motor::{
    CaptureAdvanceSynchronizer, CaptureSignals, Delay, DigitalInput, DigitalOutput, MotorError, PulseTrain,
    StepTiming,
};
use tracing::{debug, info, warn};

use crate::transport::FilmTransport;

/// Pacing of the capture loop standing in for the camera.
#[derive(Debug, Clone, Copy)]
pub struct CapturePlan {
    pub frames: u32,
    pub exposure: Duration,
    /// How long to wait for the frame-advance acknowledgment.
    pub advance_timeout: Duration,
    /// Upper bound of each frame-advance wait on the capture flag.
    pub capture_wait: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_captured: u32,
    pub frames_advanced: u64,
    pub missed_advances: u32,
}

/// Run one capture session.
///
/// The driver is woken for the session and put back to sleep afterwards.
/// A frame-advance thread winds one frame per captured photo while this
/// thread plays the capture side of the handshake. Setting `signals.exit`
/// from anywhere ends the session after the current frame.
pub fn run_session<O, T, D, I, A>(
    transport: &mut FilmTransport<O, T, D, I>,
    timing: &StepTiming,
    advance_delay: A,
    signals: &CaptureSignals,
    plan: &CapturePlan,
) -> Result<SessionReport, MotorError>
where
    O: DigitalOutput + Send + 'static,
    T: PulseTrain,
    D: Delay + Clone,
    I: DigitalInput,
    A: Delay + Send + 'static,
{
    info!(frames = plan.frames, "Starting capture session");
    transport.wake()?;

    let advancer = CaptureAdvanceSynchronizer::new(
        transport.step_pin(),
        timing,
        advance_delay,
        signals.clone(),
        plan.capture_wait,
    )
    .spawn()?;

    let mut report = SessionReport::default();
    for frame in 0..plan.frames {
        if signals.exit_requested() {
            info!(frame, "Exit requested, ending capture session");
            break;
        }
        transport.mark_trigger();
        // Exposure; an exit request cuts it short.
        if signals.exit.wait_timeout(plan.exposure) {
            break;
        }
        transport.end_photo();
        report.frames_captured += 1;

        signals.request_advance();
        if signals.wait_frame_advanced(plan.advance_timeout) {
            debug!(frame, "Frame advanced");
        } else {
            warn!(frame, timeout = ?plan.advance_timeout, "Frame advance not acknowledged");
            report.missed_advances += 1;
        }
    }

    signals.request_exit();
    let advanced = match advancer.join() {
        Ok(result) => result,
        Err(_) => {
            warn!("Frame advance thread panicked");
            Ok(0)
        }
    };
    transport.sleep()?;
    report.frames_advanced = advanced?;

    info!(?report, photos = ?transport.stats().photos().collect::<Vec<_>>(), "Capture session finished");
    Ok(report)
}
