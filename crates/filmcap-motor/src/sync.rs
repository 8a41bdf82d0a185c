//! Frame advance driven by capture completion.
//!
//! The capture side and the frame-advance thread share two flags. The capture
//! side sets `capture` when a photo is done; the advance thread winds one
//! frame and clears `capture` afterwards, which is the "frame advanced"
//! acknowledgment. `exit` is set once to end the session.
//!
//! If the capture side sets `capture` again before the previous clear lands,
//! that advance is lost. Captures are paced slower than a frame advance, so
//! this race is accepted rather than closed with extra locking that would
//! shift the timing.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::error::MotorError;
use crate::gpio::{DigitalOutput, SharedPin};
use crate::pulse::StepEmitter;
use crate::timing::{Delay, StepTiming};

/// A boolean flag visible across threads, with timed waits on either edge.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    changed: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.flag.lock() = true;
        self.changed.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.lock() = false;
        self.changed.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Block until set or `timeout` elapses. Returns whether it is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if !*flag {
            self.changed.wait_while_for(&mut flag, |set| !*set, timeout);
        }
        *flag
    }

    /// Block until cleared or `timeout` elapses. Returns whether it is clear.
    pub fn wait_cleared_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if *flag {
            self.changed.wait_while_for(&mut flag, |set| *set, timeout);
        }
        !*flag
    }
}

/// The capture/exit handshake shared with the capture collaborator.
#[derive(Debug, Clone, Default)]
pub struct CaptureSignals {
    pub capture: Arc<Signal>,
    pub exit: Arc<Signal>,
}

impl CaptureSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Photo done: ask for the next frame.
    pub fn request_advance(&self) {
        self.capture.set();
    }

    /// Wait for the advance thread to acknowledge the last request.
    pub fn wait_frame_advanced(&self, timeout: Duration) -> bool {
        self.capture.wait_cleared_timeout(timeout)
    }

    pub fn request_exit(&self) {
        self.exit.set();
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.is_set()
    }
}

/// Winds exactly one frame per capture request, on its own thread.
///
/// It pulses the step line directly at the nominal half-period. Waking the
/// driver and setting the direction are left to whoever opens the capture
/// session, so an advance never pays for a power transition.
pub struct CaptureAdvanceSynchronizer<P, D> {
    emitter: StepEmitter<P, D>,
    steps_per_frame: u64,
    signals: CaptureSignals,
    wait: Duration,
}

impl<P: DigitalOutput, D: Delay> CaptureAdvanceSynchronizer<P, D> {
    /// `wait` bounds each wait on the capture flag, which is how quickly an
    /// exit request is noticed.
    pub fn new(step_pin: SharedPin<P>, timing: &StepTiming, delay: D, signals: CaptureSignals, wait: Duration) -> Self {
        Self {
            emitter: StepEmitter::new(step_pin, timing, delay),
            steps_per_frame: timing.frame_steps(1),
            signals,
            wait,
        }
    }

    /// Serve capture requests until exit is requested. Returns the number of
    /// frames advanced.
    pub fn run(mut self) -> Result<u64, MotorError> {
        info!("Motor Frame Advance Process running");
        let mut advances = 0u64;
        let result = loop {
            if self.signals.exit.is_set() {
                break Ok(advances);
            }
            // A timeout just means nothing to do yet.
            if !self.signals.capture.wait_timeout(self.wait) {
                continue;
            }
            debug!("Advancing one frame");
            if let Err(e) = self.emitter.emit(self.steps_per_frame) {
                break Err(e);
            }
            self.signals.capture.clear();
            advances += 1;
        };
        info!(advances, "Motor Frame Advance Process ending");
        result
    }
}

impl<P, D> CaptureAdvanceSynchronizer<P, D>
where
    P: DigitalOutput + Send + 'static,
    D: Delay + Send + 'static,
{
    /// Start [`run`](Self::run) on a dedicated "frame-advance" thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<u64, MotorError>>, MotorError> {
        std::thread::Builder::new()
            .name("frame-advance".into())
            .spawn(move || {
                let result = self.run();
                if let Err(e) = &result {
                    error!("Frame advance failed: {}", e);
                }
                result
            })
            .map_err(|source| MotorError::Spawn { name: "frame-advance", source })
    }
}
