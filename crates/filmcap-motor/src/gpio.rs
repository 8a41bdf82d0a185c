use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GpioError;

/// Capability to set a digital output state (high/low)
pub trait DigitalOutput {
    fn set_high(&mut self) -> Result<(), GpioError>;
    fn set_low(&mut self) -> Result<(), GpioError>;
    fn is_set_high(&self) -> bool;

    /// Drive the line to `high` (true) or low (false).
    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        if high { self.set_high() } else { self.set_low() }
    }
}

/// Capability to read a digital input level
pub trait DigitalInput {
    fn is_high(&self) -> Result<bool, GpioError>;

    fn is_low(&self) -> Result<bool, GpioError> {
        Ok(!self.is_high()?)
    }
}

/// An output line reachable from more than one execution context.
///
/// The step line is driven by the continuous pulse train, by bounded winds on
/// the control context and by the frame-advance thread. The lock only makes
/// single edges atomic; keeping two contexts from stepping at once is up to
/// the caller.
pub struct SharedPin<P> {
    inner: Arc<Mutex<P>>,
}

impl<P> SharedPin<P> {
    pub fn new(pin: P) -> Self {
        Self { inner: Arc::new(Mutex::new(pin)) }
    }
}

impl<P: DigitalOutput> SharedPin<P> {
    pub fn set_high(&self) -> Result<(), GpioError> {
        self.inner.lock().set_high()
    }

    pub fn set_low(&self) -> Result<(), GpioError> {
        self.inner.lock().set_low()
    }

    pub fn is_set_high(&self) -> bool {
        self.inner.lock().is_set_high()
    }
}

// Manual impl: cloning the handle must not require `P: Clone`.
impl<P> Clone for SharedPin<P> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}
