//! Hardware backends for the three driver lines and the trigger sensor.

pub mod sim;

#[cfg(feature = "rpi")]
pub mod rpi;

/// The set of lines one film transport uses.
pub struct Board<O, I> {
    pub direction: O,
    pub step: O,
    pub sleep: O,
    pub trigger: I,
}
