//! Raspberry Pi GPIO backend (BCM numbering) built on `rppal`.

use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::info;

use crate::error::GpioError;
use crate::gpio::{DigitalInput, DigitalOutput};
use crate::hal::Board;
use crate::homing::TriggerPolarity;

/// BCM pin numbers of the film transport lines.
#[derive(Debug, Clone, Copy)]
pub struct PinMap {
    pub direction: u8,
    pub step: u8,
    pub sleep: u8,
    pub trigger: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self { direction: 18, step: 17, sleep: 23, trigger: 24 }
    }
}

pub struct RpiOutput {
    pin: OutputPin,
}

impl DigitalOutput for RpiOutput {
    fn set_high(&mut self) -> Result<(), GpioError> {
        self.pin.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), GpioError> {
        self.pin.set_low();
        Ok(())
    }

    fn is_set_high(&self) -> bool {
        self.pin.is_set_high()
    }
}

pub struct RpiInput {
    pin: InputPin,
}

impl DigitalInput for RpiInput {
    fn is_high(&self) -> Result<bool, GpioError> {
        Ok(self.pin.is_high())
    }
}

/// Claim all lines. Any failure here is fatal: nothing has moved yet.
///
/// Outputs start with direction forward (low), step low and the driver asleep
/// (sleep line high). The trigger input gets a pull-up when it is active-low
/// and a pull-down when it is active-high.
pub fn claim(pins: &PinMap, polarity: TriggerPolarity) -> Result<Board<RpiOutput, RpiInput>, GpioError> {
    let gpio = Gpio::new().map_err(|e| GpioError::Setup { pin: pins.step, reason: e.to_string() })?;
    let get = |pin: u8| {
        gpio.get(pin).map_err(|e| GpioError::Setup { pin, reason: e.to_string() })
    };

    let direction = get(pins.direction)?.into_output_low();
    let step = get(pins.step)?.into_output_low();
    let mut sleep = get(pins.sleep)?.into_output_high();
    // Leave the driver asleep after the process exits.
    sleep.set_reset_on_drop(false);

    let trigger = match polarity {
        TriggerPolarity::ActiveLow => get(pins.trigger)?.into_input_pullup(),
        TriggerPolarity::ActiveHigh => get(pins.trigger)?.into_input_pulldown(),
    };

    info!(?pins, ?polarity, "Claimed GPIO lines");
    Ok(Board {
        direction: RpiOutput { pin: direction },
        step: RpiOutput { pin: step },
        sleep: RpiOutput { pin: sleep },
        trigger: RpiInput { pin: trigger },
    })
}
