use filmcap_motor::hal::Board;

use crate::config::Settings;

#[cfg(feature = "rpi")]
use anyhow::Context;
#[cfg(feature = "rpi")]
use filmcap_motor::hal::rpi::{self, PinMap, RpiInput, RpiOutput};

#[cfg(not(feature = "rpi"))]
use filmcap_motor::hal::sim::{SimBench, SimInput, SimOutput, TriggerWindow};
#[cfg(not(feature = "rpi"))]
use tracing::info;

/// Claim the Raspberry Pi GPIO lines named in the settings.
#[cfg(feature = "rpi")]
pub fn open_board(settings: &Settings) -> anyhow::Result<Board<RpiOutput, RpiInput>> {
    let pins = PinMap {
        direction: settings.motor.direction_pin,
        step: settings.motor.step_pin,
        sleep: settings.motor.sleep_pin,
        trigger: settings.trigger.pin,
    };
    let board = rpi::claim(&pins, settings.trigger.polarity).context("claiming GPIO lines")?;
    Ok(board)
}

/// Build a simulated bench whose trigger engages from a third to half of
/// every frame pitch.
#[cfg(not(feature = "rpi"))]
pub fn open_board(settings: &Settings) -> anyhow::Result<Board<SimOutput, SimInput>> {
    let window = sim_window(settings.motor.steps_per_rev as u64)?;
    info!(?window, "Using simulated transport bench");
    Ok(SimBench::new().board(window, settings.trigger.polarity))
}

/// The window is at least one step wide and never covers the whole pitch.
#[cfg(not(feature = "rpi"))]
fn sim_window(pitch: u64) -> anyhow::Result<TriggerWindow> {
    if pitch < 2 {
        anyhow::bail!("simulated bench needs at least 2 steps per frame, got {pitch}");
    }
    let start = pitch / 3;
    let end = (pitch / 2).max(start + 1);
    Ok(TriggerWindow::new(pitch, start, end))
}
