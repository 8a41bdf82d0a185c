mod board;
mod cli;
mod config;
mod session;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use filmcap_motor::hal::Board;
use filmcap_motor::{
    AxisPins, CaptureSignals, Delay, DigitalInput, DigitalOutput, Direction, MotorAxis, PulseTrain, SharedPin,
    SoftPulseTrain, Speed, TriggerSensor,
};
use spin_sleep::SpinSleeper;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};
use crate::config::Settings;
use crate::session::{CapturePlan, run_session};
use crate::transport::FilmTransport;

/// Exit status after a second interrupt, as for a shell-killed process.
const FORCED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let path = args.config.to_string_lossy().into_owned();
    let settings = crate::config::load_config(&path).with_context(|| format!("loading configuration from {path}"))?;
    settings.warn_unused();

    let board = board::open_board(&settings)?;
    info!(command = ?args.command(), "Film capture started");

    let signals = CaptureSignals::new();
    tokio::spawn(watch_interrupts(signals.clone()));

    let command = args.command();
    tokio::task::spawn_blocking(move || operate(board, settings, signals, command))
        .await
        .context("transport thread panicked")??;

    info!("Film capture finished");
    Ok(())
}

/// The first Ctrl-C asks the transport to wind down; the second ends the
/// process on the spot.
async fn watch_interrupts(signals: CaptureSignals) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for interrupt: {}", e);
        return;
    }
    warn!("Interrupt received, stopping; press Ctrl-C again to exit immediately");
    signals.request_exit();

    if tokio::signal::ctrl_c().await.is_ok() {
        error!("Second interrupt, exiting without parking the motor");
        std::process::exit(FORCED_EXIT_CODE);
    }
}

/// Run one command against the transport on the current thread.
fn operate<O, I>(board: Board<O, I>, settings: Settings, signals: CaptureSignals, command: Command) -> anyhow::Result<()>
where
    O: DigitalOutput + Send + 'static,
    I: DigitalInput,
{
    let timing = settings.timing().context("invalid motor timing")?;
    let delays = settings.settle_delays();
    let step = SharedPin::new(board.step);
    let pins = AxisPins { direction: board.direction, sleep: board.sleep, step: step.clone() };
    let pulses = SoftPulseTrain::new(step, SpinSleeper::default());
    let axis = MotorAxis::new(pins, pulses, timing, delays, SpinSleeper::default())?;
    let sensor = TriggerSensor::new(board.trigger, settings.trigger.polarity);
    let cushion = settings.cushion().context("invalid homing cushion")?;
    let centerer = settings.centerer().with_abort(Arc::clone(&signals.exit));
    let mut transport = FilmTransport::new(axis, sensor, centerer, cushion, settings.speed());

    let outcome = match command {
        Command::Capture => capture(&mut transport, &settings, &signals),
        Command::Calibrate => transport.calibrate().map(|report| info!(?report, "Frame centered")).map_err(Into::into),
        Command::Wind { frames } => transport.wind_frames(frames).map_err(Into::into),
        Command::Rewind { frames } => transport.rewind_frames(frames).map_err(Into::into),
        Command::Run { reverse, seconds, speed } => {
            let direction = if reverse { Direction::Reverse } else { Direction::Forward };
            Duration::try_from_secs_f64(seconds)
                .context("run duration must be a non-negative number of seconds")
                .and_then(|duration| {
                    let report = transport.jog(direction, speed.map(Speed), duration, &signals.exit)?;
                    info!(?report, "Run finished");
                    Ok(())
                })
        }
    };
    transport.cleanup()?;
    info!(state = ?transport.state(), "Transport parked");
    outcome
}

fn capture<O, T, D, I>(
    transport: &mut FilmTransport<O, T, D, I>,
    settings: &Settings,
    signals: &CaptureSignals,
) -> anyhow::Result<()>
where
    O: DigitalOutput + Send + 'static,
    T: PulseTrain,
    D: Delay + Clone,
    I: DigitalInput,
{
    if settings.session.calibrate_on_start {
        transport.calibrate().context("calibration failed")?;
    }

    let timing = settings.timing().context("invalid motor timing")?;
    let plan = CapturePlan {
        frames: settings.session.frames,
        exposure: settings.exposure(),
        advance_timeout: settings.advance_timeout(),
        capture_wait: settings.settle_delays().capture_wait,
    };
    let report = run_session(transport, &timing, SpinSleeper::default(), signals, &plan)
        .context("capture session failed")?;
    info!(
        captured = report.frames_captured,
        advanced = report.frames_advanced,
        missed = report.missed_advances,
        "Session summary"
    );
    Ok(())
}
