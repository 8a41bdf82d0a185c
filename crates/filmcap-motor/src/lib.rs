#![doc = "Motor control core of a frame-by-frame film capture rig."]
#![doc = ""]
#![doc = "The crate drives a stepper film transport through a step/direction/sleep"]
#![doc = "driver: continuous runs, bounded frame winds, sensor-guided frame centering,"]
#![doc = "and a frame-advance thread that answers capture-completion requests."]

pub mod axis;
pub mod error;
pub mod gpio;
pub mod hal;
pub mod homing;
pub mod pulse;
pub mod stats;
pub mod sync;
pub mod timing;

pub use axis::{AxisPins, AxisState, Direction, MotionState, MotorAxis, PowerState, Speed};
pub use error::{GpioError, MotorError, SeekPhase};
pub use gpio::{DigitalInput, DigitalOutput, SharedPin};
pub use homing::{CenterReport, CushionPercent, HomingCenterer, TriggerPolarity, TriggerSensor};
pub use pulse::{PulseTrain, SoftPulseTrain, StepEmitter};
pub use stats::TimingStatsBuffer;
pub use sync::{CaptureAdvanceSynchronizer, CaptureSignals, Signal};
pub use timing::{Delay, SettleDelays, StepTiming};
