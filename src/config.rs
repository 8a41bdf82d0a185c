use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use filmcap_motor::{CushionPercent, HomingCenterer, MotorError, SettleDelays, Speed, StepTiming, TriggerPolarity};
use serde::Deserialize;
use tracing::{error, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub motor: MotorSettings,
    pub trigger: TriggerSettings,
    pub homing: HomingSettings,
    pub delays: DelaySettings,
    pub session: SessionSettings,
    pub smart_motor: SmartMotorSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    pub direction_pin: u8,
    pub step_pin: u8,
    pub sleep_pin: u8,
    pub steps_per_rev: u32,
    pub rev_per_sec: f64,
    pub speed: u8,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self { direction_pin: 18, step_pin: 17, sleep_pin: 23, steps_per_rev: 4200, rev_per_sec: 1.0, speed: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    pub pin: u8,
    pub polarity: TriggerPolarity,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self { pin: 24, polarity: TriggerPolarity::default() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomingSettings {
    pub cushion_percent: u8,
    pub max_seek_steps: Option<u64>,
}

impl Default for HomingSettings {
    fn default() -> Self {
        Self { cushion_percent: 50, max_seek_steps: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub power_ms: u64,
    pub pre_run_ms: u64,
    pub debounce_ms: u64,
    pub backlash_ms: u64,
    pub pre_cushion_ms: u64,
    pub capture_wait_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            power_ms: 100,
            pre_run_ms: 500,
            debounce_ms: 200,
            backlash_ms: 250,
            pre_cushion_ms: 10,
            capture_wait_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub frames: u32,
    pub exposure_ms: u64,
    pub advance_timeout_ms: u64,
    pub calibrate_on_start: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { frames: 10, exposure_ms: 300, advance_timeout_ms: 5000, calibrate_on_start: true }
    }
}

/// Adaptive frame timing switches. Read and reported, never acted on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmartMotorSettings {
    pub enabled: bool,
    pub headroom: u8,
}

impl Default for SmartMotorSettings {
    fn default() -> Self {
        Self { enabled: false, headroom: 25 }
    }
}

impl Settings {
    pub fn timing(&self) -> Result<StepTiming, MotorError> {
        StepTiming::new(self.motor.steps_per_rev, self.motor.rev_per_sec)
    }

    pub fn cushion(&self) -> Result<CushionPercent, MotorError> {
        CushionPercent::new(self.homing.cushion_percent)
    }

    pub fn speed(&self) -> Speed {
        Speed(self.motor.speed)
    }

    pub fn centerer(&self) -> HomingCenterer {
        match self.homing.max_seek_steps {
            Some(limit) => HomingCenterer::with_step_limit(limit),
            None => HomingCenterer::new(),
        }
    }

    pub fn settle_delays(&self) -> SettleDelays {
        let d = &self.delays;
        SettleDelays {
            power: Duration::from_millis(d.power_ms),
            pre_run: Duration::from_millis(d.pre_run_ms),
            debounce: Duration::from_millis(d.debounce_ms),
            backlash: Duration::from_millis(d.backlash_ms),
            pre_cushion: Duration::from_millis(d.pre_cushion_ms),
            capture_wait: Duration::from_millis(d.capture_wait_ms),
        }
    }

    pub fn exposure(&self) -> Duration {
        Duration::from_millis(self.session.exposure_ms)
    }

    pub fn advance_timeout(&self) -> Duration {
        Duration::from_millis(self.session.advance_timeout_ms)
    }

    pub fn warn_unused(&self) {
        if self.smart_motor.enabled {
            warn!(
                headroom = self.smart_motor.headroom,
                "smart_motor is enabled but adaptive timing is not implemented; ignoring"
            );
        }
    }
}

pub fn load_config(path: &str) -> Result<Settings, ConfigError> {
    info!("Attempting to load configuration from {}", path);

    let settings = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix("FILMCAP").separator("__").try_parsing(true))
        .build()
        .and_then(|config| config.try_deserialize::<Settings>());

    match settings {
        Ok(settings) => {
            info!("Successfully loaded configuration: {:?}", settings);
            Ok(settings)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TOML: &str = include_str!("../config/default.toml");

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let settings = parse(DEFAULT_TOML);
        assert_eq!(settings.timing().unwrap(), StepTiming::default());
        assert_eq!(settings.cushion().unwrap(), CushionPercent::default());
        assert_eq!(settings.settle_delays(), SettleDelays::default());
        assert_eq!(settings.trigger.polarity, TriggerPolarity::ActiveHigh);
        assert_eq!(settings.centerer().max_seek_steps(), None);
        assert_eq!(settings.speed(), Speed::default());
        assert!(!settings.smart_motor.enabled);
        assert_eq!(settings.smart_motor.headroom, 25);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let settings = parse(
            r#"
            [trigger]
            polarity = "active_low"

            [homing]
            cushion_percent = 30
            max_seek_steps = 9000
            "#,
        );
        assert_eq!(settings.trigger.polarity, TriggerPolarity::ActiveLow);
        assert_eq!(settings.trigger.pin, 24);
        assert_eq!(settings.cushion().unwrap().value(), 30);
        assert_eq!(settings.centerer().max_seek_steps(), Some(9000));
        assert_eq!(settings.motor.steps_per_rev, 4200);
    }

    #[test]
    fn test_invalid_values_rejected_by_constructors() {
        let settings = parse(
            r#"
            [motor]
            steps_per_rev = 0

            [homing]
            cushion_percent = 120
            "#,
        );
        assert!(matches!(settings.timing(), Err(MotorError::InvalidTiming(_))));
        assert!(matches!(settings.cushion(), Err(MotorError::InvalidCushion(120))));
    }
}
