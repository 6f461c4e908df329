//! [`ControlLoopConfig`] – typed, validated settings for one kettle session.

use std::fmt;
use std::time::Duration;

use kettle_hal::PidParameters;
use kettle_types::{KettleError, TempUnit};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_KP: f64 = 117.0795;
pub const DEFAULT_KI: f64 = 0.2747;
pub const DEFAULT_KD: f64 = 41.58;
pub const DEFAULT_MAX_BOIL_OUTPUT: f64 = 85.0;

/// Boil threshold default for the given unit (98 °C / 208 °F).
pub fn default_boil_temp(unit: TempUnit) -> f64 {
    match unit {
        TempUnit::Celsius => 98.0,
        TempUnit::Fahrenheit => 208.0,
    }
}

/// PID cutoff default for the given unit (88 °C / 190 °F).
pub fn default_pid_temp(unit: TempUnit) -> f64 {
    match unit {
        TempUnit::Celsius => 88.0,
        TempUnit::Fahrenheit => 190.0,
    }
}

/// Interval between control-loop iterations.  Only 2 s and 5 s are offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum SampleTime {
    Two,
    #[default]
    Five,
}

impl SampleTime {
    pub fn as_secs(self) -> u64 {
        match self {
            SampleTime::Two => 2,
            SampleTime::Five => 5,
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl TryFrom<u64> for SampleTime {
    type Error = String;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            2 => Ok(SampleTime::Two),
            5 => Ok(SampleTime::Five),
            other => Err(format!("sample time must be 2 or 5 seconds, got {other}")),
        }
    }
}

impl From<SampleTime> for u64 {
    fn from(sample_time: SampleTime) -> Self {
        sample_time.as_secs()
    }
}

impl fmt::Display for SampleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

/// Settings of one control session, immutable while it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLoopConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub sample_time: SampleTime,
    /// Power used once the temperature reaches `max_boil_temp`.
    pub max_boil_output: f64,
    /// At or above this temperature the boil power replaces the PID output.
    pub max_boil_temp: f64,
    /// At or above this temperature (and below `max_boil_temp`) the heater
    /// runs at `output_max`.
    pub max_pid_temp: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl ControlLoopConfig {
    /// Defaults with thresholds chosen for `unit`.
    pub fn for_unit(unit: TempUnit) -> Self {
        Self {
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
            sample_time: SampleTime::default(),
            max_boil_output: DEFAULT_MAX_BOIL_OUTPUT,
            max_boil_temp: default_boil_temp(unit),
            max_pid_temp: default_pid_temp(unit),
            output_min: 0.0,
            output_max: 100.0,
        }
    }

    /// Engine parameters derived from this config.
    ///
    /// # Errors
    ///
    /// [`KettleError::InvalidConfiguration`] for undefined gains or inverted
    /// output limits.
    pub fn pid_parameters(&self) -> Result<PidParameters, KettleError> {
        PidParameters::new(self.kp, self.ki, self.kd, self.sample_time.as_secs() as f64)?
            .with_output_limits(self.output_min, self.output_max)
    }

    /// Check every invariant a session relies on.
    ///
    /// # Errors
    ///
    /// [`KettleError::InvalidConfiguration`] describing the first violation.
    pub fn validate(&self) -> Result<(), KettleError> {
        self.pid_parameters()?;

        for (name, value) in [
            ("max_boil_temp", self.max_boil_temp),
            ("max_pid_temp", self.max_pid_temp),
        ] {
            if !value.is_finite() {
                return Err(KettleError::InvalidConfiguration(format!(
                    "{name} must be a finite temperature, got {value}"
                )));
            }
        }

        if !(self.output_min..=self.output_max).contains(&self.max_boil_output) {
            return Err(KettleError::InvalidConfiguration(format!(
                "max_boil_output {} must lie within [{}, {}]",
                self.max_boil_output, self.output_min, self.output_max
            )));
        }

        if self.max_pid_temp > self.max_boil_temp {
            warn!(
                max_pid_temp = self.max_pid_temp,
                max_boil_temp = self.max_boil_temp,
                "PID cutoff is above the boil threshold; the full-power band is empty"
            );
        }
        Ok(())
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self::for_unit(TempUnit::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_unit() {
        let c = ControlLoopConfig::for_unit(TempUnit::Celsius);
        assert_eq!((c.max_boil_temp, c.max_pid_temp), (98.0, 88.0));
        let f = ControlLoopConfig::for_unit(TempUnit::Fahrenheit);
        assert_eq!((f.max_boil_temp, f.max_pid_temp), (208.0, 190.0));
        assert_eq!(f.kp, DEFAULT_KP);
        assert_eq!(f.sample_time, SampleTime::Five);
        assert!(c.validate().is_ok());
        assert!(f.validate().is_ok());
    }

    #[test]
    fn sample_time_only_accepts_offered_options() {
        assert_eq!(SampleTime::try_from(2), Ok(SampleTime::Two));
        assert_eq!(SampleTime::try_from(5), Ok(SampleTime::Five));
        assert!(SampleTime::try_from(3).is_err());
        assert_eq!(SampleTime::Two.as_duration(), Duration::from_secs(2));
    }

    #[test]
    fn inverted_output_limits_are_invalid() {
        let config = ControlLoopConfig {
            output_min: 50.0,
            output_max: 10.0,
            ..ControlLoopConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KettleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn boil_output_outside_limits_is_invalid() {
        let config = ControlLoopConfig {
            max_boil_output: 120.0,
            ..ControlLoopConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_boil_output"));
    }

    #[test]
    fn undefined_threshold_is_invalid() {
        let config = ControlLoopConfig {
            max_pid_temp: f64::NAN,
            ..ControlLoopConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pid_parameters_carry_sample_time_and_limits() {
        let config = ControlLoopConfig {
            sample_time: SampleTime::Two,
            ..ControlLoopConfig::default()
        };
        let params = config.pid_parameters().unwrap();
        assert_eq!(params.sample_time_secs(), 2.0);
        assert_eq!((params.output_min(), params.output_max()), (0.0, 100.0));
        assert_eq!(params.gains(), (DEFAULT_KP, DEFAULT_KI, DEFAULT_KD));
    }
}
