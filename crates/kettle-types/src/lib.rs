use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one kettle control session (e.g. `"mash_tun"`).
///
/// The platform uses the same identifier to look up the session's target
/// temperature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Temperature unit the host platform reports readings in.
///
/// Threshold defaults (boil temperature, PID cutoff) depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempUnit {
    #[default]
    #[serde(rename = "C", alias = "c", alias = "celsius")]
    Celsius,
    #[serde(rename = "F", alias = "f", alias = "fahrenheit")]
    Fahrenheit,
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TempUnit::Celsius => write!(f, "°C"),
            TempUnit::Fahrenheit => write!(f, "°F"),
        }
    }
}

/// Lifecycle of a kettle control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Constructed, not yet started.
    Idle,
    /// Heater is being commanded to zero power before the first decision.
    Priming,
    /// Control loop is iterating.
    Running,
    /// Mandatory shut-off of every actuator is in progress.
    Stopping,
    /// Terminal. No further actuator commands are issued.
    Stopped,
}

/// Which policy produced the commanded heater power for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// Output of the PID engine.
    Pid,
    /// Above the PID cutoff: maximum output until the boil threshold.
    FullPower,
    /// At or above the boil threshold: fixed boil power.
    Boil,
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerMode::Pid => write!(f, "pid"),
            PowerMode::FullPower => write!(f, "full-power"),
            PowerMode::Boil => write!(f, "boil"),
        }
    }
}

/// Snapshot of a single control-loop iteration, published to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSample {
    pub session: SessionId,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub target: f64,
    /// Heater power in percent.
    pub power: f64,
    pub mode: PowerMode,
    /// `true` when this iteration sent a new power command to the heater.
    pub applied: bool,
}

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The host invoked the stop hook.
    Cancelled,
    /// Every stop handle was dropped, so nobody can stop the session anymore.
    HostDetached,
}

/// Error type shared by the engine, the capabilities and the control loop.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KettleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Sensor {sensor} unavailable: {details}")]
    SensorUnavailable { sensor: String, details: String },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_unit_accepts_platform_spellings() {
        let c: TempUnit = serde_json::from_str("\"C\"").unwrap();
        let f: TempUnit = serde_json::from_str("\"fahrenheit\"").unwrap();
        assert_eq!(c, TempUnit::Celsius);
        assert_eq!(f, TempUnit::Fahrenheit);
        assert_eq!(serde_json::to_string(&TempUnit::Fahrenheit).unwrap(), "\"F\"");
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let id = SessionId::from("mash_tun");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"mash_tun\"");
        assert_eq!(id.to_string(), "mash_tun");
    }

    #[test]
    fn control_sample_roundtrip() {
        let sample = ControlSample {
            session: SessionId::from("boil_kettle"),
            timestamp: Utc::now(),
            temperature: 99.2,
            target: 100.0,
            power: 85.0,
            mode: PowerMode::Boil,
            applied: true,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"boil\""));
        let back: ControlSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session, sample.session);
        assert_eq!(back.mode, PowerMode::Boil);
        assert!((back.power - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn kettle_error_display() {
        let err = KettleError::InvalidConfiguration("output_min must be less than output_max".into());
        assert!(err.to_string().contains("output_min"));

        let err2 = KettleError::SensorUnavailable {
            sensor: "mash_probe".to_string(),
            details: "no reading".to_string(),
        };
        assert!(err2.to_string().contains("mash_probe"));
    }
}
