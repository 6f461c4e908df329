//! Host configuration – reads/writes `~/.kettle/config.toml`.
//!
//! ```toml
//! temp_unit = "C"
//! log_format = "compact"
//!
//! [[kettles]]
//! id = "mash_tun"
//! target = 65.0
//! sample_time = 5
//! p = 117.0795
//! i = 0.2747
//! d = 41.58
//! max_boil_output = 85.0
//! heater_relay = true
//! agitator = true
//! ```
//!
//! `max_boil_temp` and `max_pid_temp` default per `temp_unit`.

use std::fs;
use std::path::{Path, PathBuf};

use kettle_runtime::config::{
    DEFAULT_KD, DEFAULT_KI, DEFAULT_KP, DEFAULT_MAX_BOIL_OUTPUT, default_boil_temp, default_pid_temp,
};
use kettle_runtime::{ControlLoopConfig, LogFormat, SampleTime};
use kettle_types::{KettleError, TempUnit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Invalid(#[from] KettleError),
}

/// Top-level host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub temp_unit: TempUnit,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_kettles")]
    pub kettles: Vec<KettleSettings>,
}

/// Settings of one kettle.  Missing values fall back to the kettle-logic
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KettleSettings {
    /// Session identifier.  A random one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Initial target temperature.
    #[serde(default = "default_target")]
    pub target: f64,

    #[serde(default)]
    pub sample_time: SampleTime,

    #[serde(default = "default_kp")]
    pub p: f64,

    #[serde(default = "default_ki")]
    pub i: f64,

    #[serde(default = "default_kd")]
    pub d: f64,

    #[serde(default = "default_max_boil_output")]
    pub max_boil_output: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_boil_temp: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pid_temp: Option<f64>,

    /// Wire a relay that is switched on with every power change.
    #[serde(default)]
    pub heater_relay: bool,

    /// Wire an agitator that is switched off when the session ends.
    #[serde(default)]
    pub agitator: bool,

    /// Starting liquid temperature of the simulated kettle.
    #[serde(default = "default_initial_temp")]
    pub initial_temp: f64,
}

fn default_kettles() -> Vec<KettleSettings> {
    vec![KettleSettings::default()]
}
fn default_target() -> f64 {
    65.0
}
fn default_kp() -> f64 {
    DEFAULT_KP
}
fn default_ki() -> f64 {
    DEFAULT_KI
}
fn default_kd() -> f64 {
    DEFAULT_KD
}
fn default_max_boil_output() -> f64 {
    DEFAULT_MAX_BOIL_OUTPUT
}
fn default_initial_temp() -> f64 {
    20.0
}

impl Default for KettleSettings {
    fn default() -> Self {
        Self {
            id: None,
            target: default_target(),
            sample_time: SampleTime::default(),
            p: default_kp(),
            i: default_ki(),
            d: default_kd(),
            max_boil_output: default_max_boil_output(),
            max_boil_temp: None,
            max_pid_temp: None,
            heater_relay: false,
            agitator: false,
            initial_temp: default_initial_temp(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_unit: TempUnit::default(),
            log_format: LogFormat::default(),
            kettles: default_kettles(),
        }
    }
}

impl KettleSettings {
    /// Validated control-loop settings for this kettle.
    pub fn control_config(&self, unit: TempUnit) -> Result<ControlLoopConfig, KettleError> {
        let config = ControlLoopConfig {
            kp: self.p,
            ki: self.i,
            kd: self.d,
            sample_time: self.sample_time,
            max_boil_output: self.max_boil_output,
            max_boil_temp: self.max_boil_temp.unwrap_or_else(|| default_boil_temp(unit)),
            max_pid_temp: self.max_pid_temp.unwrap_or_else(|| default_pid_temp(unit)),
            ..ControlLoopConfig::for_unit(unit)
        };
        config.validate()?;
        Ok(config)
    }
}

/// Return the path to `~/.kettle/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kettle").join("config.toml")
}

/// Load the config from `path` and apply the environment overrides.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// The file contents only, without environment overrides.
fn read_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `KETTLE_*` environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KETTLE_TEMP_UNIT` | `temp_unit` (`C` or `F`) |
/// | `KETTLE_SAMPLE_TIME` | `sample_time` of every kettle (`2` or `5`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KETTLE_TEMP_UNIT") {
        match v.trim() {
            "C" | "c" => cfg.temp_unit = TempUnit::Celsius,
            "F" | "f" => cfg.temp_unit = TempUnit::Fahrenheit,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("KETTLE_SAMPLE_TIME")
        && let Ok(secs) = v.trim().parse::<u64>()
        && let Ok(sample_time) = SampleTime::try_from(secs)
    {
        for kettle in &mut cfg.kettles {
            kettle.sample_time = sample_time;
        }
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            temp_unit = "F"

            [[kettles]]
            id = "boil_kettle"
            target = 212.0
            sample_time = 2
            "#,
        )
        .unwrap();

        assert_eq!(cfg.log_format, LogFormat::Compact);
        let kettle = &cfg.kettles[0];
        assert_eq!(kettle.p, DEFAULT_KP);
        assert_eq!(kettle.sample_time, SampleTime::Two);

        let control = kettle.control_config(cfg.temp_unit).unwrap();
        assert_eq!(control.max_boil_temp, 208.0);
        assert_eq!(control.max_pid_temp, 190.0);
        assert_eq!(control.max_boil_output, 85.0);
    }

    #[test]
    fn empty_file_yields_one_default_kettle() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.kettles.len(), 1);
    }

    #[test]
    fn unsupported_sample_time_is_a_parse_error() {
        let err = toml::from_str::<Config>("[[kettles]]\nsample_time = 3\n").unwrap_err();
        assert!(err.to_string().contains("2 or 5"));
    }

    #[test]
    fn json_log_format_is_accepted() {
        let cfg: Config = toml::from_str("log_format = \"json\"").unwrap();
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn explicit_thresholds_override_unit_defaults() {
        let kettle = KettleSettings {
            max_boil_temp: Some(97.0),
            max_pid_temp: Some(80.0),
            ..KettleSettings::default()
        };
        let control = kettle.control_config(TempUnit::Celsius).unwrap();
        assert_eq!((control.max_boil_temp, control.max_pid_temp), (97.0, 80.0));
    }

    #[test]
    fn invalid_kettle_settings_are_rejected() {
        let kettle = KettleSettings {
            max_boil_output: 150.0,
            ..KettleSettings::default()
        };
        assert!(matches!(
            kettle.control_config(TempUnit::Celsius),
            Err(KettleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.kettles[0].id = Some("hlt".to_string());
        cfg.kettles[0].agitator = true;
        cfg.kettles[0].sample_time = SampleTime::Two;
        save_to(&cfg, &path).expect("save");

        let loaded = read_from(&path).expect("read ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn read_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(read_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_kettle_dir() {
        let p = config_path_for_home("/home/brewer");
        assert!(p.to_string_lossy().contains(".kettle"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn env_overrides_unit_and_sample_time() {
        // SAFETY: this is the only test in this crate that sets or reads
        // these variables; the others go through `read_from`.
        unsafe {
            std::env::set_var("KETTLE_TEMP_UNIT", "F");
            std::env::set_var("KETTLE_SAMPLE_TIME", "2");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.temp_unit, TempUnit::Fahrenheit);
        assert_eq!(cfg.kettles[0].sample_time, SampleTime::Two);

        unsafe { std::env::set_var("KETTLE_SAMPLE_TIME", "7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.kettles[0].sample_time, SampleTime::Five);

        unsafe {
            std::env::remove_var("KETTLE_TEMP_UNIT");
            std::env::remove_var("KETTLE_SAMPLE_TIME");
        }
    }
}
