//! In-process kettle simulation for running the controller without hardware.
//!
//! [`SimKettle`] is a lumped thermal model shared by a simulated heater,
//! any number of simulated relays and a simulated probe.  Actuator commands
//! are appended to a bounded log so tests can assert exactly what the control
//! loop sent.
//!
//! The model follows Newton's law of cooling with a heat input proportional
//! to the heater power:
//!
//! `dT/dt = heat_rate * power / 100 - loss_coeff * (T - ambient)`
//!
//! solved in closed form between readings and capped at the boiling point.
//! Time comes from [`tokio::time::Instant`], so paused test runtimes drive
//! the model deterministically.
//!
//! # Example
//!
//! ```rust
//! use kettle_hal::sim::{SimKettle, SimKettleParams};
//! use kettle_hal::{PowerActuator, TemperatureSensor};
//!
//! let kettle = SimKettle::new(SimKettleParams::default());
//! let mut heater = kettle.heater("mash_heater");
//! let mut probe = kettle.sensor("mash_probe");
//!
//! heater.set_power(100.0).expect("sim heater never fails");
//! heater.turn_on().expect("sim heater never fails");
//! assert!(probe.read_value().is_ok());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kettle_types::KettleError;
use tokio::time::Instant;

use crate::actuator::PowerActuator;
use crate::relay::Relay;
use crate::sensor::TemperatureSensor;

/// Physical constants of the simulated kettle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimKettleParams {
    pub initial_temp: f64,
    pub ambient_temp: f64,
    /// Temperature rise per second at 100 % power, ignoring losses.
    pub heat_rate: f64,
    /// Fraction of the temperature difference to ambient lost per second.
    pub loss_coeff: f64,
    pub boiling_point: f64,
}

impl Default for SimKettleParams {
    fn default() -> Self {
        // Roughly a 30 l kettle with a 3.5 kW element.
        Self {
            initial_temp: 20.0,
            ambient_temp: 20.0,
            heat_rate: 0.05,
            loss_coeff: 0.0008,
            boiling_point: 100.0,
        }
    }
}

/// Number of commands a [`SimKettle`] keeps; older ones are dropped.
pub const COMMAND_LOG_CAPACITY: usize = 1024;

/// One command received by a simulated actuator.
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCommand {
    TurnOn { id: String },
    TurnOff { id: String },
    SetPower { id: String, percent: f64 },
    SetRelay { id: String, active: bool },
}

impl ActuatorCommand {
    /// Identifier of the device the command was sent to.
    pub fn device(&self) -> &str {
        match self {
            ActuatorCommand::TurnOn { id }
            | ActuatorCommand::TurnOff { id }
            | ActuatorCommand::SetPower { id, .. }
            | ActuatorCommand::SetRelay { id, .. } => id,
        }
    }

    /// `true` for commands that switch a device off or to zero power.
    pub fn is_shutoff(&self) -> bool {
        match self {
            ActuatorCommand::TurnOff { .. } => true,
            ActuatorCommand::SetPower { percent, .. } => *percent == 0.0,
            ActuatorCommand::SetRelay { active, .. } => !active,
            ActuatorCommand::TurnOn { .. } => false,
        }
    }
}

#[derive(Debug)]
struct SimState {
    params: SimKettleParams,
    temperature: f64,
    heater_on: bool,
    heater_power: f64,
    relays: HashMap<String, bool>,
    last_update: Instant,
    commands: VecDeque<ActuatorCommand>,
    sensor_fault: Option<String>,
    heater_fault: Option<String>,
}

impl SimState {
    fn advance(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        // A NaN temperature models a broken probe; it stays until `set_temperature`.
        if dt <= 0.0 || self.temperature.is_nan() {
            return;
        }

        let p = &self.params;
        let power = if self.heater_on { self.heater_power.clamp(0.0, 100.0) } else { 0.0 };
        let heat_in = p.heat_rate * power / 100.0;

        self.temperature = if p.loss_coeff > 0.0 {
            let equilibrium = p.ambient_temp + heat_in / p.loss_coeff;
            equilibrium + (self.temperature - equilibrium) * (-p.loss_coeff * dt).exp()
        } else {
            self.temperature + heat_in * dt
        };
        self.temperature = self.temperature.min(p.boiling_point);
    }

    fn record(&mut self, command: ActuatorCommand) {
        if self.commands.len() == COMMAND_LOG_CAPACITY {
            self.commands.pop_front();
        }
        self.commands.push_back(command);
    }
}

/// Handle to a simulated kettle.  Clones share the same model.
#[derive(Debug, Clone)]
pub struct SimKettle {
    state: Arc<Mutex<SimState>>,
}

impl SimKettle {
    pub fn new(params: SimKettleParams) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                params,
                temperature: params.initial_temp,
                heater_on: false,
                heater_power: 0.0,
                relays: HashMap::new(),
                last_update: Instant::now(),
                commands: VecDeque::new(),
                sensor_fault: None,
                heater_fault: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A heater driving this kettle.
    pub fn heater(&self, id: impl Into<String>) -> Box<SimHeater> {
        Box::new(SimHeater {
            id: id.into(),
            kettle: self.clone(),
        })
    }

    /// A relay attached to this kettle (heater relay, agitator, …).
    pub fn relay(&self, id: impl Into<String>) -> Box<SimRelay> {
        let id = id.into();
        self.lock().relays.insert(id.clone(), false);
        Box::new(SimRelay {
            id,
            kettle: self.clone(),
        })
    }

    /// A probe reading this kettle's temperature.
    pub fn sensor(&self, id: impl Into<String>) -> Box<SimSensor> {
        Box::new(SimSensor {
            id: id.into(),
            kettle: self.clone(),
        })
    }

    /// Current liquid temperature, advancing the model to now.
    pub fn temperature(&self) -> f64 {
        let mut state = self.lock();
        state.advance();
        state.temperature
    }

    pub fn set_temperature(&self, temperature: f64) {
        let mut state = self.lock();
        state.advance();
        state.temperature = temperature;
    }

    pub fn heater_on(&self) -> bool {
        self.lock().heater_on
    }

    pub fn heater_power(&self) -> f64 {
        self.lock().heater_power
    }

    /// Change the heater power behind the controller's back.  Not logged.
    pub fn force_heater_power(&self, percent: f64) {
        let mut state = self.lock();
        state.advance();
        state.heater_power = percent;
    }

    pub fn relay_state(&self, id: &str) -> bool {
        self.lock().relays.get(id).copied().unwrap_or(false)
    }

    /// The last [`COMMAND_LOG_CAPACITY`] commands received, oldest first.
    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.lock().commands.iter().cloned().collect()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Make every probe reading fail with `details` (or succeed again with
    /// `None`).
    pub fn set_sensor_fault(&self, details: Option<&str>) {
        self.lock().sensor_fault = details.map(str::to_string);
    }

    /// Make heater `set_power` commands fail with `details`.  Switching the
    /// heater off keeps working.
    pub fn set_heater_fault(&self, details: Option<&str>) {
        self.lock().heater_fault = details.map(str::to_string);
    }
}

/// Simulated heater.  Fails only when a heater fault is injected.
pub struct SimHeater {
    id: String,
    kettle: SimKettle,
}

impl PowerActuator for SimHeater {
    fn id(&self) -> &str {
        &self.id
    }

    fn turn_on(&mut self) -> Result<(), KettleError> {
        let mut state = self.kettle.lock();
        state.advance();
        state.heater_on = true;
        state.record(ActuatorCommand::TurnOn { id: self.id.clone() });
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), KettleError> {
        let mut state = self.kettle.lock();
        state.advance();
        state.heater_on = false;
        state.record(ActuatorCommand::TurnOff { id: self.id.clone() });
        Ok(())
    }

    fn set_power(&mut self, percent: f64) -> Result<(), KettleError> {
        let mut state = self.kettle.lock();
        if let Some(details) = &state.heater_fault {
            return Err(KettleError::HardwareFault {
                component: self.id.clone(),
                details: details.clone(),
            });
        }
        state.advance();
        state.heater_power = percent;
        state.record(ActuatorCommand::SetPower {
            id: self.id.clone(),
            percent,
        });
        Ok(())
    }

    fn power(&self) -> f64 {
        self.kettle.heater_power()
    }

    fn is_on(&self) -> bool {
        self.kettle.heater_on()
    }
}

/// Simulated relay that records its state.  Always succeeds.
pub struct SimRelay {
    id: String,
    kettle: SimKettle,
}

impl Relay for SimRelay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, active: bool) -> Result<(), KettleError> {
        let mut state = self.kettle.lock();
        state.relays.insert(self.id.clone(), active);
        state.record(ActuatorCommand::SetRelay {
            id: self.id.clone(),
            active,
        });
        Ok(())
    }

    fn state(&self) -> bool {
        self.kettle.relay_state(&self.id)
    }
}

/// Simulated probe returning the model temperature.
pub struct SimSensor {
    id: String,
    kettle: SimKettle,
}

impl TemperatureSensor for SimSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_value(&mut self) -> Result<f64, KettleError> {
        let mut state = self.kettle.lock();
        if let Some(details) = &state.sensor_fault {
            return Err(KettleError::SensorUnavailable {
                sensor: self.id.clone(),
                details: details.clone(),
            });
        }
        state.advance();
        Ok(state.temperature)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn full_power_heats_the_kettle() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let mut heater = kettle.heater("heater");
        heater.set_power(100.0).unwrap();
        heater.turn_on().unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let t = kettle.temperature();
        // ~0.05 °C/s for a minute, minus a little loss.
        assert!(t > 22.5 && t < 23.1, "unexpected temperature {t}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_kettle_cools_toward_ambient() {
        let kettle = SimKettle::new(SimKettleParams::default());
        kettle.set_temperature(80.0);
        tokio::time::advance(Duration::from_secs(600)).await;
        let t = kettle.temperature();
        assert!(t < 80.0 && t > 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_is_capped_at_boiling_point() {
        let kettle = SimKettle::new(SimKettleParams {
            heat_rate: 1.0,
            ..SimKettleParams::default()
        });
        let mut heater = kettle.heater("heater");
        heater.set_power(100.0).unwrap();
        heater.turn_on().unwrap();
        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert_eq!(kettle.temperature(), 100.0);
    }

    #[test]
    fn commands_are_logged_in_order() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let mut heater = kettle.heater("heater");
        let mut agitator = kettle.relay("agitator");

        heater.set_power(40.0).unwrap();
        heater.turn_on().unwrap();
        agitator.set_state(true).unwrap();
        heater.turn_off().unwrap();

        assert_eq!(
            kettle.commands(),
            vec![
                ActuatorCommand::SetPower { id: "heater".into(), percent: 40.0 },
                ActuatorCommand::TurnOn { id: "heater".into() },
                ActuatorCommand::SetRelay { id: "agitator".into(), active: true },
                ActuatorCommand::TurnOff { id: "heater".into() },
            ]
        );
        assert!(agitator.state());
        assert!(!heater.is_on());
    }

    #[test]
    fn injected_faults_surface_as_errors() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let mut probe = kettle.sensor("probe");
        let mut heater = kettle.heater("heater");

        kettle.set_sensor_fault(Some("wire disconnected"));
        assert!(matches!(
            probe.read_value(),
            Err(KettleError::SensorUnavailable { .. })
        ));
        kettle.set_sensor_fault(None);
        assert!(probe.read_value().is_ok());

        kettle.set_heater_fault(Some("ssr overheated"));
        assert!(heater.set_power(50.0).is_err());
        assert!(heater.turn_off().is_ok());
    }

    #[test]
    fn command_log_keeps_only_the_most_recent_commands() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let mut heater = kettle.heater("heater");
        for step in 0..COMMAND_LOG_CAPACITY + 100 {
            heater.set_power((step % 100) as f64).unwrap();
        }

        let commands = kettle.commands();
        assert_eq!(commands.len(), COMMAND_LOG_CAPACITY);
        assert_eq!(
            commands[0],
            ActuatorCommand::SetPower { id: "heater".into(), percent: 0.0 }
        );
        assert!(commands[0].is_shutoff());
        assert_eq!(commands[0].device(), "heater");
    }

    #[tokio::test(start_paused = true)]
    async fn nan_temperature_sticks_like_a_broken_probe() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let mut probe = kettle.sensor("probe");
        kettle.set_temperature(f64::NAN);
        assert!(probe.read_value().unwrap().is_nan());
        kettle.set_temperature(45.0);
        assert_eq!(probe.read_value().unwrap(), 45.0);
    }

    #[test]
    fn forced_power_is_visible_but_not_logged() {
        let kettle = SimKettle::new(SimKettleParams::default());
        let heater = kettle.heater("heater");
        kettle.force_heater_power(30.0);
        assert_eq!(heater.power(), 30.0);
        assert!(kettle.commands().is_empty());
    }
}
