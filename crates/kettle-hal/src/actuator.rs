//! `PowerActuator` trait for heaters and any other device driven by a power
//! percentage.
//!
//! The control loop only ever talks to this trait, so the host platform can
//! plug in SSR, PWM or I²C heater drivers without touching the control logic.

use kettle_types::KettleError;

/// A heater (or similar) that is switched on/off and driven at a power level
/// between 0 and 100 percent.
pub trait PowerActuator: Send + Sync {
    /// Stable identifier for this actuator, e.g. `"mash_heater"`.
    fn id(&self) -> &str;

    /// Energise the actuator at its current power level.
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::HardwareFault`] if the command cannot be applied.
    fn turn_on(&mut self) -> Result<(), KettleError>;

    /// De-energise the actuator.
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::HardwareFault`] if the command cannot be applied.
    fn turn_off(&mut self) -> Result<(), KettleError>;

    /// Command the power level in percent.
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::HardwareFault`] if the command cannot be applied.
    fn set_power(&mut self, percent: f64) -> Result<(), KettleError>;

    /// Power level the actuator currently reports.  May lag behind the last
    /// command.
    fn power(&self) -> f64;

    fn is_on(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHeater {
        id: String,
        on: bool,
        power: f64,
    }

    impl PowerActuator for MockHeater {
        fn id(&self) -> &str {
            &self.id
        }

        fn turn_on(&mut self) -> Result<(), KettleError> {
            self.on = true;
            Ok(())
        }

        fn turn_off(&mut self) -> Result<(), KettleError> {
            self.on = false;
            Ok(())
        }

        fn set_power(&mut self, percent: f64) -> Result<(), KettleError> {
            if !(0.0..=100.0).contains(&percent) {
                return Err(KettleError::HardwareFault {
                    component: self.id.clone(),
                    details: format!("power {percent} out of range"),
                });
            }
            self.power = percent;
            Ok(())
        }

        fn power(&self) -> f64 {
            self.power
        }

        fn is_on(&self) -> bool {
            self.on
        }
    }

    #[test]
    fn mock_heater_through_trait_object() {
        let mut heater: Box<dyn PowerActuator> = Box::new(MockHeater {
            id: "hlt_heater".to_string(),
            on: false,
            power: 0.0,
        });
        heater.set_power(42.5).unwrap();
        heater.turn_on().unwrap();
        assert!(heater.is_on());
        assert!((heater.power() - 42.5).abs() < f64::EPSILON);

        let err = heater.set_power(120.0).unwrap_err();
        assert!(err.to_string().contains("hlt_heater"));
    }
}
