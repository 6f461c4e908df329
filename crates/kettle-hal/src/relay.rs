//! `Relay` trait for discrete on/off kettle hardware: the heater relay that
//! enables the heating element, the agitator or a pump.

use kettle_types::KettleError;

/// A discrete on/off device.
pub trait Relay: Send + Sync {
    /// Stable identifier for this relay, e.g. `"heater_relay"`.
    fn id(&self) -> &str;

    /// Drive the relay to `active` (`true` = energised / on).
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::HardwareFault`] if the command cannot be applied.
    fn set_state(&mut self, active: bool) -> Result<(), KettleError>;

    /// Return the relay's current state (`true` = energised).
    fn state(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockRelay {
        id: String,
        state: bool,
        switches: usize,
    }

    impl Relay for MockRelay {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_state(&mut self, active: bool) -> Result<(), KettleError> {
            self.state = active;
            self.switches += 1;
            Ok(())
        }

        fn state(&self) -> bool {
            self.state
        }
    }

    #[test]
    fn mock_agitator_toggle() {
        let mut agitator = MockRelay {
            id: "agitator".to_string(),
            state: false,
            switches: 0,
        };
        agitator.set_state(true).unwrap();
        assert!(agitator.state());
        agitator.set_state(false).unwrap();
        assert!(!agitator.state());
        assert_eq!(agitator.switches, 2);
    }
}
