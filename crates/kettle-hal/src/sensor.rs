//! Read-side capabilities: the kettle temperature probe and the per-session
//! target temperature lookup.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use kettle_types::{KettleError, SessionId};

/// A temperature probe.
pub trait TemperatureSensor: Send + Sync {
    fn id(&self) -> &str;

    /// Take a fresh reading.
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::SensorUnavailable`] when no reading can be
    /// obtained.
    fn read_value(&mut self) -> Result<f64, KettleError>;
}

/// Looks up the current target temperature of a session.
///
/// The target may change at any time; the control loop re-reads it on every
/// iteration.
pub trait SetpointSource: Send + Sync {
    /// # Errors
    ///
    /// Returns [`KettleError::Unexpected`] when the session has no target.
    fn target_temperature(&self, session: &SessionId) -> Result<f64, KettleError>;
}

/// Shared table of target temperatures keyed by session.  Clones share the
/// same table, so the host can keep one handle and update targets while the
/// sessions run.
#[derive(Debug, Clone, Default)]
pub struct SetpointTable {
    targets: Arc<RwLock<HashMap<SessionId, f64>>>,
}

impl SetpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, session: SessionId, target: f64) {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session, target);
    }

    pub fn get(&self, session: &SessionId) -> Option<f64> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .copied()
    }
}

impl SetpointSource for SetpointTable {
    fn target_temperature(&self, session: &SessionId) -> Result<f64, KettleError> {
        self.get(session).ok_or_else(|| {
            KettleError::Unexpected(format!("no target temperature set for session '{session}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setpoint_updates_are_visible_through_clones() {
        let table = SetpointTable::new();
        let host = table.clone();
        let mash = SessionId::from("mash_tun");

        host.set(mash.clone(), 65.0);
        assert_eq!(table.target_temperature(&mash).unwrap(), 65.0);

        host.set(mash.clone(), 72.0);
        assert_eq!(table.target_temperature(&mash).unwrap(), 72.0);
    }

    #[test]
    fn missing_session_is_an_error() {
        let table = SetpointTable::new();
        let err = table.target_temperature(&SessionId::from("ghost")).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
