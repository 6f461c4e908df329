//! [`KettleController`] – the sampling control loop of one kettle session.
//!
//! Lifecycle: `Idle → Priming → Running → Stopping → Stopped`.
//!
//! 1. **Priming** – the heater is set to zero power and switched on so the
//!    first decision starts from a known baseline.
//! 2. **Running** – every sample interval the loop reads the probe and the
//!    session's target temperature and picks the heater power:
//!    - at or above `max_boil_temp`: the fixed boil power;
//!    - at or above `max_pid_temp`: `output_max` until the boil threshold;
//!    - otherwise: the [`PidEngine`] output.
//!
//!    A power command is sent only when the decision differs from the last
//!    applied value or from what the heater reports.
//! 3. **Stopping** – heater, agitator and heater relay are switched off, once
//!    each, whatever ended the loop: a stop request, a sensor failure or any
//!    other error.
//!
//! The stop request is observed at the top of every iteration and while the
//! loop sleeps between samples.  Dropping every [`StopHandle`] counts as a
//! stop request.
//!
//! # Example
//!
//! ```rust,no_run
//! use kettle_hal::{SetpointTable, SimKettle, SimKettleParams};
//! use kettle_runtime::{ControlLoopConfig, KettleController};
//! use kettle_types::SessionId;
//!
//! # async fn demo() -> Result<(), kettle_types::KettleError> {
//! let kettle = SimKettle::new(SimKettleParams::default());
//! let setpoints = SetpointTable::new();
//! let session = SessionId::from("mash_tun");
//! setpoints.set(session.clone(), 65.0);
//!
//! let mut controller = KettleController::new(
//!     session,
//!     ControlLoopConfig::default(),
//!     kettle.heater("mash_heater"),
//!     kettle.sensor("mash_probe"),
//!     Box::new(setpoints),
//! )?;
//! let stop = controller.stop_handle();
//! let task = tokio::spawn(async move { controller.run().await });
//! // ... later, from the host's shutdown hook:
//! stop.stop();
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use kettle_hal::{Clock, MonotonicClock, PidEngine, PowerActuator, Relay, SetpointSource, TemperatureSensor};
use kettle_types::{ControlSample, ControllerState, KettleError, PowerMode, SessionId, StopReason};
use tokio::sync::{broadcast, watch};
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::ControlLoopConfig;

// ─────────────────────────────────────────────────────────────────────────────
// StopHandle
// ─────────────────────────────────────────────────────────────────────────────

/// The host's shutdown hook for one session.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    /// Ask the session to stop.  The loop switches every actuator off before
    /// [`KettleController::run`] returns.
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.0.borrow()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KettleController
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one kettle: owns its PID engine and the capabilities it commands.
pub struct KettleController {
    session: SessionId,
    config: ControlLoopConfig,
    engine: PidEngine,
    heater: Box<dyn PowerActuator>,
    sensor: Box<dyn TemperatureSensor>,
    setpoints: Box<dyn SetpointSource>,
    heater_relay: Option<Box<dyn Relay>>,
    agitator: Option<Box<dyn Relay>>,
    samples: Option<broadcast::Sender<ControlSample>>,
    state: ControllerState,
    /// Power most recently sent to the heater; the change-detection baseline.
    last_applied: f64,
    /// Our own copy of the stop sender, released when the session starts.
    stop_handle: Option<StopHandle>,
    stop_rx: watch::Receiver<bool>,
}

impl KettleController {
    /// Build a controller for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`KettleError::InvalidConfiguration`] when `config` fails
    /// validation.  The session must not be started in that case.
    pub fn new(
        session: SessionId,
        config: ControlLoopConfig,
        heater: Box<dyn PowerActuator>,
        sensor: Box<dyn TemperatureSensor>,
        setpoints: Box<dyn SetpointSource>,
    ) -> Result<Self, KettleError> {
        config.validate()?;
        let engine = PidEngine::new(config.pid_parameters()?, Box::new(MonotonicClock::new()));
        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            session,
            config,
            engine,
            heater,
            sensor,
            setpoints,
            heater_relay: None,
            agitator: None,
            samples: None,
            state: ControllerState::Idle,
            last_applied: 0.0,
            stop_handle: Some(StopHandle(Arc::new(stop_tx))),
            stop_rx,
        })
    }

    /// Relay switched on together with every power change and off at stop.
    pub fn with_heater_relay(mut self, relay: Box<dyn Relay>) -> Self {
        self.heater_relay = Some(relay);
        self
    }

    /// Agitator (pump or stirrer) that must be off when the session ends.
    pub fn with_agitator(mut self, agitator: Box<dyn Relay>) -> Self {
        self.agitator = Some(agitator);
        self
    }

    /// Publish a [`ControlSample`] on `tx` after every iteration.
    pub fn with_sample_channel(mut self, tx: broadcast::Sender<ControlSample>) -> Self {
        self.samples = Some(tx);
        self
    }

    /// Replace the engine's clock.  Resets the engine.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.engine = PidEngine::new(*self.engine.params(), clock);
        self
    }

    /// A handle for requesting shutdown.  Must be taken before
    /// [`run`][Self::run]; once the session has started and every handle has
    /// been dropped the session stops with [`StopReason::HostDetached`].
    /// Handles taken after the session started are not connected to it.
    pub fn stop_handle(&self) -> StopHandle {
        match &self.stop_handle {
            Some(handle) => handle.clone(),
            None => StopHandle(Arc::new(watch::channel(true).0)),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn engine(&self) -> &PidEngine {
        &self.engine
    }

    pub fn config(&self) -> &ControlLoopConfig {
        &self.config
    }

    /// Run the session until it is stopped or fails.
    ///
    /// Every actuator is switched off before this returns, on every path.
    ///
    /// # Errors
    ///
    /// - [`KettleError::SensorUnavailable`] when the probe cannot be read.
    /// - [`KettleError::HardwareFault`] when an actuator rejects a command.
    /// - [`KettleError::Unexpected`] for anything else, including calling
    ///   `run` on a controller that already ran.
    pub async fn run(&mut self) -> Result<StopReason, KettleError> {
        if self.state != ControllerState::Idle {
            return Err(KettleError::Unexpected(format!(
                "session '{}' cannot be started from state {:?}",
                self.session, self.state
            )));
        }
        let span = info_span!("kettle_session", session = %self.session);
        self.run_session().instrument(span).await
    }

    async fn run_session(&mut self) -> Result<StopReason, KettleError> {
        self.stop_handle = None;

        let outcome = match self.prime() {
            Ok(()) => self.control_loop().await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(reason) => info!(?reason, "stopping kettle session"),
            Err(e) => error!(error = %e, "kettle session failed"),
        }

        let shutoff = self.shut_off();
        match outcome {
            Ok(reason) => shutoff.map(|()| reason),
            Err(e) => Err(e),
        }
    }

    fn prime(&mut self) -> Result<(), KettleError> {
        self.state = ControllerState::Priming;
        self.heater.set_power(0.0)?;
        self.heater.turn_on()?;
        self.last_applied = 0.0;
        let (kp, ki, kd) = self.engine.params().gains();
        info!(
            heater = self.heater.id(),
            sensor = self.sensor.id(),
            kp, ki, kd,
            sample_time = %self.config.sample_time,
            "heater on with zero power"
        );
        Ok(())
    }

    async fn control_loop(&mut self) -> Result<StopReason, KettleError> {
        self.state = ControllerState::Running;
        let period = self.config.sample_time.as_duration();

        loop {
            if let Some(reason) = self.pending_stop() {
                return Ok(reason);
            }

            self.tick()?;

            tokio::select! {
                () = tokio::time::sleep(period) => {}
                changed = self.stop_rx.changed() => {
                    return Ok(match changed {
                        Ok(()) => StopReason::Cancelled,
                        Err(_) => StopReason::HostDetached,
                    });
                }
            }
        }
    }

    fn pending_stop(&self) -> Option<StopReason> {
        if *self.stop_rx.borrow() {
            Some(StopReason::Cancelled)
        } else if self.stop_rx.has_changed().is_err() {
            Some(StopReason::HostDetached)
        } else {
            None
        }
    }

    /// One control iteration: read, decide, apply, publish.
    fn tick(&mut self) -> Result<(), KettleError> {
        let reported = self.heater.power();
        let temperature = self.sensor.read_value()?;
        if !temperature.is_finite() {
            return Err(KettleError::SensorUnavailable {
                sensor: self.sensor.id().to_string(),
                details: format!("non-finite reading {temperature}"),
            });
        }
        let target = self.setpoints.target_temperature(&self.session)?;
        if !target.is_finite() {
            return Err(KettleError::Unexpected(format!(
                "non-finite target temperature {target} for session '{}'",
                self.session
            )));
        }

        let (power, mode) = self.decide(temperature, target);

        let applied = power != self.last_applied || power != reported;
        if applied {
            if let Some(relay) = self.heater_relay.as_mut() {
                relay.set_state(true)?;
            }
            self.heater.set_power(power)?;
            self.last_applied = power;
        }
        debug!(temperature, target, power, %mode, applied, "control tick");

        if let Some(tx) = &self.samples {
            // No subscribers is not an error.
            let _ = tx.send(ControlSample {
                session: self.session.clone(),
                timestamp: Utc::now(),
                temperature,
                target,
                power,
                mode,
                applied,
            });
        }
        Ok(())
    }

    /// Pick the heater power for `temperature`.  The engine is only consulted
    /// below the PID cutoff.
    fn decide(&mut self, temperature: f64, target: f64) -> (f64, PowerMode) {
        if temperature >= self.config.max_boil_temp {
            (self.config.max_boil_output, PowerMode::Boil)
        } else if temperature >= self.config.max_pid_temp {
            (self.config.output_max, PowerMode::FullPower)
        } else {
            (self.engine.compute(temperature, target), PowerMode::Pid)
        }
    }

    /// Switch every actuator off, once each.  A failing command is logged and
    /// the remaining ones are still sent; the first failure is returned.
    fn shut_off(&mut self) -> Result<(), KettleError> {
        self.state = ControllerState::Stopping;
        let mut first_error = None;

        if let Err(e) = self.heater.turn_off() {
            error!(heater = self.heater.id(), error = %e, "failed to switch heater off");
            first_error.get_or_insert(e);
        }
        for relay in [self.agitator.as_mut(), self.heater_relay.as_mut()].into_iter().flatten() {
            if let Err(e) = relay.set_state(false) {
                error!(relay = relay.id(), error = %e, "failed to switch relay off");
                first_error.get_or_insert(e);
            }
        }

        self.state = ControllerState::Stopped;
        info!("all actuators off");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for KettleController {
    fn drop(&mut self) {
        // A session future dropped mid-run never reached its own shut-off.
        if matches!(
            self.state,
            ControllerState::Priming | ControllerState::Running | ControllerState::Stopping
        ) {
            let _ = self.shut_off();
        }
    }
}
