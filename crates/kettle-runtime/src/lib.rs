//! `kettle-runtime` – the kettle control session.
//!
//! # Modules
//!
//! - [`control_loop`] – [`KettleController`]: primes the heater, runs the
//!   sample-timed loop that chooses between the PID output and the
//!   full-power / boil overrides, and switches every actuator off when the
//!   session ends.  [`StopHandle`] is the host's shutdown hook.
//! - [`config`] – [`ControlLoopConfig`]: gains, sample time, thresholds and
//!   output limits, validated once before a session starts.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   `tracing` subscriber with an optional OTLP exporter.
//!
//! Each session owns its own [`PidEngine`][kettle_hal::PidEngine]; running
//! several kettles means running several controllers, one task each.

pub mod config;
pub mod control_loop;
pub mod telemetry;

pub use config::{ControlLoopConfig, SampleTime};
pub use control_loop::{KettleController, StopHandle};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
