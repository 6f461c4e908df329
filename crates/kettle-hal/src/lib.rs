//! `kettle-hal` – hardware-facing building blocks for kettle control.
//!
//! # Modules
//!
//! - [`pid`] – [`PidEngine`][pid::PidEngine]: the sample-time gated PID
//!   computation with output clamping and saturation-gated integration.
//! - [`clock`] – [`Clock`][clock::Clock]: the monotonic millisecond source the
//!   engine gates on, plus a [`ManualClock`][clock::ManualClock] for tests.
//! - [`actuator`] – [`PowerActuator`][actuator::PowerActuator]: a heater that
//!   accepts a power percentage.
//! - [`relay`] – [`Relay`][relay::Relay]: discrete on/off devices such as the
//!   heater relay or the agitator.
//! - [`sensor`] – [`TemperatureSensor`][sensor::TemperatureSensor] and the
//!   [`SetpointSource`][sensor::SetpointSource] lookup.
//! - [`sim`] – [`SimKettle`][sim::SimKettle]: an in-process thermal model with
//!   simulated heater, relays and probe that record every command.
//!
//! Drivers for real hardware live with the host platform; this crate only
//! defines the capabilities the control loop talks to.

pub mod actuator;
pub mod clock;
pub mod pid;
pub mod relay;
pub mod sensor;
pub mod sim;

pub use actuator::PowerActuator;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use pid::{PidEngine, PidParameters, PidState};
pub use relay::Relay;
pub use sensor::{SetpointSource, SetpointTable, TemperatureSensor};
pub use sim::{ActuatorCommand, SimKettle, SimKettleParams};
