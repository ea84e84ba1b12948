//! `grapnel-hal` – Actuator Hardware Abstraction
//!
//! Everything above this crate talks to motors exclusively through the
//! [`ActuatorHandle`][actuator::ActuatorHandle] trait, so the bus transport
//! and register encoding can be swapped without touching control logic.
//!
//! # Modules
//!
//! - [`actuator`] – [`ActuatorHandle`][actuator::ActuatorHandle]: the
//!   capability set of one physical servo (enable/disable, current limit,
//!   position command and read, load, fault code, reboot, control mode,
//!   PID push) plus [`ControlMode`][actuator::ControlMode].
//! - [`bank`] – [`ActuatorBank`][bank::ActuatorBank]: the ordered actuator
//!   collection. Wraps every command so a per-actuator shadow record always
//!   reflects the last issued command and the last successful reads, and
//!   owns the bounded setup sequence (reboot → torque off → control-mode
//!   negotiation → PID push).
//! - [`sim`] – [`SimActuator`][sim::SimActuator]: an in-process simulated
//!   servo for headless runs and CI. Shares its state behind an
//!   `Arc<Mutex<…>>` so tests keep a scripting handle after the actuator is
//!   boxed into a bank.

pub mod actuator;
pub mod bank;
pub mod sim;

pub use actuator::{ActuatorHandle, ControlMode};
pub use bank::{ActuatorBank, ActuatorSlot, ActuatorTelemetry};
pub use sim::{SimActuator, SimCommand, sim_bank};
