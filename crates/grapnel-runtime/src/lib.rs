//! `grapnel-runtime` – The Anchoring Control Engine
//!
//! The closed loop that keeps the microspine gripper anchored: a cyclic
//! state machine polling actuator telemetry, a telemetry recorder feeding
//! the status surface and the session export, and the scheduler that drives
//! both at their own rates.
//!
//! # Modules
//!
//! - [`controller`] – [`AnchorController`][controller::AnchorController]:
//!   the IDLE → ENGAGING → HOLDING → RELEASING state machine. External
//!   surfaces trigger it through
//!   [`request_engage`][controller::AnchorController::request_engage] /
//!   [`request_disengage`][controller::AnchorController::request_disengage];
//!   [`tick`][controller::AnchorController::tick] runs the watchdog pass,
//!   refreshes telemetry, and evaluates the state policy.
//! - [`recorder`] – [`TelemetryRecorder`][recorder::TelemetryRecorder]:
//!   append-only sample log with the composite status string and the
//!   close-time CSV export (`Time,ID,Position,Load`).
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]:
//!   one task owning the controller, bank, and recorder; a 10 Hz tick
//!   interval and an independent 5 Hz sampling interval are multiplexed
//!   with the request channel and the shutdown watch on a single `select!`
//!   loop, so the two periodic activities can never interleave mid-command.

pub mod controller;
pub mod recorder;
pub mod scheduler;

pub use controller::{AnchorController, TickReport};
pub use recorder::{TelemetryRecorder, format_elapsed};
pub use scheduler::{Scheduler, SessionSummary, StatusSnapshot};
