//! `grapnel-kernel` – Safety & Supervision
//!
//! The layer between the anchoring state machine and the actuators. It does
//! not decide anything about the anchoring cycle; it enforces rules and
//! recovers faulted hardware.
//!
//! # Modules
//!
//! - [`watchdog`] – [`FaultWatchdog`][watchdog::FaultWatchdog]:
//!   reads each actuator's shutdown register every control cycle and
//!   power-cycles any actuator whose status deviates from the configured
//!   fault-free value, before the state policy can command it.
//! - [`policy`] – [`CommandPolicy`][policy::CommandPolicy]:
//!   the single source of truth for the state ↔ current-limit invariant
//!   (idle actuators at limit 0, gripping at the grip limit, releasing at
//!   the max limit).

pub mod policy;
pub mod watchdog;

pub use policy::CommandPolicy;
pub use watchdog::{FaultStatus, FaultWatchdog};
