//! [`FaultWatchdog`] – per-cycle actuator fault recovery.
//!
//! Every control tick, before the state policy runs, the watchdog reads each
//! actuator's shutdown register. A healthy unit reports the configured
//! fault-free value; anything else means a protection latched (overload,
//! voltage, temperature, …) and the servo has cut torque. The recovery is a
//! reboot: the servo comes back up fault-free with torque off and an empty
//! present-position register, and the state policy re-commands it on the
//! following ticks.
//!
//! A nominal check has no side effect, so checking repeatedly is free;
//! exactly one reboot is issued per detected fault occurrence.

use std::collections::HashMap;

use grapnel_hal::ActuatorSlot;
use grapnel_types::GripError;
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one watchdog check on one actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    /// Shutdown register read the fault-free value; nothing was done.
    Nominal,
    /// A fault was latched; the actuator has been rebooted.
    Faulted { code: u8 },
}

// ────────────────────────────────────────────────────────────────────────────
// FaultWatchdog
// ────────────────────────────────────────────────────────────────────────────

/// Detects latched actuator faults and reboots the affected unit.
pub struct FaultWatchdog {
    fault_free_code: u8,
    reboots: HashMap<u8, u32>,
}

impl FaultWatchdog {
    /// Create a watchdog that treats `fault_free_code` as the healthy
    /// shutdown-register value.
    pub fn new(fault_free_code: u8) -> Self {
        Self {
            fault_free_code,
            reboots: HashMap::new(),
        }
    }

    /// Check one actuator: read its fault code and reboot it if a fault is
    /// latched.
    ///
    /// # Errors
    ///
    /// Propagates read/reboot I/O failures; the caller decides whether to
    /// isolate them (the controller skips the actuator for the tick).
    pub fn check(&mut self, slot: &mut ActuatorSlot) -> Result<FaultStatus, GripError> {
        let code = slot.fault_code()?;
        if code == self.fault_free_code {
            return Ok(FaultStatus::Nominal);
        }

        warn!(
            actuator = slot.id(),
            code, "actuator fault latched; rebooting"
        );
        slot.reboot()?;
        *self.reboots.entry(slot.id()).or_insert(0) += 1;
        Ok(FaultStatus::Faulted { code })
    }

    /// Number of fault-triggered reboots issued to `actuator` this session.
    pub fn reboot_count(&self, actuator: u8) -> u32 {
        self.reboots.get(&actuator).copied().unwrap_or(0)
    }

    /// Total fault-triggered reboots across all actuators this session.
    pub fn total_reboots(&self) -> u32 {
        self.reboots.values().sum()
    }
}
