//! [`ActuatorBank`] – the ordered actuator collection.
//!
//! The bank owns one boxed [`ActuatorHandle`] per configured actuator and a
//! shadow [`ActuatorTelemetry`] record alongside each. Every command goes
//! through a wrapper that updates the shadow, and every read refreshes it,
//! so the control logic always has a coherent last-known view even when an
//! individual read fails.
//!
//! Setup follows the servo bring-up sequence: reboot, torque off, request
//! current-based position mode, poll until the mode latches (bounded), then
//! push the position-loop PID gains.

use std::time::{Duration, Instant};

use grapnel_types::{GripError, GripperConfig};
use tracing::{debug, warn};

use crate::actuator::{ActuatorHandle, ControlMode};

// ────────────────────────────────────────────────────────────────────────────
// Shadow state
// ────────────────────────────────────────────────────────────────────────────

/// Last-known view of one actuator, maintained by the bank.
///
/// `last_position` is `None` until a position read succeeds and is cleared
/// by a reboot; a reading of zero is `Some(0.0)`, which is a different thing
/// entirely. `last_load` defaults to `0.0` until the first read.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorTelemetry {
    pub enabled: bool,
    pub current_limit: u16,
    pub target_position: Option<f32>,
    pub last_position: Option<f32>,
    pub last_load: f32,
    pub fault_code: u8,
}

impl ActuatorTelemetry {
    fn new(fault_free_code: u8) -> Self {
        Self {
            enabled: false,
            current_limit: 0,
            target_position: None,
            last_position: None,
            last_load: 0.0,
            fault_code: fault_free_code,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slot
// ────────────────────────────────────────────────────────────────────────────

/// One actuator plus its shadow record.
pub struct ActuatorSlot {
    handle: Box<dyn ActuatorHandle>,
    telemetry: ActuatorTelemetry,
}

impl ActuatorSlot {
    /// Stable identifier of the underlying actuator.
    pub fn id(&self) -> u8 {
        self.handle.id()
    }

    /// Last-known view of this actuator.
    pub fn telemetry(&self) -> &ActuatorTelemetry {
        &self.telemetry
    }

    /// Enable torque.
    pub fn enable(&mut self) -> Result<(), GripError> {
        self.handle.enable()?;
        self.telemetry.enabled = true;
        Ok(())
    }

    /// Disable torque.
    pub fn disable(&mut self) -> Result<(), GripError> {
        self.handle.disable()?;
        self.telemetry.enabled = false;
        Ok(())
    }

    /// Set the drive-current ceiling.
    pub fn set_current_limit(&mut self, limit: u16) -> Result<(), GripError> {
        self.handle.set_current_limit(limit)?;
        self.telemetry.current_limit = limit;
        Ok(())
    }

    /// Command a goal position.
    pub fn drive_to(&mut self, target: f32) -> Result<(), GripError> {
        self.handle.set_position(target)?;
        self.telemetry.target_position = Some(target);
        Ok(())
    }

    /// Read the shutdown register, updating the shadow.
    pub fn fault_code(&mut self) -> Result<u8, GripError> {
        let code = self.handle.fault_code()?;
        self.telemetry.fault_code = code;
        Ok(code)
    }

    /// Power-cycle the actuator. The shadow position becomes unknown:
    /// nothing read before the reboot is authoritative after it.
    pub fn reboot(&mut self) -> Result<(), GripError> {
        self.handle.reboot()?;
        self.telemetry.enabled = false;
        self.telemetry.target_position = None;
        self.telemetry.last_position = None;
        Ok(())
    }

    /// Read position and load, updating the last-knowns.
    ///
    /// A position read of `None` leaves `last_position` untouched — only a
    /// successful read is authoritative.
    pub fn refresh(&mut self) -> Result<(), GripError> {
        if let Some(p) = self.handle.position()? {
            self.telemetry.last_position = Some(p);
        }
        self.telemetry.last_load = self.handle.load()?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bank
// ────────────────────────────────────────────────────────────────────────────

/// The mechanism's actuators, in configuration order.
pub struct ActuatorBank {
    slots: Vec<ActuatorSlot>,
}

impl ActuatorBank {
    /// Build a bank from driver handles. Order is preserved; it defines the
    /// iteration order of every pass over the mechanism.
    pub fn new(handles: Vec<Box<dyn ActuatorHandle>>, fault_free_code: u8) -> Self {
        let slots = handles
            .into_iter()
            .map(|handle| ActuatorSlot {
                handle,
                telemetry: ActuatorTelemetry::new(fault_free_code),
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Actuator identifiers in bank order.
    pub fn ids(&self) -> Vec<u8> {
        self.slots.iter().map(|s| s.id()).collect()
    }

    pub fn slots(&self) -> &[ActuatorSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [ActuatorSlot] {
        &mut self.slots
    }

    /// Bring up every actuator: reboot, torque off, negotiate current-based
    /// position mode, push PID gains.
    ///
    /// # Errors
    ///
    /// Returns [`GripError::SetupTimeout`] if an actuator's operating mode
    /// does not latch within `mode_poll_timeout_ms` — fatal; the session
    /// must not start with an actuator in the wrong mode.
    pub fn setup(&mut self, config: &GripperConfig) -> Result<(), GripError> {
        for slot in &mut self.slots {
            slot.reboot()?;
            slot.disable()?;
            slot.handle.set_control_mode(ControlMode::CurrentBasedPosition)?;
            Self::wait_for_mode(
                slot,
                ControlMode::CurrentBasedPosition,
                Duration::from_millis(config.mode_poll_timeout_ms),
                Duration::from_millis(config.mode_poll_interval_ms),
            )?;
            slot.handle.set_position_pid(config.pid_gains)?;
            debug!(actuator = slot.id(), "actuator setup complete");
        }
        Ok(())
    }

    /// Read position and load on every actuator. Failures are isolated: a
    /// failing actuator is reported and the pass continues.
    pub fn refresh_all(&mut self) -> Vec<(u8, GripError)> {
        let mut failures = Vec::new();
        for slot in &mut self.slots {
            if let Err(e) = slot.refresh() {
                warn!(actuator = slot.id(), error = %e, "telemetry refresh failed");
                failures.push((slot.id(), e));
            }
        }
        failures
    }

    /// Best-effort teardown: torque off and current limit zero on every
    /// actuator, regardless of individual failures. This is the guaranteed
    /// release path — it must visit every slot on every exit.
    pub fn disable_all_and_zero(&mut self) -> Vec<(u8, GripError)> {
        let mut failures = Vec::new();
        for slot in &mut self.slots {
            if let Err(e) = slot.disable() {
                warn!(actuator = slot.id(), error = %e, "disable failed during teardown");
                failures.push((slot.id(), e));
            }
            if let Err(e) = slot.set_current_limit(0) {
                warn!(actuator = slot.id(), error = %e, "zeroing current limit failed during teardown");
                failures.push((slot.id(), e));
            }
        }
        failures
    }

    /// Poll the operating mode until `wanted` latches or `timeout` elapses.
    ///
    /// Bounded replacement for busy-waiting on the mode register: the servo
    /// applies the mode asynchronously, so a few polls are normal, but a
    /// servo that never latches must fail setup instead of hanging it.
    fn wait_for_mode(
        slot: &mut ActuatorSlot,
        wanted: ControlMode,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), GripError> {
        let start = Instant::now();
        loop {
            if slot.handle.control_mode()? == wanted {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(GripError::SetupTimeout {
                    actuator: slot.id(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            debug!(actuator = slot.id(), "waiting for operating mode to latch");
            std::thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
        }
    }
}
