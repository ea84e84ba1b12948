//! In-process simulated servo for headless runs and CI.
//!
//! [`SimActuator`] implements [`ActuatorHandle`] over shared interior state,
//! and is `Clone`: tests (and the CLI's sim mode) keep one clone as a
//! scripting handle while another clone is boxed into the
//! [`ActuatorBank`][crate::bank::ActuatorBank]. Through the scripting handle
//! a test can set loads, present positions, and fault codes, inject read or
//! command failures, delay control-mode latching, and inspect the command
//! log.
//!
//! By default the sim tracks position commands instantly (a commanded
//! position becomes the present position), which is enough for the release
//! cycle to converge in a headless session. Disable tracking to model a
//! stalled actuator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grapnel_types::{FAULT_FREE_CODE, GripError, PidGains};

use crate::actuator::{ActuatorHandle, ControlMode};

/// A command observed by the sim, in issue order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    Enable,
    Disable,
    SetCurrentLimit(u16),
    SetPosition(f32),
    Reboot,
    SetControlMode(ControlMode),
    SetPid(PidGains),
}

struct SimState {
    id: u8,
    enabled: bool,
    current_limit: u16,
    position: Option<f32>,
    load: f32,
    fault_code: u8,
    latched_mode: ControlMode,
    requested_mode: Option<ControlMode>,
    /// Remaining `control_mode()` reads before a requested mode latches.
    mode_latch_reads: u32,
    pid: Option<PidGains>,
    track_commands: bool,
    fail_reads: bool,
    fail_commands: bool,
    reboots: u32,
    commands: Vec<SimCommand>,
}

/// Simulated servo sharing its state across clones.
#[derive(Clone)]
pub struct SimActuator {
    inner: Arc<Mutex<SimState>>,
}

impl SimActuator {
    /// Create a powered-down sim: torque off, no present-position reading,
    /// zero load, fault-free status, factory position mode.
    pub fn new(id: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                id,
                enabled: false,
                current_limit: 0,
                position: None,
                load: 0.0,
                fault_code: FAULT_FREE_CODE,
                latched_mode: ControlMode::Position,
                requested_mode: None,
                mode_latch_reads: 0,
                pid: None,
                track_commands: true,
                fail_reads: false,
                fail_commands: false,
                reboots: 0,
                commands: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io_error(&self, what: &str) -> GripError {
        GripError::HardwareFault {
            actuator: self.state().id,
            details: format!("simulated bus failure during {what}"),
        }
    }

    // ── Scripting surface ────────────────────────────────────────────────────

    /// Script the load reading.
    pub fn set_load(&self, load: f32) {
        self.state().load = load;
    }

    /// Script the present-position reading (`None` = register empty).
    pub fn set_present_position(&self, position: Option<f32>) {
        self.state().position = position;
    }

    /// Script the shutdown-register reading.
    pub fn set_fault_code(&self, code: u8) {
        self.state().fault_code = code;
    }

    /// Make every subsequent read fail (until cleared).
    pub fn set_read_failing(&self, failing: bool) {
        self.state().fail_reads = failing;
    }

    /// Make every subsequent command fail (until cleared).
    pub fn set_command_failing(&self, failing: bool) {
        self.state().fail_commands = failing;
    }

    /// When tracking is off, position commands no longer move the present
    /// position — the actuator is stuck.
    pub fn set_tracking(&self, tracking: bool) {
        self.state().track_commands = tracking;
    }

    /// Delay mode latching by `reads` calls to `control_mode()`.
    pub fn set_mode_latch_reads(&self, reads: u32) {
        self.state().mode_latch_reads = reads;
    }

    // ── Inspection surface ───────────────────────────────────────────────────

    pub fn enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn current_limit(&self) -> u16 {
        self.state().current_limit
    }

    pub fn present_position(&self) -> Option<f32> {
        self.state().position
    }

    pub fn pid_gains(&self) -> Option<PidGains> {
        self.state().pid
    }

    pub fn reboot_count(&self) -> u32 {
        self.state().reboots
    }

    /// Drain and return the command log.
    pub fn take_commands(&self) -> Vec<SimCommand> {
        std::mem::take(&mut self.state().commands)
    }
}

impl ActuatorHandle for SimActuator {
    fn id(&self) -> u8 {
        self.state().id
    }

    fn enable(&mut self) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("enable"));
        }
        let mut s = self.state();
        s.enabled = true;
        s.commands.push(SimCommand::Enable);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("disable"));
        }
        let mut s = self.state();
        s.enabled = false;
        s.commands.push(SimCommand::Disable);
        Ok(())
    }

    fn set_current_limit(&mut self, limit: u16) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("set_current_limit"));
        }
        let mut s = self.state();
        s.current_limit = limit;
        s.commands.push(SimCommand::SetCurrentLimit(limit));
        Ok(())
    }

    fn set_position(&mut self, target: f32) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("set_position"));
        }
        let mut s = self.state();
        if s.track_commands {
            s.position = Some(target);
        }
        s.commands.push(SimCommand::SetPosition(target));
        Ok(())
    }

    fn position(&mut self) -> Result<Option<f32>, GripError> {
        if self.state().fail_reads {
            return Err(self.io_error("position read"));
        }
        Ok(self.state().position)
    }

    fn load(&mut self) -> Result<f32, GripError> {
        if self.state().fail_reads {
            return Err(self.io_error("load read"));
        }
        Ok(self.state().load)
    }

    fn fault_code(&mut self) -> Result<u8, GripError> {
        if self.state().fail_reads {
            return Err(self.io_error("fault code read"));
        }
        Ok(self.state().fault_code)
    }

    fn reboot(&mut self) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("reboot"));
        }
        let mut s = self.state();
        s.enabled = false;
        s.position = None;
        s.fault_code = FAULT_FREE_CODE;
        s.reboots += 1;
        s.commands.push(SimCommand::Reboot);
        Ok(())
    }

    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("set_control_mode"));
        }
        let mut s = self.state();
        s.requested_mode = Some(mode);
        s.commands.push(SimCommand::SetControlMode(mode));
        Ok(())
    }

    fn control_mode(&mut self) -> Result<ControlMode, GripError> {
        if self.state().fail_reads {
            return Err(self.io_error("control mode read"));
        }
        let mut s = self.state();
        if let Some(requested) = s.requested_mode {
            if s.mode_latch_reads > 0 {
                s.mode_latch_reads -= 1;
            } else {
                s.latched_mode = requested;
                s.requested_mode = None;
            }
        }
        Ok(s.latched_mode)
    }

    fn set_position_pid(&mut self, gains: PidGains) -> Result<(), GripError> {
        if self.state().fail_commands {
            return Err(self.io_error("set_position_pid"));
        }
        let mut s = self.state();
        s.pid = Some(gains);
        s.commands.push(SimCommand::SetPid(gains));
        Ok(())
    }
}

/// Build a fully simulated bank for the configured actuator IDs, returning
/// the scripting handles alongside it.
pub fn sim_bank(config: &grapnel_types::GripperConfig) -> (crate::bank::ActuatorBank, Vec<SimActuator>) {
    let sims: Vec<SimActuator> = config.actuator_ids.iter().map(|&id| SimActuator::new(id)).collect();
    let handles = sims
        .iter()
        .map(|s| Box::new(s.clone()) as Box<dyn ActuatorHandle>)
        .collect();
    (
        crate::bank::ActuatorBank::new(handles, config.fault_free_code),
        sims,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let sim = SimActuator::new(1);
        let mut as_handle: Box<dyn ActuatorHandle> = Box::new(sim.clone());

        as_handle.enable().unwrap();
        as_handle.set_current_limit(150).unwrap();
        assert!(sim.enabled());
        assert_eq!(sim.current_limit(), 150);
    }

    #[test]
    fn position_commands_track_by_default() {
        let sim = SimActuator::new(1);
        let mut handle: Box<dyn ActuatorHandle> = Box::new(sim.clone());

        handle.set_position(1234.0).unwrap();
        assert_eq!(handle.position().unwrap(), Some(1234.0));

        sim.set_tracking(false);
        handle.set_position(9.0).unwrap();
        assert_eq!(handle.position().unwrap(), Some(1234.0));
    }

    #[test]
    fn reboot_restores_fault_free_status_and_drops_position() {
        let sim = SimActuator::new(1);
        let mut handle: Box<dyn ActuatorHandle> = Box::new(sim.clone());
        sim.set_fault_code(35);
        sim.set_present_position(Some(700.0));

        handle.reboot().unwrap();
        assert_eq!(handle.fault_code().unwrap(), FAULT_FREE_CODE);
        assert_eq!(handle.position().unwrap(), None);
        assert_eq!(sim.reboot_count(), 1);
    }

    #[test]
    fn scripted_read_failures_error_out() {
        let sim = SimActuator::new(9);
        let mut handle: Box<dyn ActuatorHandle> = Box::new(sim.clone());
        sim.set_read_failing(true);

        assert!(handle.position().is_err());
        assert!(handle.load().is_err());
        assert!(handle.fault_code().is_err());

        sim.set_read_failing(false);
        assert!(handle.load().is_ok());
    }

    #[test]
    fn mode_latch_delay_counts_reads() {
        let sim = SimActuator::new(1);
        let mut handle: Box<dyn ActuatorHandle> = Box::new(sim.clone());
        sim.set_mode_latch_reads(2);

        handle.set_control_mode(ControlMode::CurrentBasedPosition).unwrap();
        assert_eq!(handle.control_mode().unwrap(), ControlMode::Position);
        assert_eq!(handle.control_mode().unwrap(), ControlMode::Position);
        assert_eq!(handle.control_mode().unwrap(), ControlMode::CurrentBasedPosition);
    }

    #[test]
    fn sim_bank_builds_one_slot_per_configured_id() {
        let config = grapnel_types::GripperConfig::default();
        let (bank, sims) = sim_bank(&config);
        assert_eq!(bank.len(), 6);
        assert_eq!(bank.ids(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(sims.len(), 6);
    }
}
