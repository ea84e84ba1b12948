//! [`AnchorController`] – the anchoring state machine.
//!
//! Owns the [`AnchorState`] and evaluates it once per tick:
//!
//! 1. **Watchdog pass** – every actuator's shutdown register is checked (and
//!    a faulted unit rebooted) before the state policy can command it.
//! 2. **Telemetry refresh** – position and load last-knowns are updated,
//!    with per-actuator failures isolated.
//! 3. **State policy** – at most one transition per tick:
//!
//! | State | Entry action | Per-tick policy | Exit |
//! |---|---|---|---|
//! | IDLE | disable all, limit 0 | none | engage request |
//! | ENGAGING | enable all, grip limit, drive to engage angle | none (transient) | unconditional, next tick |
//! | HOLDING | grip limit on all | retract zero-load actuators with a known position | disengage request |
//! | RELEASING | — | drive stragglers home, bounded-retry reporting | all within threshold |
//!
//! Engagement is fire-and-forget: the position command goes out when the
//! engage request arrives, and HOLDING supervises it from the next tick on.
//! Holding re-seats the spines by walking any zero-load actuator backward
//! from its last known position; an actuator with no authoritative position
//! (fresh from a reboot) is left alone until a read succeeds.

use grapnel_hal::{ActuatorBank, ActuatorSlot};
use grapnel_kernel::{CommandPolicy, FaultStatus, FaultWatchdog};
use grapnel_types::{AnchorState, GripError, GripperConfig};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Tick report
// ─────────────────────────────────────────────────────────────────────────────

/// Observable record of one controller tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// State after the tick.
    pub state: AnchorState,
    /// The state entered this tick, if a transition happened.
    pub entered: Option<AnchorState>,
    /// `(actuator, fault code)` for every fault recovered this tick.
    pub faults: Vec<(u8, u8)>,
    /// Set on the tick where the release retry budget is exhausted.
    pub release_stalled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// AnchorController
// ─────────────────────────────────────────────────────────────────────────────

/// The anchoring state machine. One instance per session; all state lives
/// in explicit fields here, nothing is ambient.
pub struct AnchorController {
    config: GripperConfig,
    policy: CommandPolicy,
    watchdog: FaultWatchdog,
    state: AnchorState,
    /// Release ticks since the last disengage request.
    release_ticks: u32,
    /// A stall is reported once per disengage request.
    release_stall_reported: bool,
}

impl AnchorController {
    pub fn new(config: GripperConfig) -> Self {
        let policy = CommandPolicy::new(&config);
        let watchdog = FaultWatchdog::new(config.fault_free_code);
        Self {
            config,
            policy,
            watchdog,
            state: AnchorState::Idle,
            release_ticks: 0,
            release_stall_reported: false,
        }
    }

    pub fn state(&self) -> AnchorState {
        self.state
    }

    /// State name for the status surface.
    pub fn status_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn config(&self) -> &GripperConfig {
        &self.config
    }

    pub fn watchdog(&self) -> &FaultWatchdog {
        &self.watchdog
    }

    /// Run the IDLE entry action at session start: every actuator disabled
    /// at current limit 0.
    pub fn start(&mut self, bank: &mut ActuatorBank) {
        info!(actuators = bank.len(), "controller starting in IDLE");
        self.enter_idle(bank);
    }

    // -------------------------------------------------------------------------
    // External request entry points
    // -------------------------------------------------------------------------

    /// Begin engagement. Valid in IDLE only; ignored (with a warning)
    /// elsewhere. Returns whether the request was accepted.
    ///
    /// Entry action: every actuator enabled, grip current limit, driven to
    /// the engage angle.
    pub fn request_engage(&mut self, bank: &mut ActuatorBank) -> Result<bool, GripError> {
        if self.state != AnchorState::Idle {
            warn!(state = %self.state, "engage request ignored");
            return Ok(false);
        }
        info!("engage requested; driving spines to the engage angle");
        self.state = AnchorState::Engaging;
        let limit = self.policy.limit_for(AnchorState::Engaging);
        for slot in bank.slots_mut() {
            Self::drive(slot, limit, self.config.engage_angle)?;
        }
        Ok(true)
    }

    /// Begin disengagement. Cancels ENGAGING or HOLDING; in RELEASING it
    /// re-arms the retry budget. Ignored (with a warning) in IDLE. Returns
    /// whether the request was accepted.
    ///
    /// RELEASING has no entry commands: the next tick issues the home drive
    /// to every actuator that has not arrived.
    pub fn request_disengage(&mut self, _bank: &mut ActuatorBank) -> Result<bool, GripError> {
        match self.state {
            AnchorState::Idle => {
                warn!("disengage request ignored; nothing is engaged");
                Ok(false)
            }
            AnchorState::Releasing => {
                info!("disengage re-requested; re-arming the release retry budget");
                self.release_ticks = 0;
                self.release_stall_reported = false;
                Ok(true)
            }
            AnchorState::Engaging | AnchorState::Holding => {
                info!(from = %self.state, "disengage requested; driving spines home");
                self.state = AnchorState::Releasing;
                self.release_ticks = 0;
                self.release_stall_reported = false;
                Ok(true)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance the state machine by one cycle.
    ///
    /// Never blocks beyond the per-actuator register round-trips, performs
    /// at most one state transition, and isolates per-actuator I/O failures
    /// (a failing actuator is skipped for the tick, not fatal).
    pub fn tick(&mut self, bank: &mut ActuatorBank) -> TickReport {
        // ── Watchdog pass ──────────────────────────────────────────────────────
        let mut faults = Vec::new();
        for slot in bank.slots_mut() {
            match self.watchdog.check(slot) {
                Ok(FaultStatus::Faulted { code }) => faults.push((slot.id(), code)),
                Ok(FaultStatus::Nominal) => {}
                Err(e) => warn!(actuator = slot.id(), error = %e, "watchdog check failed"),
            }
        }

        // ── Telemetry refresh ──────────────────────────────────────────────────
        // Failures are logged and isolated inside the bank; the policy runs
        // on the last-known values either way.
        let _ = bank.refresh_all();

        // ── State policy ───────────────────────────────────────────────────────
        let mut entered = None;
        let mut release_stalled = false;
        match self.state {
            AnchorState::Idle => {}

            AnchorState::Engaging => {
                // The engage command already went out with the request; from
                // here HOLDING supervises it. Unconditional.
                let limit = self.policy.limit_for(AnchorState::Holding);
                for slot in bank.slots_mut() {
                    if let Err(e) = slot.set_current_limit(limit) {
                        warn!(actuator = slot.id(), error = %e, "grip limit command failed");
                    }
                }
                self.state = AnchorState::Holding;
                entered = Some(AnchorState::Holding);
                info!("engage command issued; supervising hold");
            }

            AnchorState::Holding => {
                let limit = self.policy.limit_for(AnchorState::Holding);
                let retract = self.config.retract_step;
                for slot in bank.slots_mut() {
                    if slot.telemetry().last_load != 0.0 {
                        continue;
                    }
                    // Zero load: the spine lost contact or the servo shed
                    // torque. Walk it backward from its last known position.
                    let Some(position) = slot.telemetry().last_position else {
                        // Fresh from a reboot: no authoritative position to
                        // retract from. Leave it until a read succeeds.
                        debug!(
                            actuator = slot.id(),
                            "zero load with unknown position; skipping this tick"
                        );
                        continue;
                    };
                    let target = position - retract;
                    debug!(actuator = slot.id(), target, "zero load; retracting to re-seat");
                    if let Err(e) = Self::drive(slot, limit, target) {
                        warn!(actuator = slot.id(), error = %e, "retract command failed");
                    }
                }
            }

            AnchorState::Releasing => {
                let limit = self.policy.limit_for(AnchorState::Releasing);
                let home = self.config.home_angle;
                let threshold = self.config.moving_threshold;
                let mut all_arrived = true;
                for slot in bank.slots_mut() {
                    // An unknown position is never "arrived".
                    let arrived = matches!(
                        slot.telemetry().last_position,
                        Some(p) if (home - p).abs() <= threshold
                    );
                    if arrived {
                        continue;
                    }
                    all_arrived = false;
                    if let Err(e) = Self::drive(slot, limit, home) {
                        warn!(actuator = slot.id(), error = %e, "home command failed");
                    }
                }

                if all_arrived {
                    info!("all spines within threshold of home; release complete");
                    self.enter_idle(bank);
                    entered = Some(AnchorState::Idle);
                } else {
                    self.release_ticks += 1;
                    if self.release_ticks == self.config.release_retry_limit
                        && !self.release_stall_reported
                    {
                        warn!(
                            ticks = self.release_ticks,
                            "release has not converged within the retry budget; continuing to retry"
                        );
                        self.release_stall_reported = true;
                        release_stalled = true;
                    }
                }
            }
        }

        TickReport {
            state: self.state,
            entered,
            faults,
            release_stalled,
        }
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Enable + current limit + goal position, the full drive command.
    fn drive(slot: &mut ActuatorSlot, limit: u16, target: f32) -> Result<(), GripError> {
        slot.enable()?;
        slot.set_current_limit(limit)?;
        slot.drive_to(target)
    }

    /// IDLE entry action: zero every current limit and disable torque.
    fn enter_idle(&mut self, bank: &mut ActuatorBank) {
        self.state = AnchorState::Idle;
        self.release_ticks = 0;
        self.release_stall_reported = false;
        let failures = bank.disable_all_and_zero();
        if !failures.is_empty() {
            warn!(failed = failures.len(), "some actuators failed to disable on IDLE entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapnel_hal::{SimActuator, SimCommand, sim_bank};
    use grapnel_types::FAULT_FREE_CODE;

    fn fixture(config: GripperConfig) -> (AnchorController, ActuatorBank, Vec<SimActuator>) {
        let (bank, sims) = sim_bank(&config);
        (AnchorController::new(config), bank, sims)
    }

    fn settle(sims: &[SimActuator], position: f32, load: f32) {
        for sim in sims {
            sim.set_present_position(Some(position));
            sim.set_load(load);
        }
    }

    #[test]
    fn startup_disables_everything() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        assert_eq!(ctl.state(), AnchorState::Idle);
        for sim in &sims {
            assert!(!sim.enabled());
            assert_eq!(sim.current_limit(), 0);
        }
    }

    #[test]
    fn idle_is_a_fixed_point() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        for sim in &sims {
            sim.take_commands();
        }

        for _ in 0..5 {
            let report = ctl.tick(&mut bank);
            assert_eq!(report.state, AnchorState::Idle);
            assert_eq!(report.entered, None);
        }
        for sim in &sims {
            assert_eq!(sim.current_limit(), 0);
            // No drive commands while idle.
            assert!(
                sim.take_commands()
                    .iter()
                    .all(|c| !matches!(c, SimCommand::SetPosition(_) | SimCommand::Enable))
            );
        }
    }

    #[test]
    fn engage_request_runs_the_entry_action() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);

        assert!(ctl.request_engage(&mut bank).unwrap());
        assert_eq!(ctl.state(), AnchorState::Engaging);
        for sim in &sims {
            assert!(sim.enabled());
            assert_eq!(sim.current_limit(), 221);
            assert_eq!(sim.present_position(), Some(0.0));
        }
    }

    #[test]
    fn engage_request_is_ignored_outside_idle() {
        let (mut ctl, mut bank, _sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        assert!(ctl.request_engage(&mut bank).unwrap());
        assert!(!ctl.request_engage(&mut bank).unwrap());
        ctl.tick(&mut bank);
        assert_eq!(ctl.state(), AnchorState::Holding);
        assert!(!ctl.request_engage(&mut bank).unwrap());
    }

    #[test]
    fn engaging_transitions_to_holding_on_the_very_next_tick() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();

        // Readings are irrelevant: the transition is unconditional.
        sims[0].set_load(0.0);
        sims[1].set_load(3.5);
        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Holding);
        assert_eq!(report.entered, Some(AnchorState::Holding));
        for sim in &sims {
            assert_eq!(sim.current_limit(), 221);
        }
    }

    #[test]
    fn holding_retracts_zero_load_actuators_with_known_position() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank); // -> HOLDING

        // Loaded spines stay put; the slack one gets walked backward.
        settle(&sims, 1000.0, 2.0);
        sims[2].set_load(0.0);
        for sim in &sims {
            sim.take_commands();
        }

        ctl.tick(&mut bank);
        assert_eq!(sims[2].present_position(), Some(800.0));
        let commands = sims[2].take_commands();
        assert!(commands.contains(&SimCommand::SetPosition(800.0)));
        assert!(commands.contains(&SimCommand::SetCurrentLimit(221)));
        for (i, sim) in sims.iter().enumerate() {
            if i != 2 {
                assert!(sim.take_commands().is_empty());
            }
        }
    }

    #[test]
    fn holding_skips_zero_load_actuators_with_unknown_position() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank); // -> HOLDING

        settle(&sims, 1000.0, 2.0);
        // Actuator 4 looks fresh from a reboot: zero load, no reading.
        sims[3].set_load(0.0);
        sims[3].set_present_position(None);
        bank.slots_mut()[3].reboot().unwrap();
        for sim in &sims {
            sim.take_commands();
        }

        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Holding);
        assert!(sims[3].take_commands().is_empty());
    }

    #[test]
    fn holding_does_not_exit_on_its_own() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);

        settle(&sims, 1000.0, 0.0);
        for _ in 0..10 {
            assert_eq!(ctl.tick(&mut bank).state, AnchorState::Holding);
        }
    }

    #[test]
    fn releasing_converges_to_idle_and_zeroes_limits() {
        let config = GripperConfig::default();
        let home = config.home_angle;
        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);
        assert!(ctl.request_disengage(&mut bank).unwrap());
        assert_eq!(ctl.state(), AnchorState::Releasing);

        // Sims track the home command, so the next tick drives them within
        // threshold and the one after observes the arrival.
        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Releasing);
        for sim in &sims {
            assert_eq!(sim.present_position(), Some(home));
            assert_eq!(sim.current_limit(), 221);
        }

        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Idle);
        assert_eq!(report.entered, Some(AnchorState::Idle));
        for sim in &sims {
            assert_eq!(sim.current_limit(), 0);
            assert!(!sim.enabled());
        }
    }

    #[test]
    fn releasing_reissues_only_to_stragglers() {
        let config = GripperConfig::default();
        let home = config.home_angle;
        let threshold = config.moving_threshold;
        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);
        ctl.request_disengage(&mut bank).unwrap();

        // Five spines already home, one stuck short of the threshold.
        settle(&sims, home - threshold / 2.0, 1.0);
        sims[5].set_present_position(Some(home - 500.0));
        sims[5].set_tracking(false);
        for sim in &sims {
            sim.take_commands();
        }

        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Releasing);
        for sim in sims.iter().take(5) {
            assert!(sim.take_commands().is_empty(), "arrived spine was re-commanded");
        }
        let straggler = sims[5].take_commands();
        assert!(straggler.contains(&SimCommand::SetPosition(home)));
        assert!(straggler.contains(&SimCommand::SetCurrentLimit(221)));
        assert!(straggler.contains(&SimCommand::Enable));
    }

    #[test]
    fn releasing_treats_unknown_position_as_not_arrived() {
        let config = GripperConfig::default();
        let home = config.home_angle;
        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);
        ctl.request_disengage(&mut bank).unwrap();

        settle(&sims, home, 1.0);
        bank.slots_mut()[0].reboot().unwrap();
        sims[0].set_present_position(None);
        sims[0].set_tracking(false);

        let report = ctl.tick(&mut bank);
        assert_eq!(report.state, AnchorState::Releasing);
    }

    #[test]
    fn release_stall_is_reported_once_per_request() {
        let config = GripperConfig {
            release_retry_limit: 3,
            ..GripperConfig::default()
        };
        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);
        ctl.request_disengage(&mut bank).unwrap();

        // Jammed mechanism: nothing moves.
        settle(&sims, 100.0, 1.0);
        for sim in &sims {
            sim.set_tracking(false);
        }

        let mut stall_reports = 0;
        for _ in 0..8 {
            let report = ctl.tick(&mut bank);
            assert_eq!(report.state, AnchorState::Releasing);
            if report.release_stalled {
                stall_reports += 1;
            }
        }
        assert_eq!(stall_reports, 1);

        // A fresh disengage request re-arms the budget.
        ctl.request_disengage(&mut bank).unwrap();
        let mut stall_reports = 0;
        for _ in 0..8 {
            if ctl.tick(&mut bank).release_stalled {
                stall_reports += 1;
            }
        }
        assert_eq!(stall_reports, 1);
    }

    #[test]
    fn disengage_cancels_engaging_directly() {
        let (mut ctl, mut bank, _sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        assert_eq!(ctl.state(), AnchorState::Engaging);
        assert!(ctl.request_disengage(&mut bank).unwrap());
        assert_eq!(ctl.state(), AnchorState::Releasing);
    }

    #[test]
    fn disengage_is_ignored_in_idle() {
        let (mut ctl, mut bank, _sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        assert!(!ctl.request_disengage(&mut bank).unwrap());
        assert_eq!(ctl.state(), AnchorState::Idle);
    }

    #[test]
    fn tick_recovers_faulted_actuators_before_commanding() {
        let (mut ctl, mut bank, sims) = fixture(GripperConfig::default());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);

        sims[1].set_fault_code(5);
        let report = ctl.tick(&mut bank);
        assert_eq!(report.faults, vec![(2, 5)]);
        assert_eq!(sims[1].reboot_count(), 1);
        assert_eq!(ctl.watchdog().reboot_count(2), 1);
    }

    #[test]
    fn transition_destinations_match_the_state_table() {
        // From every state, a tick lands only on the destinations the table
        // allows.
        let config = GripperConfig::default();
        let home = config.home_angle;

        // IDLE -> IDLE
        let (mut ctl, mut bank, _sims) = fixture(config.clone());
        ctl.start(&mut bank);
        assert_eq!(ctl.tick(&mut bank).state, AnchorState::Idle);

        // ENGAGING -> HOLDING
        let (mut ctl, mut bank, _sims) = fixture(config.clone());
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        assert_eq!(ctl.tick(&mut bank).state, AnchorState::Holding);

        // HOLDING -> HOLDING
        assert_eq!(ctl.tick(&mut bank).state, AnchorState::Holding);

        // RELEASING -> RELEASING or IDLE
        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);
        ctl.request_engage(&mut bank).unwrap();
        ctl.tick(&mut bank);
        ctl.request_disengage(&mut bank).unwrap();
        settle(&sims, 0.0, 1.0);
        for sim in &sims {
            sim.set_tracking(false);
        }
        assert_eq!(ctl.tick(&mut bank).state, AnchorState::Releasing);
        settle(&sims, home, 1.0);
        assert_eq!(ctl.tick(&mut bank).state, AnchorState::Idle);
    }

    #[test]
    fn six_spine_example_scenario() {
        // 6 actuators, grip limit 221, fault-free code 53: engage ->
        // ENGAGING -> next tick HOLDING with all limits 221; disengage ->
        // RELEASING; once all are within threshold -> IDLE with limits 0.
        let config = GripperConfig::default();
        assert_eq!(config.grip_current_limit, 221);
        assert_eq!(config.fault_free_code, FAULT_FREE_CODE);

        let (mut ctl, mut bank, sims) = fixture(config);
        ctl.start(&mut bank);

        ctl.request_engage(&mut bank).unwrap();
        assert_eq!(ctl.state(), AnchorState::Engaging);

        ctl.tick(&mut bank);
        assert_eq!(ctl.state(), AnchorState::Holding);
        assert!(sims.iter().all(|s| s.current_limit() == 221));

        ctl.request_disengage(&mut bank).unwrap();
        assert_eq!(ctl.state(), AnchorState::Releasing);

        let mut ticks = 0;
        while ctl.state() == AnchorState::Releasing {
            ctl.tick(&mut bank);
            ticks += 1;
            assert!(ticks < 10, "release did not converge");
        }
        assert_eq!(ctl.state(), AnchorState::Idle);
        assert!(sims.iter().all(|s| s.current_limit() == 0));
    }
}
