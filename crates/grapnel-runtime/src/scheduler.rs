//! [`Scheduler`] – the fixed-rate session driver.
//!
//! One task owns the controller, the actuator bank, and the recorder, and
//! multiplexes four event sources on a single `select!` loop:
//!
//! - the 10 Hz state-machine tick,
//! - the independent 5 Hz telemetry sample / status refresh,
//! - the external request channel (engage / disengage envelopes),
//! - the shutdown watch.
//!
//! Single ownership is the point: the two periodic activities are scheduled
//! independently but can never interleave mid-command, because only one
//! branch of the loop runs at a time against the shared actuator state.
//! The shutdown watch doubles as the cancellation token — it aborts a
//! non-converging release (or anything else) from outside, and the teardown
//! path (torque off, current limits zeroed) runs on every way out of the
//! loop.

use std::time::Duration;

use grapnel_hal::ActuatorBank;
use grapnel_types::{GripRequest, RequestEnvelope};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::controller::AnchorController;
use crate::recorder::TelemetryRecorder;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// What the status surface (CLI today, a dashboard tomorrow) gets to show:
/// the state name and the latest per-actuator load/position summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: String,
    pub summary: String,
}

/// Counters accumulated over one session, returned from [`Scheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub ticks: u64,
    pub samples: usize,
    pub faults: u64,
    pub release_stalls: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one anchoring session to completion.
pub struct Scheduler {
    controller: AnchorController,
    bank: ActuatorBank,
    recorder: TelemetryRecorder,
    requests: mpsc::Receiver<RequestEnvelope>,
    status_tx: watch::Sender<StatusSnapshot>,
    shutdown: watch::Receiver<bool>,
    tick_period: Duration,
    sample_period: Duration,
}

impl Scheduler {
    pub fn new(
        controller: AnchorController,
        bank: ActuatorBank,
        recorder: TelemetryRecorder,
        requests: mpsc::Receiver<RequestEnvelope>,
        status_tx: watch::Sender<StatusSnapshot>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let tick_period = controller.config().tick_period();
        let sample_period = controller.config().sample_period();
        Self {
            controller,
            bank,
            recorder,
            requests,
            status_tx,
            shutdown,
            tick_period,
            sample_period,
        }
    }

    /// Run the session until shutdown is signalled or the request channel
    /// closes. Always tears the bank down (torque off, limits zeroed)
    /// before returning the recorder for export.
    pub async fn run(self) -> (TelemetryRecorder, SessionSummary) {
        let Scheduler {
            mut controller,
            mut bank,
            mut recorder,
            mut requests,
            status_tx,
            mut shutdown,
            tick_period,
            sample_period,
        } = self;

        let mut tick_timer = tokio::time::interval(tick_period);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sample_timer = tokio::time::interval(sample_period);
        sample_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        controller.start(&mut bank);
        status_tx.send_replace(snapshot(&controller, &recorder));

        let mut summary = SessionSummary::default();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown signalled; ending session");
                        break;
                    }
                }

                maybe = requests.recv() => match maybe {
                    Some(envelope) => {
                        info!(
                            id = %envelope.id,
                            source = %envelope.source,
                            request = ?envelope.request,
                            "external request received"
                        );
                        let result = match envelope.request {
                            GripRequest::Engage => controller.request_engage(&mut bank),
                            GripRequest::Disengage => controller.request_disengage(&mut bank),
                        };
                        match result {
                            Ok(true) => {
                                status_tx.send_replace(snapshot(&controller, &recorder));
                            }
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "request hit an actuator fault"),
                        }
                    }
                    None => {
                        info!("request channel closed; ending session");
                        break;
                    }
                },

                _ = tick_timer.tick() => {
                    let report = controller.tick(&mut bank);
                    summary.ticks += 1;
                    summary.faults += report.faults.len() as u64;
                    if report.release_stalled {
                        summary.release_stalls += 1;
                    }
                    if report.entered.is_some() {
                        status_tx.send_replace(snapshot(&controller, &recorder));
                    }
                }

                _ = sample_timer.tick() => {
                    recorder.sample(&mut bank);
                    status_tx.send_replace(snapshot(&controller, &recorder));
                }
            }
        }

        // Guaranteed-release teardown, on every exit path.
        info!("session teardown: disabling all actuators");
        let failures = bank.disable_all_and_zero();
        if !failures.is_empty() {
            warn!(failed = failures.len(), "teardown could not fully disable the bank");
        }
        summary.samples = recorder.samples().len();
        status_tx.send_replace(snapshot(&controller, &recorder));

        (recorder, summary)
    }
}

fn snapshot(controller: &AnchorController, recorder: &TelemetryRecorder) -> StatusSnapshot {
    StatusSnapshot {
        state: controller.status_name().to_string(),
        summary: recorder.status().to_string(),
    }
}
