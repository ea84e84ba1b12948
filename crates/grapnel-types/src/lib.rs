use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Hardware-error status value reported by the servo when no shutdown
/// condition is latched.
///
/// This is a vendor calibration constant: the shutdown register packs the
/// individually-enabled protection bits (input voltage, overheating,
/// electrical shock, overload, …) and reads `53` on a healthy unit with the
/// factory protection mask. The watchdog treats any other value as a fault
/// requiring a reboot.
pub const FAULT_FREE_CODE: u8 = 53;

// ─────────────────────────────────────────────────────────────────────────────
// Anchoring state
// ─────────────────────────────────────────────────────────────────────────────

/// The anchoring cycle state, owned exclusively by the controller.
///
/// Transitions form a closed cycle Idle → Engaging → Holding → Releasing →
/// Idle. Releasing may self-loop while actuators are still travelling home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorState {
    /// All actuators disabled at current limit 0. Rest state.
    Idle,
    /// Transient: the engage command was just issued; supervision starts on
    /// the next tick.
    Engaging,
    /// Gripped. Zero-load actuators are incrementally retracted to re-seat
    /// the spines.
    Holding,
    /// Driving every actuator back to the home angle.
    Releasing,
}

impl AnchorState {
    /// Status-surface name of the state (`IDLE`, `ENGAGING`, …).
    pub fn name(&self) -> &'static str {
        match self {
            AnchorState::Idle => "IDLE",
            AnchorState::Engaging => "ENGAGING",
            AnchorState::Holding => "HOLDING",
            AnchorState::Releasing => "RELEASING",
        }
    }
}

impl fmt::Display for AnchorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Position-loop PID gains pushed to each servo's internal controller during
/// setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: u16,
    pub i: u16,
    pub d: u16,
}

impl Default for PidGains {
    fn default() -> Self {
        Self { p: 800, i: 0, d: 0 }
    }
}

/// Immutable gripper calibration and policy, supplied at construction.
///
/// The angle, limit, gain, and threshold defaults are the bench calibration
/// of the six-spine prototype; override them via the config file for other
/// mechanisms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GripperConfig {
    /// Target position for the gripped configuration.
    #[serde(default = "default_engage_angle")]
    pub engage_angle: f32,

    /// Target position for the released configuration.
    #[serde(default = "default_home_angle")]
    pub home_angle: f32,

    /// Current limit used while driving home during release.
    #[serde(default = "default_current_limit")]
    pub max_current_limit: u16,

    /// Current limit used while engaging and holding.
    #[serde(default = "default_current_limit")]
    pub grip_current_limit: u16,

    /// Gains for the servo-internal position loop.
    #[serde(default)]
    pub pid_gains: PidGains,

    /// Tolerance window for considering an actuator arrived at a target.
    #[serde(default = "default_moving_threshold")]
    pub moving_threshold: f32,

    /// Expected shutdown-register value on a healthy actuator.
    #[serde(default = "default_fault_free_code")]
    pub fault_free_code: u8,

    /// Ordered identifiers of the actuators in the mechanism.
    #[serde(default = "default_actuator_ids")]
    pub actuator_ids: Vec<u8>,

    /// How far to retract past the last known position when a holding
    /// actuator reads zero load.
    #[serde(default = "default_retract_step")]
    pub retract_step: f32,

    /// Number of release ticks without convergence before the stall is
    /// reported. Retries continue after the report.
    #[serde(default = "default_release_retry_limit")]
    pub release_retry_limit: u32,

    /// Upper bound on the control-mode negotiation wait during setup.
    #[serde(default = "default_mode_poll_timeout_ms")]
    pub mode_poll_timeout_ms: u64,

    /// Poll interval while waiting for the control mode to latch.
    #[serde(default = "default_mode_poll_interval_ms")]
    pub mode_poll_interval_ms: u64,

    /// State-machine tick period.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Telemetry sampling / status refresh period.
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,
}

fn default_engage_angle() -> f32 {
    0.0
}
fn default_home_angle() -> f32 {
    4095.0
}
fn default_current_limit() -> u16 {
    221
}
fn default_moving_threshold() -> f32 {
    20.0
}
fn default_fault_free_code() -> u8 {
    FAULT_FREE_CODE
}
fn default_actuator_ids() -> Vec<u8> {
    vec![1, 2, 3, 4, 5, 6]
}
fn default_retract_step() -> f32 {
    200.0
}
fn default_release_retry_limit() -> u32 {
    100
}
fn default_mode_poll_timeout_ms() -> u64 {
    2000
}
fn default_mode_poll_interval_ms() -> u64 {
    10
}
fn default_tick_period_ms() -> u64 {
    100
}
fn default_sample_period_ms() -> u64 {
    200
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            engage_angle: default_engage_angle(),
            home_angle: default_home_angle(),
            max_current_limit: default_current_limit(),
            grip_current_limit: default_current_limit(),
            pid_gains: PidGains::default(),
            moving_threshold: default_moving_threshold(),
            fault_free_code: default_fault_free_code(),
            actuator_ids: default_actuator_ids(),
            retract_step: default_retract_step(),
            release_retry_limit: default_release_retry_limit(),
            mode_poll_timeout_ms: default_mode_poll_timeout_ms(),
            mode_poll_interval_ms: default_mode_poll_interval_ms(),
            tick_period_ms: default_tick_period_ms(),
            sample_period_ms: default_sample_period_ms(),
        }
    }
}

impl GripperConfig {
    /// State-machine tick period as a [`Duration`].
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Telemetry sampling period as a [`Duration`].
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded position/load reading for one actuator.
///
/// Samples are immutable once created and are appended to an append-only
/// sequence for the lifetime of the session. `position` is `None` when no
/// successful position read was available at sampling time — distinct from a
/// reading of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Time since controller start.
    pub elapsed: Duration,
    pub actuator_id: u8,
    pub position: Option<f32>,
    pub load: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// External requests
// ─────────────────────────────────────────────────────────────────────────────

/// An external command into the anchoring controller.
///
/// Whatever surface produces these (CLI, dashboard, remote operator) posts
/// request messages; the controller consumes them through its public entry
/// points. No surface mutates controller state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripRequest {
    Engage,
    Disengage,
}

/// A [`GripRequest`] wrapped with provenance for logging and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    /// e.g. `"grapnel-cli"`.
    pub source: String,
    pub request: GripRequest,
}

impl RequestEnvelope {
    /// Stamp a fresh envelope around `request`.
    pub fn new(source: impl Into<String>, request: GripRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            issued_at: Utc::now(),
            source: source.into(),
            request,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type spanning actuator I/O, setup negotiation, configuration, and
/// telemetry export.
#[derive(Error, Debug)]
pub enum GripError {
    #[error("Hardware fault on actuator {actuator}: {details}")]
    HardwareFault { actuator: u8, details: String },

    #[error("Actuator {actuator} did not reach the required control mode within {waited_ms} ms")]
    SetupTimeout { actuator: u8, waited_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry export failed: {0}")]
    Export(String),
}
