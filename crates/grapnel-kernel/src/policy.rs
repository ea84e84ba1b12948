//! [`CommandPolicy`] – the state ↔ current-limit invariant.
//!
//! Every actuator command must carry a current limit consistent with the
//! anchoring state: 0 while idle, the grip limit while engaging and holding,
//! the max limit while releasing. The controller sources all commanded
//! limits from [`CommandPolicy::limit_for`]; tests (and any future command
//! gate) validate with [`CommandPolicy::check`].

use grapnel_types::{AnchorState, GripError, GripperConfig};

/// Maps anchoring states to the one current limit that may be commanded in
/// them.
#[derive(Debug, Clone, Copy)]
pub struct CommandPolicy {
    grip_current_limit: u16,
    max_current_limit: u16,
}

impl CommandPolicy {
    pub fn new(config: &GripperConfig) -> Self {
        Self {
            grip_current_limit: config.grip_current_limit,
            max_current_limit: config.max_current_limit,
        }
    }

    /// The current limit every command issued in `state` must carry.
    pub fn limit_for(&self, state: AnchorState) -> u16 {
        match state {
            AnchorState::Idle => 0,
            AnchorState::Engaging | AnchorState::Holding => self.grip_current_limit,
            AnchorState::Releasing => self.max_current_limit,
        }
    }

    /// Validate a proposed `(state, limit)` pair.
    pub fn check(&self, state: AnchorState, limit: u16) -> Result<(), GripError> {
        let expected = self.limit_for(state);
        if limit == expected {
            Ok(())
        } else {
            Err(GripError::Config(format!(
                "current limit {limit} violates {state} policy (expected {expected})"
            )))
        }
    }
}
