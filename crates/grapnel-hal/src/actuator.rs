//! [`ActuatorHandle`] – capability set of one physical servo.
//!
//! Drivers implement this trait over whatever transport the mechanism uses
//! (serial servo bus, CAN, simulation). The controller and watchdog only
//! ever see the trait, so the register encoding and port management stay
//! out of the control logic entirely.
//!
//! All methods take `&mut self`: every call is a transaction on a shared
//! half-duplex bus, and reads are as stateful as writes.

use grapnel_types::{GripError, PidGains};

/// Servo operating mode, as exposed by the vendor's operating-mode register.
///
/// The anchoring controller requires [`ControlMode::CurrentBasedPosition`]:
/// position control with the commanded current limit acting as the torque
/// ceiling, which is what turns "current limit" into a grip-force proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Current,
    Velocity,
    Position,
    ExtendedPosition,
    CurrentBasedPosition,
    Pwm,
}

/// One physical motor of the anchoring mechanism.
///
/// Identifiers are stable across the session and match the configured
/// `actuator_ids`. Position reads return `None` while the present-position
/// register has no authoritative content (e.g. before the first feedback
/// frame after a reboot); that is not an error.
pub trait ActuatorHandle: Send {
    /// Stable identifier of this actuator (1..N).
    fn id(&self) -> u8;

    /// Enable torque output.
    fn enable(&mut self) -> Result<(), GripError>;

    /// Disable torque output.
    fn disable(&mut self) -> Result<(), GripError>;

    /// Set the drive-current ceiling, in the servo's current units.
    fn set_current_limit(&mut self, limit: u16) -> Result<(), GripError>;

    /// Command a goal position, in the servo's position units.
    fn set_position(&mut self, target: f32) -> Result<(), GripError>;

    /// Read the present position. `Ok(None)` when no reading is available.
    fn position(&mut self) -> Result<Option<f32>, GripError>;

    /// Read the present load, in kilograms-force on the spine.
    fn load(&mut self) -> Result<f32, GripError>;

    /// Read the hardware-error (shutdown) status register.
    fn fault_code(&mut self) -> Result<u8, GripError>;

    /// Power-cycle the servo. Torque is off and the present-position
    /// register is empty until the servo comes back up.
    fn reboot(&mut self) -> Result<(), GripError>;

    /// Request an operating mode. The mode latches asynchronously; confirm
    /// via [`control_mode`][Self::control_mode].
    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), GripError>;

    /// Read the currently latched operating mode.
    fn control_mode(&mut self) -> Result<ControlMode, GripError>;

    /// Push position-loop PID gains to the servo's internal controller.
    fn set_position_pid(&mut self, gains: PidGains) -> Result<(), GripError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process handle used only to pin down the trait contract.
    struct MockServo {
        id: u8,
        enabled: bool,
        present: Option<f32>,
    }

    impl ActuatorHandle for MockServo {
        fn id(&self) -> u8 {
            self.id
        }
        fn enable(&mut self) -> Result<(), GripError> {
            self.enabled = true;
            Ok(())
        }
        fn disable(&mut self) -> Result<(), GripError> {
            self.enabled = false;
            Ok(())
        }
        fn set_current_limit(&mut self, _limit: u16) -> Result<(), GripError> {
            Ok(())
        }
        fn set_position(&mut self, target: f32) -> Result<(), GripError> {
            self.present = Some(target);
            Ok(())
        }
        fn position(&mut self) -> Result<Option<f32>, GripError> {
            Ok(self.present)
        }
        fn load(&mut self) -> Result<f32, GripError> {
            Ok(0.0)
        }
        fn fault_code(&mut self) -> Result<u8, GripError> {
            Ok(grapnel_types::FAULT_FREE_CODE)
        }
        fn reboot(&mut self) -> Result<(), GripError> {
            self.enabled = false;
            self.present = None;
            Ok(())
        }
        fn set_control_mode(&mut self, _mode: ControlMode) -> Result<(), GripError> {
            Ok(())
        }
        fn control_mode(&mut self) -> Result<ControlMode, GripError> {
            Ok(ControlMode::CurrentBasedPosition)
        }
        fn set_position_pid(&mut self, _gains: PidGains) -> Result<(), GripError> {
            Ok(())
        }
    }

    #[test]
    fn position_is_none_until_commanded_and_none_after_reboot() {
        let mut servo = MockServo {
            id: 1,
            enabled: false,
            present: None,
        };
        assert_eq!(servo.position().unwrap(), None);

        servo.set_position(2048.0).unwrap();
        assert_eq!(servo.position().unwrap(), Some(2048.0));

        servo.reboot().unwrap();
        assert_eq!(servo.position().unwrap(), None);
        assert!(!servo.enabled);
    }

    #[test]
    fn trait_is_object_safe() {
        let mut boxed: Box<dyn ActuatorHandle> = Box::new(MockServo {
            id: 7,
            enabled: false,
            present: None,
        });
        assert_eq!(boxed.id(), 7);
        boxed.enable().unwrap();
    }
}
