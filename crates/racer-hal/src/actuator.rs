//! Generic `Actuator` trait for the throttle/steering output stage.
//!
//! The control loop owns exactly one actuator for its whole lifetime and is
//! the only writer.  Commands are fire-and-forget: each call to
//! [`Actuator::set`] fully replaces the previous command and nothing is
//! queued.

use racer_types::{ActuationCommand, RacerError};

/// The vehicle's drive output (ESC throttle plus steering servo).
///
/// Drivers clamp commands to their own physical range; the trait passes
/// values through untouched.
pub trait Actuator: Send + Sync {
    /// Stable identifier for this actuator, e.g. `"racecar"`.
    fn id(&self) -> &str;

    /// Check that the device is reachable.  Called once at acquisition time.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] when the device cannot be opened.
    fn probe(&mut self) -> Result<(), RacerError> {
        Ok(())
    }

    /// Apply `cmd` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::SensorFailure`] if the command cannot be written
    /// (e.g. the PWM bus is gone).
    fn set(&mut self, cmd: ActuationCommand) -> Result<(), RacerError>;

    /// Drive the output to [`ActuationCommand::NEUTRAL`].
    fn stop(&mut self) -> Result<(), RacerError> {
        self.set(ActuationCommand::NEUTRAL)
    }

    /// The most recently applied command.
    fn last_command(&self) -> ActuationCommand;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process actuator used only for tests.
    struct MockActuator {
        id: String,
        last: ActuationCommand,
    }

    impl Actuator for MockActuator {
        fn id(&self) -> &str {
            &self.id
        }

        fn set(&mut self, cmd: ActuationCommand) -> Result<(), RacerError> {
            self.last = cmd;
            Ok(())
        }

        fn last_command(&self) -> ActuationCommand {
            self.last
        }
    }

    #[test]
    fn set_then_stop_returns_to_neutral() {
        let mut act = MockActuator {
            id: "racecar".to_string(),
            last: ActuationCommand::NEUTRAL,
        };
        assert_eq!(act.id(), "racecar");

        act.set(ActuationCommand::new(-0.005, 0.4)).unwrap();
        assert_eq!(act.last_command(), ActuationCommand::new(-0.005, 0.4));

        act.stop().unwrap();
        assert!(act.last_command().is_neutral());
    }

    #[test]
    fn default_probe_succeeds() {
        let mut act = MockActuator {
            id: "racecar".to_string(),
            last: ActuationCommand::NEUTRAL,
        };
        assert!(act.probe().is_ok());
    }
}
