//! Generic `Camera` trait for the image sensor.

use racer_types::{Frame, RacerError};

/// A blocking image sensor returning square RGB24 frames at the configured
/// resolution.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"csi0"`.
    fn id(&self) -> &str;

    /// Check that the device is open and streaming.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] when the device is unavailable.
    fn probe(&mut self) -> Result<(), RacerError> {
        Ok(())
    }

    /// Block until the most recent frame is available and return it.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::SensorFailure`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn read(&mut self) -> Result<Frame, RacerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCamera {
        id: String,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn read(&mut self) -> Result<Frame, RacerError> {
            Ok(Frame::blank(2, 2))
        }
    }

    #[test]
    fn mock_camera_read() {
        let mut cam = MockCamera {
            id: "csi0".to_string(),
        };
        assert_eq!(cam.id(), "csi0");
        let frame = cam.read().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.data.len(), 12);
    }
}
