//! Frame source abstraction
//!
//! The server treats the camera as a collaborator behind the [`FrameSource`]
//! contract: capture one encoded frame on demand, release the device when
//! done. Real capture hardware and image encoding stay behind this trait;
//! the built-in sources are a deterministic test pattern and a scriptable
//! mock for tests.

pub mod mock;
pub mod test_pattern;

pub use mock::MockCamera;
pub use test_pattern::TestPatternCamera;

use crate::config::CameraConfig;
use crate::error::{Error, Result};

/// Camera collaborator contract
pub trait FrameSource: Send {
    /// Capture one frame and return its encoded bytes
    ///
    /// Fails with [`Error::Camera`] when the device is unavailable or
    /// encoding fails.
    fn capture_frame(&mut self) -> Result<Vec<u8>>;

    /// Release the underlying device resources
    ///
    /// Idempotent; capturing after release is an error.
    fn release(&mut self);
}

/// Create a frame source based on configuration
pub fn create_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    match config.source.as_str() {
        "test-pattern" => Ok(Box::new(TestPatternCamera::new(config.width, config.height))),
        "mock" => Ok(Box::new(MockCamera::new())),
        other => Err(Error::Camera(format!("Unknown camera source: {}", other))),
    }
}
