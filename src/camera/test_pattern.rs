//! Deterministic synthetic frame source
//!
//! Emits binary PGM (P5) grayscale images with a diagonal gradient that
//! shifts one pixel per capture, so successive frames are distinguishable on
//! the client side. Stands in for a real capture device in deployments
//! without one.

use super::FrameSource;
use crate::error::{Error, Result};

/// Frame source producing a moving grayscale gradient
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    frame_counter: u64,
    released: bool,
}

impl TestPatternCamera {
    /// Create a test pattern source with the given frame dimensions
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Test pattern camera initialized ({}x{})", width, height);
        Self {
            width,
            height,
            frame_counter: 0,
            released: false,
        }
    }

    /// Number of frames captured so far
    pub fn frames_captured(&self) -> u64 {
        self.frame_counter
    }
}

impl FrameSource for TestPatternCamera {
    fn capture_frame(&mut self) -> Result<Vec<u8>> {
        if self.released {
            return Err(Error::Camera("Camera has been released".to_string()));
        }

        self.frame_counter += 1;
        let header = format!("P5\n{} {}\n255\n", self.width, self.height);
        let mut frame =
            Vec::with_capacity(header.len() + (self.width * self.height) as usize);
        frame.extend_from_slice(header.as_bytes());

        let shift = self.frame_counter;
        for y in 0..self.height as u64 {
            for x in 0..self.width as u64 {
                frame.push(((x + y + shift) & 0xFF) as u8);
            }
        }

        log::debug!("Captured test pattern frame of {} bytes", frame.len());
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            log::info!("Test pattern camera released");
        }
        self.released = true;
    }
}
