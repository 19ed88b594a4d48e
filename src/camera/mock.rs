//! Mock frame source for testing

use super::FrameSource;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scriptable frame source for unit and integration tests
///
/// Clones share state, so a test can keep a handle for scripting and
/// assertions while the server owns the boxed original.
#[derive(Clone)]
pub struct MockCamera {
    inner: Arc<Mutex<MockCameraInner>>,
}

struct MockCameraInner {
    scripted: VecDeque<std::result::Result<Vec<u8>, String>>,
    default_frame: Vec<u8>,
    capture_count: usize,
    release_count: usize,
}

impl MockCamera {
    /// Create a mock camera returning `mock-frame` for every capture
    pub fn new() -> Self {
        Self::with_default_frame(b"mock-frame".to_vec())
    }

    /// Create a mock camera with a specific fallback frame
    pub fn with_default_frame(frame: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockCameraInner {
                scripted: VecDeque::new(),
                default_frame: frame,
                capture_count: 0,
                release_count: 0,
            })),
        }
    }

    /// Queue a frame to be returned by the next unscripted capture
    pub fn push_frame(&self, frame: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted.push_back(Ok(frame));
    }

    /// Queue a capture failure
    pub fn push_error(&self, message: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted.push_back(Err(message.to_string()));
    }

    /// Number of capture attempts so far
    pub fn capture_count(&self) -> usize {
        self.inner.lock().unwrap().capture_count
    }

    /// Number of release calls so far
    pub fn release_count(&self) -> usize {
        self.inner.lock().unwrap().release_count
    }
}

impl FrameSource for MockCamera {
    fn capture_frame(&mut self) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        inner.capture_count += 1;
        match inner.scripted.pop_front() {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(message)) => Err(Error::Camera(message)),
            None => Ok(inner.default_frame.clone()),
        }
    }

    fn release(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.release_count += 1;
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}
