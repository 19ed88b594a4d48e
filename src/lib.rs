//! DrishtiCam - on-demand webcam frame streaming over TCP
//!
//! A single-client, command-driven session daemon. One persistent TCP
//! connection carries length-prefixed frames in both directions: short UTF-8
//! command text from the client (`SEND_IMAGE` is the only recognized value)
//! and opaque binary image bytes back from the server.
//!
//! The library splits into:
//! - [`streaming`]: connection framing, the per-session command handler
//!   thread, and the [`streaming::WebcamServer`] dispatch loop
//! - [`camera`]: the frame source collaborator contract and built-in sources
//! - [`config`] / [`error`]: TOML configuration and the error taxonomy

pub mod camera;
pub mod config;
pub mod error;
pub mod streaming;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use streaming::{ServerHandle, WebcamServer};
