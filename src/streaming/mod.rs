//! TCP streaming module for DrishtiCam
//!
//! One persistent connection carries short UTF-8 command frames from the
//! client and binary image frames back from the server. The pieces:
//!
//! - [`Connection`]: framed message I/O over one socket
//! - [`CommandHandler`]: per-session listener thread feeding the event channel
//! - [`WebcamServer`]: accept loop and command dispatch

pub mod command_handler;
pub mod connection;
pub mod server;

pub use command_handler::CommandHandler;
pub use connection::{accept_connection, create_server, Connection, HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use server::{ServerHandle, WebcamServer};

/// Identifier for one accepted client session
///
/// Assigned at accept time and carried on [`ServerEvent::SessionEnded`] so the
/// dispatch loop can ignore events from a session it has already torn down.
pub type SessionId = u64;

/// Events flowing from the command handler thread to the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A decoded, trimmed command line from the client
    Command(String),
    /// The session's command handler has terminated and closed its connection
    SessionEnded(SessionId),
}
