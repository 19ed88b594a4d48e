//! Background command listener for one client session
//!
//! Each accepted connection gets one [`CommandHandler`] thread that reads
//! length-prefixed frames, decodes them as UTF-8 command text, and pushes the
//! trimmed strings onto the server's event channel. Payloads that are not
//! valid UTF-8 are logged and discarded without ending the session.
//!
//! The loop ends on [`Error::ConnectionClosed`] (normal end of session) or
//! any other connection-level error (abnormal end). Either way the cleanup
//! path runs: the connection is closed and a
//! [`ServerEvent::SessionEnded`] event is emitted so the dispatch loop can
//! clear its references. A vanished event consumer is ignored, a misbehaving
//! receiver cannot destabilize the handler.
//!
//! `stop()` is cooperative: the flag is checked once per loop iteration, so a
//! handler blocked inside a read only terminates once the peer sends data,
//! disconnects, or the socket is closed from outside (the server closes its
//! connection clone for exactly this reason).

use crate::error::{Error, Result};
use crate::streaming::connection::Connection;
use crate::streaming::{ServerEvent, SessionId};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to one session's background command listener thread
pub struct CommandHandler {
    session: SessionId,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CommandHandler {
    /// Spawn the listener thread for an accepted connection
    pub fn spawn(
        session: SessionId,
        connection: Connection,
        events: Sender<ServerEvent>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name(format!("command-handler-{}", session))
            .spawn(move || run(session, connection, events, flag))?;

        Ok(Self {
            session,
            running,
            thread: Some(thread),
        })
    }

    /// Session this handler belongs to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Signal the handler to stop
    ///
    /// Cooperative only: an in-flight blocking read is not interrupted.
    /// Close the connection from outside to unblock it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Wait for the listener thread to finish
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Command handler thread panicked");
            }
        }
    }
}

fn run(
    session: SessionId,
    mut connection: Connection,
    events: Sender<ServerEvent>,
    running: Arc<AtomicBool>,
) {
    log::info!(
        "Command handler started for client {:?}",
        connection.peer_addr()
    );

    while running.load(Ordering::Relaxed) {
        match connection.recv_message() {
            Ok(payload) => match String::from_utf8(payload) {
                Ok(text) => {
                    let command = text.trim().to_string();
                    log::info!("Received command: {}", command);
                    if events.send(ServerEvent::Command(command)).is_err() {
                        log::debug!("Event channel closed, stopping command handler");
                        break;
                    }
                }
                Err(e) => {
                    log::error!("Failed to decode command as UTF-8: {}", e);
                }
            },
            Err(Error::ConnectionClosed) => {
                log::info!("Connection closed by peer, stopping command handler");
                break;
            }
            Err(e) => {
                log::error!("Connection error while reading command: {}", e);
                break;
            }
        }
    }

    // Guaranteed cleanup path: close the connection, then report the end of
    // the session so the server can clear its references
    connection.close();
    if events.send(ServerEvent::SessionEnded(session)).is_err() {
        log::debug!("Event channel closed, session end not reported");
    }
    log::info!("Command handler stopped");
}
