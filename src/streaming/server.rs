//! Webcam server: accept loop and command dispatch
//!
//! Serves exactly one client at a time. While a session is active, further
//! connection attempts sit unaccepted in the listen backlog until the current
//! session's resources are released; this single-client capacity is a
//! protocol constraint, not an oversight, since the command channel has no
//! notion of which client a reply belongs to.
//!
//! Two execution contexts exist per active client: this dispatch loop and the
//! session's [`CommandHandler`] thread. They share only the event channel and
//! the connection clone pair. Session teardown can be triggered from either
//! side (handler exit or a failed image write here); both paths funnel
//! through [`WebcamServer::clear_session`], and stale
//! [`ServerEvent::SessionEnded`] events are ignored by session id, so the two
//! paths cannot race.

use crate::camera::FrameSource;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::streaming::command_handler::CommandHandler;
use crate::streaming::connection::{accept_connection, create_server, Connection};
use crate::streaming::{ServerEvent, SessionId};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Event poll timeout while a client session is active
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Event poll timeout while waiting for a client, doubles as the accept
/// poll cadence
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The only command the server recognizes
const CMD_SEND_IMAGE: &str = "SEND_IMAGE";

/// Server that streams webcam images on demand
pub struct WebcamServer {
    host: String,
    port: u16,
    camera: Option<Box<dyn FrameSource>>,
    listener: Option<TcpListener>,
    session: Option<ActiveSession>,
    events_tx: Sender<ServerEvent>,
    events_rx: Receiver<ServerEvent>,
    running: Arc<AtomicBool>,
    next_session: SessionId,
}

/// The at-most-one active client session
struct ActiveSession {
    /// Write-side clone of the connection; the read side lives in the handler
    connection: Connection,
    handler: CommandHandler,
}

impl ActiveSession {
    fn id(&self) -> SessionId {
        self.handler.session()
    }
}

/// Cloneable handle that requests server shutdown from any thread
///
/// Flipping the flag does not interrupt blocking I/O by itself; the dispatch
/// loop observes it within one poll interval and then tears everything down,
/// force-closing the active connection to unblock its handler.
#[derive(Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Request that the server stop after its current loop iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl WebcamServer {
    /// Create a new webcam server for the given bind address and frame source
    pub fn new(config: &ServerConfig, camera: Box<dyn FrameSource>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            host: config.host.clone(),
            port: config.port,
            camera: Some(camera),
            listener: None,
            session: None,
            events_tx,
            events_rx,
            running: Arc::new(AtomicBool::new(true)),
            next_session: 0,
        }
    }

    /// Handle for stopping the server from another thread
    pub fn stop_handle(&self) -> ServerHandle {
        ServerHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Create the listening socket without entering the main loop
    ///
    /// Useful when the bound address must be known before [`Self::start`]
    /// (e.g. binding to port 0). Setup failure is the only error class the
    /// server surfaces to its caller.
    pub fn bind(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = create_server(&self.host, self.port)?;
        listener.set_nonblocking(true).map_err(Error::ServerSetup)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Address the listening socket is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Run the server until stopped
    ///
    /// Binds the listening socket if [`Self::bind`] has not been called yet,
    /// then runs the main loop. Cleanup (active session, listener, camera)
    /// happens exactly once on the way out regardless of how the loop ended.
    /// Per-session and per-command failures are contained; only setup
    /// failures propagate.
    pub fn start(&mut self) -> Result<()> {
        self.bind()?;
        log::info!(
            "Webcam server started on {}:{} (single client at a time)",
            self.host,
            self.port
        );
        self.main_loop();
        self.cleanup();
        Ok(())
    }

    fn main_loop(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            if self.session.is_none() {
                self.poll_accept();
            }

            // Bounded poll keeps the loop responsive to stop() without
            // busy-waiting; the short interval while idle doubles as the
            // accept poll cadence
            let timeout = if self.session.is_some() {
                QUEUE_POLL_INTERVAL
            } else {
                ACCEPT_POLL_INTERVAL
            };

            match self.events_rx.recv_timeout(timeout) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Cannot happen while we hold a sender, but never spin
                    log::error!("Event channel disconnected, stopping server");
                    break;
                }
            }
        }
    }

    fn poll_accept(&mut self) {
        let listener = match &self.listener {
            Some(listener) => listener,
            None => return,
        };

        let (connection, addr) = match accept_connection(listener) {
            Ok(accepted) => accepted,
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::error!("Accept error: {}", e);
                return;
            }
        };

        let write_side = match connection.try_clone() {
            Ok(clone) => clone,
            Err(e) => {
                log::error!("Failed to clone client connection: {}", e);
                connection.close();
                return;
            }
        };

        self.next_session += 1;
        let id = self.next_session;
        match CommandHandler::spawn(id, connection, self.events_tx.clone()) {
            Ok(handler) => {
                log::info!("Session {} started for client {}", id, addr);
                self.session = Some(ActiveSession {
                    connection: write_side,
                    handler,
                });
            }
            Err(e) => {
                log::error!("Failed to start command handler: {}", e);
                write_side.close();
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Command(command) => {
                if command == CMD_SEND_IMAGE {
                    self.send_image();
                } else {
                    log::warn!("Unknown command received: {}", command);
                }
            }
            ServerEvent::SessionEnded(id) => {
                if self.session.as_ref().map(|s| s.id()) == Some(id) {
                    log::info!("Client disconnected, cleaning up session {}", id);
                    self.clear_session();
                } else {
                    log::debug!("Ignoring end of stale session {}", id);
                }
            }
        }
    }

    /// Capture one frame and send it over the active connection
    ///
    /// A missing session or camera is a warning, not an error. A write
    /// failure tears the session down so a new client can be accepted; a
    /// capture failure is logged and the loop continues.
    fn send_image(&mut self) {
        let Some(session) = self.session.as_ref() else {
            log::warn!("Cannot send image: no client connection");
            return;
        };
        let Some(camera) = self.camera.as_mut() else {
            log::warn!("Cannot send image: no camera attached");
            return;
        };

        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Error capturing frame: {}", e);
                return;
            }
        };

        match session.connection.send_message(&frame) {
            Ok(()) => log::info!("Image of {} bytes sent to client", frame.len()),
            Err(e @ (Error::ConnectionClosed | Error::ConnectionWrite(_))) => {
                log::error!("Failed to send image: {}", e);
                self.clear_session();
            }
            Err(e) => log::error!("Error sending image: {}", e),
        }
    }

    /// Tear down the active session, if any
    ///
    /// Idempotent, and safe to reach from both the handler's session-ended
    /// event and the dispatch loop's own write-error path. Closing the
    /// connection clone unblocks a handler still stuck in a read.
    fn clear_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.handler.stop();
            session.connection.close();
            session.handler.join();
        }
    }

    fn cleanup(&mut self) {
        log::info!("Shutting down webcam server");
        self.running.store(false, Ordering::Relaxed);
        self.clear_session();

        // Discard events the final session left behind
        while self.events_rx.try_recv().is_ok() {}

        self.listener = None;
        if let Some(mut camera) = self.camera.take() {
            camera.release();
            log::info!("Camera resources released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::MockCamera;
    use std::net::{TcpListener, TcpStream};

    fn test_server(camera: MockCamera) -> WebcamServer {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        WebcamServer::new(&config, Box::new(camera))
    }

    /// Build an ActiveSession around a real loopback connection
    fn attach_session(server: &mut WebcamServer, id: SessionId) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let connection = Connection::new(stream);
        let write_side = connection.try_clone().unwrap();
        let handler = CommandHandler::spawn(id, connection, server.events_tx.clone()).unwrap();
        server.session = Some(ActiveSession {
            connection: write_side,
            handler,
        });
        client
    }

    #[test]
    fn test_send_image_without_connection_touches_nothing() {
        let camera = MockCamera::new();
        let mut server = test_server(camera.clone());

        server.send_image();

        assert_eq!(camera.capture_count(), 0);
    }

    #[test]
    fn test_send_image_captures_exactly_one_frame() {
        let camera = MockCamera::new();
        let mut server = test_server(camera.clone());
        let _client = attach_session(&mut server, 1);

        server.send_image();

        assert_eq!(camera.capture_count(), 1);
        server.clear_session();
    }

    #[test]
    fn test_stale_session_end_is_ignored() {
        let camera = MockCamera::new();
        let mut server = test_server(camera);
        let _client = attach_session(&mut server, 5);

        server.dispatch(ServerEvent::SessionEnded(4));
        assert!(server.session.is_some());

        server.dispatch(ServerEvent::SessionEnded(5));
        assert!(server.session.is_none());
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let camera = MockCamera::new();
        let mut server = test_server(camera);
        let _client = attach_session(&mut server, 2);

        server.clear_session();
        server.clear_session();
        assert!(server.session.is_none());
    }

    #[test]
    fn test_cleanup_releases_camera() {
        let camera = MockCamera::new();
        let mut server = test_server(camera.clone());

        server.cleanup();

        assert_eq!(camera.release_count(), 1);
        // A second cleanup must not release twice
        server.cleanup();
        assert_eq!(camera.release_count(), 1);
    }
}
