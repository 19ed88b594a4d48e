//! TCP connection management with length-prefixed framing
//!
//! # Wire Format
//!
//! Every message in either direction is a length-prefixed frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ Command text or image    │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Length field**: 4-byte big-endian unsigned integer
//! - **Client → server payload**: UTF-8 command text
//! - **Server → client payload**: opaque binary image bytes
//! - **Maximum inbound message size**: 1MB (1,048,576 bytes); oversized
//!   frames close the connection
//!
//! # Connection Lifecycle
//!
//! A [`Connection`] wraps one accepted socket and moves from OPEN to CLOSED
//! exactly once, on explicit [`Connection::close`], a fatal read/write error,
//! or a detected peer disconnect. There is no transition back to OPEN and
//! closing twice is a no-op.
//!
//! Clones made with [`Connection::try_clone`] share the same underlying
//! socket, closed flag, and write lock, so one thread can block on reads
//! while another writes frames or forces the socket closed.

use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Length header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Maximum accepted inbound frame payload size
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// One TCP connection with framed message I/O
pub struct Connection {
    stream: TcpStream,
    closed: Arc<AtomicBool>,
    /// Serializes frame writes so concurrent sends on clones never interleave
    write_lock: Arc<Mutex<()>>,
}

impl Connection {
    /// Wrap an accepted socket
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            closed: Arc::new(AtomicBool::new(false)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Clone the connection handle
    ///
    /// The clone shares the underlying socket, closed flag, and write lock.
    /// Closing either handle closes the socket for both.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            stream: self.stream.try_clone()?,
            closed: Arc::clone(&self.closed),
            write_lock: Arc::clone(&self.write_lock),
        })
    }

    /// Peer address, if still known to the OS
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the connection
    ///
    /// Idempotent: the first call shuts the socket down in both directions,
    /// later calls are no-ops. Errors are logged and swallowed, so closing
    /// after the peer has already gone away is safe.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => log::info!("Connection closed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                log::debug!("Connection already shut down by peer");
            }
            Err(e) => log::warn!("Error while closing connection: {}", e),
        }
    }

    /// Read exactly `buf.len()` bytes from the socket
    ///
    /// Blocks until the buffer is full. A peer disconnect mid-read yields
    /// [`Error::ConnectionClosed`]; any other transport fault yields
    /// [`Error::ConnectionRead`]. The buffer contents are unspecified on
    /// error, never a silent partial read.
    pub fn recv_exactly(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(map_read_error)
    }

    /// Read one complete length-prefixed message
    ///
    /// Reads the 4-byte big-endian length header, then exactly that many
    /// payload bytes. Never returns a partial message. A length above
    /// [`MAX_MESSAGE_SIZE`] closes the connection and yields
    /// [`Error::MessageTooLarge`].
    pub fn recv_message(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_SIZE];
        self.recv_exactly(&mut header)?;

        let length = u32::from_be_bytes(header) as usize;
        log::debug!("Received header, message length: {} bytes", length);

        if length > MAX_MESSAGE_SIZE {
            log::error!(
                "Inbound frame of {} bytes exceeds {} byte limit, closing connection",
                length,
                MAX_MESSAGE_SIZE
            );
            self.close();
            return Err(Error::MessageTooLarge(length));
        }

        let mut payload = vec![0u8; length];
        self.recv_exactly(&mut payload)?;
        Ok(payload)
    }

    /// Send one complete length-prefixed message
    ///
    /// The 4-byte big-endian header and the payload are written as one
    /// contiguous buffer under the shared write lock, so concurrent sends on
    /// connection clones are never interleaved byte-for-byte. A reset or
    /// broken pipe yields [`Error::ConnectionClosed`]; a timeout or other OS
    /// error yields [`Error::ConnectionWrite`].
    pub fn send_message(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > u32::MAX as usize {
            return Err(Error::MessageTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        (&self.stream).write_all(&frame).map_err(map_write_error)?;
        (&self.stream).flush().map_err(map_write_error)?;
        log::debug!("Sent message of {} bytes", payload.len());
        Ok(())
    }
}

fn map_read_error(e: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => Error::ConnectionClosed,
        _ => Error::ConnectionRead(e),
    }
}

fn map_write_error(e: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            Error::ConnectionClosed
        }
        _ => Error::ConnectionWrite(e),
    }
}

/// Create and bind the listening socket
///
/// This is the setup step whose failure (e.g. address already in use) is the
/// only error surfaced to the caller of the server's `start`.
pub fn create_server(host: &str, port: u16) -> Result<TcpListener> {
    let listener =
        TcpListener::bind(format!("{}:{}", host, port)).map_err(Error::ServerSetup)?;
    log::info!("Server socket listening on {}:{}", host, port);
    Ok(listener)
}

/// Accept one client connection from a listening socket
///
/// The accepted socket is put into blocking mode regardless of the
/// listener's mode, since the handler relies on blocking reads. A
/// non-blocking listener surfaces `WouldBlock` as [`Error::Io`].
pub fn accept_connection(listener: &TcpListener) -> Result<(Connection, SocketAddr)> {
    let (stream, addr) = listener.accept()?;
    stream.set_nonblocking(false)?;
    log::info!("Client connected from {}", addr);
    Ok((Connection::new(stream), addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Server-side Connection plus the raw client socket talking to it
    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (conn, _) = accept_connection(&listener).unwrap();
        (conn, client)
    }

    fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
        stream
            .write_all(&(payload.len() as u32).to_be_bytes())
            .unwrap();
        stream.write_all(payload).unwrap();
    }

    fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
        stream.read_exact(&mut payload).unwrap();
        payload
    }

    #[test]
    fn test_recv_message_round_trip() {
        let (mut conn, mut client) = pair();
        let payload: Vec<u8> = (0..=255).collect();
        write_frame(&mut client, &payload);
        assert_eq!(conn.recv_message().unwrap(), payload);
    }

    #[test]
    fn test_send_message_round_trip() {
        let (conn, mut client) = pair();
        let payload = vec![0xABu8; 10_000];
        conn.send_message(&payload).unwrap();
        assert_eq!(read_frame(&mut client), payload);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let (mut conn, mut client) = pair();
        write_frame(&mut client, b"");
        assert_eq!(conn.recv_message().unwrap(), b"");

        conn.send_message(b"").unwrap();
        assert_eq!(read_frame(&mut client), b"");
    }

    #[test]
    fn test_peer_close_mid_header() {
        let (mut conn, mut client) = pair();
        client.write_all(&[0x00, 0x00]).unwrap();
        drop(client);
        assert!(matches!(conn.recv_message(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_peer_close_mid_body() {
        let (mut conn, mut client) = pair();
        // Header promises 10 bytes, only 3 arrive
        client.write_all(&10u32.to_be_bytes()).unwrap();
        client.write_all(&[1, 2, 3]).unwrap();
        drop(client);
        assert!(matches!(conn.recv_message(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_oversized_frame_closes_connection() {
        let (mut conn, mut client) = pair();
        let length = (MAX_MESSAGE_SIZE as u32) + 1;
        client.write_all(&length.to_be_bytes()).unwrap();

        match conn.recv_message() {
            Err(Error::MessageTooLarge(n)) => assert_eq!(n, MAX_MESSAGE_SIZE + 1),
            other => panic!("expected MessageTooLarge, got {:?}", other.map(|v| v.len())),
        }
        assert!(conn.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (conn, client) = pair();
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        drop(client);
        conn.close();
    }

    #[test]
    fn test_close_after_peer_disconnect() {
        let (conn, client) = pair();
        drop(client);
        thread::sleep(Duration::from_millis(20));
        conn.close();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_clone_shares_closed_flag() {
        let (conn, _client) = pair();
        let clone = conn.try_clone().unwrap();
        clone.close();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_send_to_closed_peer_fails() {
        let (conn, client) = pair();
        drop(client);

        // The first few writes may land in the socket buffer before the
        // reset is observed
        let mut saw_error = None;
        for _ in 0..50 {
            if let Err(e) = conn.send_message(&[0u8; 4096]) {
                saw_error = Some(e);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        match saw_error {
            Some(Error::ConnectionClosed) | Some(Error::ConnectionWrite(_)) => {}
            other => panic!("expected connection failure, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_sends_do_not_interleave() {
        let (conn, mut client) = pair();
        let clone = conn.try_clone().unwrap();

        const FRAMES: usize = 25;
        const LEN: usize = 8192;

        let t1 = thread::spawn(move || {
            for _ in 0..FRAMES {
                conn.send_message(&[0xAAu8; LEN]).unwrap();
            }
        });
        let t2 = thread::spawn(move || {
            for _ in 0..FRAMES {
                clone.send_message(&[0xBBu8; LEN]).unwrap();
            }
        });

        for _ in 0..(FRAMES * 2) {
            let frame = read_frame(&mut client);
            assert_eq!(frame.len(), LEN);
            let first = frame[0];
            assert!(first == 0xAA || first == 0xBB);
            assert!(frame.iter().all(|&b| b == first), "interleaved frame");
        }

        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    fn test_create_server_bind_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        match create_server("127.0.0.1", port) {
            Err(Error::ServerSetup(_)) => {}
            other => panic!("expected ServerSetup error, got {:?}", other.is_ok()),
        }
    }
}
