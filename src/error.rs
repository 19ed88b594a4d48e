//! Error types for DrishtiCam

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// DrishtiCam error types
///
/// Connection errors fall into two tiers: [`Error::ConnectionClosed`] marks a
/// normal end of session (peer went away), while [`Error::ConnectionRead`],
/// [`Error::ConnectionWrite`] and [`Error::MessageTooLarge`] are transport
/// faults that end the session but never the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection closed by the peer (or detected as closed)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Transport-level fault while reading from an open connection
    #[error("Connection read error: {0}")]
    ConnectionRead(std::io::Error),

    /// Transport-level fault while writing to an open connection
    #[error("Connection write error: {0}")]
    ConnectionWrite(std::io::Error),

    /// Inbound frame length exceeds the protocol maximum
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// Listening-socket setup failed (e.g. address already in use)
    #[error("Server setup failed: {0}")]
    ServerSetup(std::io::Error),

    /// Camera device unavailable or frame capture failed
    #[error("Camera error: {0}")]
    Camera(String),

    /// Configuration file parse error
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration file write error
    #[error("Configuration serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
