//! Configuration for the DrishtiCam daemon
//!
//! Loads configuration from a TOML file with the minimal parameters needed
//! for the streaming server and the frame source.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub logging: LoggingConfig,
}

/// TCP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host address to bind the listening socket to
    ///
    /// Examples:
    /// - `0.0.0.0` - All interfaces
    /// - `127.0.0.1` - Localhost only
    pub host: String,
    /// TCP port for the command/image channel
    pub port: u16,
}

/// Frame source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    /// Frame source type (`test-pattern` or `mock`)
    pub source: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    ///
    /// # Returns
    /// Parsed configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            camera: CameraConfig {
                source: "test-pattern".to_string(),
                width: 320,
                height: 240,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
