//! DrishtiCam daemon entry point
//!
//! Loads configuration, initializes logging, wires the shutdown signal to the
//! server handle, and runs the webcam server until stopped.

use drishti_cam::camera::create_camera;
use drishti_cam::config::AppConfig;
use drishti_cam::error::{Error, Result};
use drishti_cam::streaming::WebcamServer;
use std::env;
use std::path::Path;

/// Config path used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "/etc/drishti-cam.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `drishti-cam <path>` (positional)
/// - `drishti-cam --config <path>` (flag-based)
/// - `drishti-cam -c <path>` (short flag)
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn main() -> Result<()> {
    // An explicitly given config path must load; the default path falls back
    // to built-in defaults when absent
    let explicit_path = parse_config_path();
    let config = match &explicit_path {
        Some(path) => AppConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::from_file(DEFAULT_CONFIG_PATH)?
        }
        None => AppConfig::default(),
    };

    // Initialize logger with the configured level as the default filter
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("DrishtiCam v{} starting...", env!("CARGO_PKG_VERSION"));
    match &explicit_path {
        Some(path) => log::info!("Using config: {}", path),
        None => log::info!("Using config: {} (or built-in defaults)", DEFAULT_CONFIG_PATH),
    }

    // Create the frame source collaborator
    let camera = create_camera(&config.camera)?;
    log::info!("Camera source: {}", config.camera.source);

    let mut server = WebcamServer::new(&config.server, camera);

    // Set up shutdown signal handler
    let handle = server.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        handle.stop();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!(
        "Serving on {}:{}. Press Ctrl-C to stop.",
        config.server.host,
        config.server.port
    );
    server.start()?;

    log::info!("DrishtiCam stopped");
    Ok(())
}
