//! Bus acquisition errors

use thiserror::Error;

/// Errors from the bus driver and the acquisition worker
#[derive(Debug, Error)]
pub enum BusError {
    /// Interface bring-up/bring-down failed (non-zero exit or missing binary)
    #[error("Interface error: {0}")]
    Interface(String),

    /// A single frame could not be transmitted
    #[error("Transmit failed: {0}")]
    Transmit(String),

    /// Passive capture process could not be started or stopped
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Driver not supported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while loading the diagnostic request table
#[derive(Debug, Error)]
pub enum RequestTableError {
    #[error("Cannot read request table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed request table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
