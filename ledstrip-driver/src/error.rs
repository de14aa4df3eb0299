//! Driver error types

use thiserror::Error;

/// Errors that can occur while talking to the strip hardware
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ioctl {request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Pixel index {index} out of range (strip has {len} pixels)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Strip handle already released")]
    Released,

    /// Generic bus fault (disconnected device, injected failure)
    #[error("Bus fault: {0}")]
    Bus(String),

    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),
}

impl DriverError {
    /// Whether this error came from the physical bus rather than from a misuse
    /// of the driver API.
    pub fn is_bus_fault(&self) -> bool {
        matches!(
            self,
            DriverError::Io(_) | DriverError::Ioctl { .. } | DriverError::Bus(_)
        )
    }
}
