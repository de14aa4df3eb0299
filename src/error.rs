//! Controller error types

use std::sync::Arc;
use std::time::Duration;

use ledstrip_driver::DriverError;
use thiserror::Error;

/// Longest accepted per-pixel / per-frame delay
pub const MAX_FRAME_DELAY: Duration = Duration::from_secs(60);

/// Errors surfaced by LED controller operations
#[derive(Error, Debug, Clone)]
pub enum LedError {
    /// A strip driver call failed while writing a frame
    #[error("Hardware fault: {0}")]
    HardwareFault(Arc<DriverError>),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("LED controller already closed")]
    Closed,

    #[error("Failed to start bus worker: {0}")]
    Spawn(Arc<std::io::Error>),
}

impl LedError {
    /// Whether the command was rejected before touching the strip
    pub fn is_invalid_command(&self) -> bool {
        matches!(self, LedError::InvalidCommand(_) | LedError::Closed)
    }

    pub fn is_hardware_fault(&self) -> bool {
        matches!(self, LedError::HardwareFault(_))
    }
}

impl From<DriverError> for LedError {
    fn from(e: DriverError) -> Self {
        LedError::HardwareFault(Arc::new(e))
    }
}

/// Validate a frame delay.
pub fn check_frame_delay(delay: Duration) -> Result<Duration, LedError> {
    if delay > MAX_FRAME_DELAY {
        return Err(LedError::InvalidCommand(format!(
            "delay {delay:?} exceeds {MAX_FRAME_DELAY:?}"
        )));
    }
    Ok(delay)
}

/// Convert a delay given in (possibly fractional) milliseconds.
pub fn frame_delay_from_millis(ms: f64) -> Result<Duration, LedError> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(LedError::InvalidCommand(format!(
            "delay must be a non-negative number of milliseconds, got {ms}"
        )));
    }
    if ms > MAX_FRAME_DELAY.as_millis() as f64 {
        return Err(LedError::InvalidCommand(format!(
            "delay {ms}ms exceeds {MAX_FRAME_DELAY:?}"
        )));
    }
    Ok(Duration::from_secs_f64(ms / 1000.0))
}
