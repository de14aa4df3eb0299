//! Driver layer for addressable LED strips
//!
//! This crate provides the synchronous, blocking primitives a strip exposes
//! and two backends implementing them:
//!
//! - SPI (`/dev/spidevB.D`, WS2812 bit encoding) for the real robot strip
//! - Recording (in-memory, instrumented) for tests and harnesses
//!
//! Nothing here is thread-aware beyond `Send`: callers are expected to
//! serialize access themselves (see the controller's bus worker).

pub mod error;
pub mod recording;
pub mod types;

#[cfg(target_os = "linux")]
pub mod spi;

pub use error::DriverError;
pub use recording::{DriverCall, RecordingDriver, StripRecorder};
pub use types::{ColorOrder, Rgb, SpiConfig};

#[cfg(target_os = "linux")]
pub use spi::SpiStrip;

/// The core driver trait - all strip backends implement this
///
/// Every method blocks until the hardware operation finished. Pixel writes
/// only touch the driver's buffer; nothing is visible until `show()`.
pub trait StripDriver: Send {
    /// Number of pixels on the strip (fixed for the driver's lifetime)
    fn len(&self) -> usize;

    /// Whether the strip has no pixels at all
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set one pixel in the driver buffer (no auto-show)
    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), DriverError>;

    /// Set global brightness (0-255), applied on the next `show()`
    fn set_brightness(&mut self, level: u8) -> Result<(), DriverError>;

    /// Push the buffer to the hardware
    fn show(&mut self) -> Result<(), DriverError>;

    /// Free the hardware handle. Calling this more than once is a no-op.
    fn release(&mut self) -> Result<(), DriverError>;
}

/// Type alias for a boxed driver
pub type BoxedDriver = Box<dyn StripDriver>;

impl<D: StripDriver + ?Sized> StripDriver for Box<D> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), DriverError> {
        (**self).set_pixel(index, color)
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DriverError> {
        (**self).set_brightness(level)
    }

    fn show(&mut self) -> Result<(), DriverError> {
        (**self).show()
    }

    fn release(&mut self) -> Result<(), DriverError> {
        (**self).release()
    }
}
