//! Serialized access to the strip driver
//!
//! The blocking [`StripDriver`] is owned by a single worker thread. Async
//! callers hold a cheap [`StripBus`] handle and send it requests; the worker
//! executes them strictly one at a time and replies over a oneshot channel.
//!
//! ```text
//!  [animation task] ─┐
//!  [controller]     ─┼─ mpsc ─▶ [led-bus-worker thread] ─▶ StripDriver
//!  [animation task] ─┘
//! ```
//!
//! When every handle is gone, or the worker unwinds, the driver guard blanks
//! the strip and releases it unless an explicit release already happened.

use std::sync::Arc;

use ledstrip_driver::{BoxedDriver, DriverError, Rgb};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::LedError;

/// Pending requests before senders start waiting
const BUS_QUEUE_SIZE: usize = 16;

type Reply = oneshot::Sender<Result<(), DriverError>>;

enum BusRequest {
    /// Write every pixel, then `show()` once
    Frame { pixels: Vec<Rgb>, reply: Reply },
    /// Set brightness, optionally re-pushing the driver buffer
    Brightness { level: u8, show: bool, reply: Reply },
    /// Release the driver and stop the worker
    Release { reply: Reply },
}

/// Handle used to talk to the bus worker. Clones share the same worker.
#[derive(Clone)]
pub struct StripBus {
    tx: mpsc::Sender<BusRequest>,
    len: usize,
}

impl StripBus {
    /// Move `driver` onto a dedicated worker thread.
    pub fn spawn(driver: BoxedDriver) -> Result<Self, LedError> {
        let len = driver.len();
        let guard = DriverGuard {
            driver: Some(driver),
        };
        let (tx, rx) = mpsc::channel(BUS_QUEUE_SIZE);

        std::thread::Builder::new()
            .name("led-bus-worker".into())
            .spawn(move || {
                futures::executor::block_on(bus_worker(guard, rx));
            })
            .map_err(|e| LedError::Spawn(Arc::new(e)))?;

        Ok(Self { tx, len })
    }

    /// Pixel count of the driver behind this bus
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write a complete frame and show it.
    pub async fn write_frame(&self, pixels: Vec<Rgb>) -> Result<(), LedError> {
        self.request(|reply| BusRequest::Frame { pixels, reply })
            .await
    }

    pub async fn set_brightness(&self, level: u8, show: bool) -> Result<(), LedError> {
        self.request(|reply| BusRequest::Brightness { level, show, reply })
            .await
    }

    /// Release the driver. The worker exits afterwards.
    pub async fn release(&self) -> Result<(), LedError> {
        self.request(|reply| BusRequest::Release { reply }).await
    }

    async fn request(&self, build: impl FnOnce(Reply) -> BusRequest) -> Result<(), LedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| worker_gone())?;
        reply_rx.await.map_err(|_| worker_gone())??;
        Ok(())
    }
}

fn worker_gone() -> LedError {
    DriverError::Bus("LED bus worker stopped".into()).into()
}

async fn bus_worker(mut guard: DriverGuard, mut rx: mpsc::Receiver<BusRequest>) {
    debug!("LED bus worker started ({} pixels)", guard.len());

    while let Some(req) = rx.recv().await {
        match req {
            BusRequest::Frame { pixels, reply } => {
                let _ = reply.send(guard.write_frame(&pixels));
            }
            BusRequest::Brightness { level, show, reply } => {
                let _ = reply.send(guard.set_brightness(level, show));
            }
            BusRequest::Release { reply } => {
                let _ = reply.send(guard.release());
                break;
            }
        }
    }

    debug!("LED bus worker stopped");
}

/// Sole owner of the driver; blanks and releases it on drop.
struct DriverGuard {
    driver: Option<BoxedDriver>,
}

impl DriverGuard {
    fn len(&self) -> usize {
        self.driver.as_ref().map_or(0, |d| d.len())
    }

    fn driver(&mut self) -> Result<&mut BoxedDriver, DriverError> {
        self.driver.as_mut().ok_or(DriverError::Released)
    }

    fn write_frame(&mut self, pixels: &[Rgb]) -> Result<(), DriverError> {
        let driver = self.driver()?;
        for (index, color) in pixels.iter().enumerate() {
            driver.set_pixel(index, *color)?;
        }
        driver.show()
    }

    fn set_brightness(&mut self, level: u8, show: bool) -> Result<(), DriverError> {
        let driver = self.driver()?;
        driver.set_brightness(level)?;
        if show {
            driver.show()?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), DriverError> {
        match self.driver.take() {
            Some(mut driver) => driver.release(),
            None => Ok(()),
        }
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        warn!("LED driver dropped without release, blanking strip");
        let blank = (0..driver.len())
            .try_for_each(|i| driver.set_pixel(i, Rgb::BLACK))
            .and_then(|_| driver.show());
        if let Err(e) = blank {
            warn!("Failed to blank strip: {}", e);
        }
        if let Err(e) = driver.release() {
            warn!("Failed to release strip: {}", e);
        }
    }
}
