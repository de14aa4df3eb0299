//! Hardware-backed LED controller
//!
//! ```text
//! caller ─ start() ─▶ [slot lock] ─ cancel + join previous task
//!                          │
//!                          └─ spawn animation task ─ frames ─▶ StripBus ─▶ driver
//! ```
//!
//! Commands are serialized by an async lock around the task slot. A new
//! command cancels the running task and waits for it to exit before it
//! spawns its own, so frames of two animations never interleave. Tasks check
//! their cancel signal before every frame and race it against the
//! inter-frame sleep; a write already handed to the bus always completes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledstrip_driver::{Rgb, StripDriver};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::animation::{Animation, Frames};
use crate::bus::StripBus;
use crate::control::{AnimationHandle, ControllerState, LedControl, Outcome, TaskStatus};
use crate::error::LedError;
use crate::frame::FrameBuffer;

/// Construction parameters for [`LedController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Initial global brightness (0-255)
    pub brightness: u8,
    /// Frame current limit in mA, 0 = unlimited
    pub power_budget_ma: u32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            brightness: 255,
            power_budget_ma: 0,
        }
    }
}

/// State shared with animation tasks
struct Shared {
    frame: Mutex<FrameBuffer>,
    state: Mutex<ControllerState>,
    power_budget_ma: u32,
}

impl Shared {
    /// Advance `frames` on the logical buffer and produce the bus copy.
    fn render(&self, frames: &mut Frames) -> Option<(Vec<Rgb>, Duration)> {
        let mut frame = self.frame.lock();
        let delay = frames.next_into(frame.pixels_mut())?;
        Some((frame.to_wire(self.power_budget_ma), delay))
    }

    /// Return to Idle if task `id` is still the current one.
    fn settle(&self, id: u64) {
        let mut state = self.state.lock();
        if matches!(*state, ControllerState::Running { id: current, .. } if current == id) {
            *state = ControllerState::Idle;
        }
    }
}

struct RunningTask {
    id: u64,
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    running: Option<RunningTask>,
    closed: bool,
}

/// LED controller driving a [`StripDriver`] through the bus worker
pub struct LedController {
    bus: StripBus,
    shared: Arc<Shared>,
    slot: tokio::sync::Mutex<Slot>,
    next_id: AtomicU64,
}

impl LedController {
    /// Take ownership of `driver` and start in Idle.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new<D>(driver: D, options: ControllerOptions) -> Result<Self, LedError>
    where
        D: StripDriver + 'static,
    {
        let len = driver.len();
        if len == 0 {
            return Err(LedError::InvalidCommand("strip has no pixels".into()));
        }

        let bus = StripBus::spawn(Box::new(driver))?;
        bus.set_brightness(options.brightness, false).await?;

        info!(
            "LED controller ready ({} pixels, brightness {}, power budget {})",
            len,
            options.brightness,
            match options.power_budget_ma {
                0 => "unlimited".to_string(),
                ma => format!("{ma}mA"),
            }
        );

        Ok(Self {
            bus,
            shared: Arc::new(Shared {
                frame: Mutex::new(FrameBuffer::new(len)),
                state: Mutex::new(ControllerState::Idle),
                power_budget_ma: options.power_budget_ma,
            }),
            slot: tokio::sync::Mutex::new(Slot::default()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Open the SPI strip described by `spi` and wrap it in a controller.
    #[cfg(target_os = "linux")]
    pub async fn open_spi(
        count: usize,
        spi: &ledstrip_driver::SpiConfig,
        options: ControllerOptions,
    ) -> Result<Self, LedError> {
        let strip = ledstrip_driver::SpiStrip::open(count, spi)?;
        Self::new(strip, options).await
    }

    /// Logical frame buffer (what the strip shows, before power scaling)
    pub fn frame(&self) -> Vec<Rgb> {
        self.shared.frame.lock().pixels().to_vec()
    }

    /// Cancel the running task and wait until it has exited.
    async fn cancel_running(&self, slot: &mut Slot) {
        if let Some(running) = slot.running.as_mut() {
            let _ = running.cancel.send(true);
            if let Err(e) = (&mut running.join).await {
                warn!("Animation task #{} ended abnormally: {}", running.id, e);
            }
            self.shared.settle(running.id);
        }
        slot.running = None;
    }
}

#[async_trait]
impl LedControl for LedController {
    fn len(&self) -> usize {
        self.bus.len()
    }

    fn state(&self) -> ControllerState {
        *self.shared.state.lock()
    }

    async fn start(&self, animation: Animation) -> Result<AnimationHandle, LedError> {
        animation.validate()?;

        let mut slot = self.slot.lock().await;
        if slot.closed {
            return Err(LedError::Closed);
        }
        self.cancel_running(&mut slot).await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(TaskStatus::Running);

        *self.shared.state.lock() = ControllerState::Running {
            id,
            animation: animation.name(),
        };
        debug!("Starting {} (#{})", animation.name(), id);

        let join = tokio::spawn(run_animation(
            self.bus.clone(),
            Arc::clone(&self.shared),
            id,
            animation,
            cancel_rx,
            status_tx,
        ));
        slot.running = Some(RunningTask {
            id,
            cancel: cancel_tx,
            join,
        });

        Ok(AnimationHandle::new(id, animation, status_rx))
    }

    async fn stop_animation(&self) -> Result<(), LedError> {
        let mut slot = self.slot.lock().await;
        if !slot.closed {
            self.cancel_running(&mut slot).await;
        }
        Ok(())
    }

    async fn set_brightness(&self, level: u8) -> Result<(), LedError> {
        let slot = self.slot.lock().await;
        if slot.closed {
            return Err(LedError::Closed);
        }
        debug!("Brightness -> {}", level);
        self.bus.set_brightness(level, true).await.inspect_err(|e| {
            error!("Failed to set brightness: {}", e);
        })
    }

    async fn close(&self) -> Result<(), LedError> {
        let mut slot = self.slot.lock().await;
        if slot.closed {
            debug!("LED controller already closed");
            return Ok(());
        }

        info!("Closing LED controller");
        *self.shared.state.lock() = ControllerState::Closing;
        self.cancel_running(&mut slot).await;

        let black = {
            let mut frame = self.shared.frame.lock();
            frame.fill(Rgb::BLACK);
            frame.to_wire(0)
        };
        let blanked = self.bus.write_frame(black).await;
        if let Err(e) = &blanked {
            error!("Failed to blank strip on close: {}", e);
        }
        let released = self.bus.release().await;
        if let Err(e) = &released {
            error!("Failed to release strip: {}", e);
        }

        slot.closed = true;
        *self.shared.state.lock() = ControllerState::Closed;
        blanked.and(released)
    }
}

impl Drop for LedController {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if !slot.closed {
            debug!("LED controller dropped without close");
        }
        if let Some(running) = slot.running.take() {
            let _ = running.cancel.send(true);
        }
    }
}

async fn run_animation(
    bus: StripBus,
    shared: Arc<Shared>,
    id: u64,
    animation: Animation,
    mut cancel: watch::Receiver<bool>,
    status: watch::Sender<TaskStatus>,
) {
    let mut frames = animation.frames(bus.len());

    let result = loop {
        if *cancel.borrow() {
            break Ok(Outcome::Cancelled);
        }
        let Some((wire, delay)) = shared.render(&mut frames) else {
            break Ok(Outcome::Completed);
        };
        if let Err(e) = bus.write_frame(wire).await {
            error!(
                "{} (#{}) failed at frame {}: {}",
                animation.name(),
                id,
                frames.position(),
                e
            );
            break Err(e);
        }
        if frames.is_done() {
            break Ok(Outcome::Completed);
        }

        tokio::select! {
            biased;
            // Fires on cancel and when the controller is dropped
            _ = cancel.changed() => break Ok(Outcome::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    };

    if let Ok(outcome) = &result {
        debug!(
            "{} (#{}) {:?} after {} frames",
            animation.name(),
            id,
            outcome,
            frames.position()
        );
    }

    shared.settle(id);
    let _ = status.send(TaskStatus::Finished(result));
}
