//! Controller capability trait and animation handles
//!
//! Both the hardware-backed [`LedController`](crate::LedController) and the
//! log-only [`MockLedController`](crate::MockLedController) implement
//! [`LedControl`]; callers hold an `Arc<dyn LedControl>` and never learn
//! which one they got.

use std::time::Duration;

use async_trait::async_trait;
use ledstrip_driver::Rgb;
use tokio::sync::watch;

use crate::animation::Animation;
use crate::error::LedError;

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running { id: u64, animation: &'static str },
    Closing,
    Closed,
}

/// How an accepted command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to its natural end
    Completed,
    /// Superseded, stopped or closed before its end
    Cancelled,
}

/// Progress of an animation task as seen through its handle
#[derive(Debug, Clone)]
pub enum TaskStatus {
    Running,
    Finished(Result<Outcome, LedError>),
}

/// Observer for one accepted animation.
///
/// Dropping the handle does not cancel the animation.
#[derive(Debug, Clone)]
pub struct AnimationHandle {
    id: u64,
    animation: Animation,
    status: watch::Receiver<TaskStatus>,
}

impl AnimationHandle {
    pub(crate) fn new(id: u64, animation: Animation, status: watch::Receiver<TaskStatus>) -> Self {
        Self {
            id,
            animation,
            status,
        }
    }

    /// Handle for an animation that already ended
    pub(crate) fn finished(id: u64, animation: Animation, result: Result<Outcome, LedError>) -> Self {
        let (_tx, status) = watch::channel(TaskStatus::Finished(result));
        Self::new(id, animation, status)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.status.borrow(), TaskStatus::Finished(_))
    }

    fn take_result(&mut self) -> Option<Result<Outcome, LedError>> {
        match &*self.status.borrow_and_update() {
            TaskStatus::Finished(result) => Some(result.clone()),
            TaskStatus::Running => None,
        }
    }

    /// Wait until the animation completes, is cancelled or faults.
    pub async fn wait(mut self) -> Result<Outcome, LedError> {
        loop {
            if let Some(result) = self.take_result() {
                return result;
            }
            if self.status.changed().await.is_err() {
                // Task went away without reporting
                return self.take_result().unwrap_or(Ok(Outcome::Cancelled));
            }
        }
    }
}

/// Non-blocking LED strip control.
///
/// Every animation request supersedes the one running before it: the
/// previous animation is cancelled and has stopped writing before the new
/// one produces its first frame.
#[async_trait]
pub trait LedControl: Send + Sync {
    /// Number of pixels on the strip
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the controller lifecycle
    fn state(&self) -> ControllerState;

    /// Cancel whatever runs and start `animation`. Returns as soon as the
    /// new animation is accepted.
    async fn start(&self, animation: Animation) -> Result<AnimationHandle, LedError>;

    /// Cancel the running animation, keeping the last frame on the strip.
    async fn stop_animation(&self) -> Result<(), LedError>;

    /// Change global brightness without interrupting the animation.
    async fn set_brightness(&self, level: u8) -> Result<(), LedError>;

    /// Cancel, blank the strip and release it. Idempotent.
    async fn close(&self) -> Result<(), LedError>;

    /// Show a single colour on every pixel.
    async fn set_all(&self, color: Rgb) -> Result<Outcome, LedError> {
        self.start(Animation::Solid(color)).await?.wait().await
    }

    /// Blank the strip. A no-op once the controller is closed.
    async fn off(&self) -> Result<Outcome, LedError> {
        match self.start(Animation::Off).await {
            Ok(handle) => handle.wait().await,
            Err(LedError::Closed) => Ok(Outcome::Completed),
            Err(e) => Err(e),
        }
    }

    /// Light pixels one by one, returning after the last pixel.
    async fn color_wipe(&self, color: Rgb, delay: Duration) -> Result<Outcome, LedError> {
        self.start(Animation::ColorWipe { color, delay })
            .await?
            .wait()
            .await
    }

    /// Endless rainbow; the handle resolves once it is cancelled.
    async fn rainbow(&self, wait: Duration) -> Result<AnimationHandle, LedError> {
        self.start(Animation::Rainbow { wait }).await
    }

    async fn rainbow_cycle(&self, wait: Duration, cycles: u32) -> Result<AnimationHandle, LedError> {
        self.start(Animation::RainbowCycle { wait, cycles }).await
    }

    /// Endless colour wipe / black wipe alternation
    async fn pulsed_wipe(&self, color: Rgb, delay: Duration) -> Result<AnimationHandle, LedError> {
        self.start(Animation::PulsedWipe { color, delay }).await
    }
}
