//! Log-only controller for runs without strip hardware

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ledstrip_driver::Rgb;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use crate::animation::Animation;
use crate::control::{AnimationHandle, ControllerState, LedControl, Outcome, TaskStatus};
use crate::error::LedError;

/// Accepted animations kept for inspection
pub const HISTORY_LEN: usize = 64;

struct MockState {
    state: ControllerState,
    brightness: u8,
    last_color: Option<Rgb>,
    history: VecDeque<Animation>,
    /// Status sender of the running endless animation
    current: Option<watch::Sender<TaskStatus>>,
}

impl MockState {
    fn supersede(&mut self) {
        if let Some(tx) = self.current.take() {
            let _ = tx.send(TaskStatus::Finished(Ok(Outcome::Cancelled)));
        }
    }
}

/// Controller that only logs and remembers what it was asked to do.
///
/// Finite animations complete immediately; endless ones stay "running"
/// until superseded, stopped or closed.
pub struct MockLedController {
    len: usize,
    inner: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockLedController {
    pub fn new(len: usize) -> Self {
        info!("[MOCK-LED] {} pixels", len);
        Self {
            len,
            inner: Mutex::new(MockState {
                state: ControllerState::Idle,
                brightness: 255,
                last_color: None,
                history: VecDeque::with_capacity(HISTORY_LEN),
                current: None,
            }),
            next_id: AtomicU64::new(0),
        }
    }

    /// Colour most recently requested (`None` for rainbows)
    pub fn last_color(&self) -> Option<Rgb> {
        self.inner.lock().last_color
    }

    /// The last `HISTORY_LEN` accepted animations, oldest first
    pub fn history(&self) -> Vec<Animation> {
        self.inner.lock().history.iter().copied().collect()
    }

    pub fn brightness(&self) -> u8 {
        self.inner.lock().brightness
    }
}

#[async_trait]
impl LedControl for MockLedController {
    fn len(&self) -> usize {
        self.len
    }

    fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    async fn start(&self, animation: Animation) -> Result<AnimationHandle, LedError> {
        animation.validate()?;

        let mut inner = self.inner.lock();
        if inner.state == ControllerState::Closed {
            return Err(LedError::Closed);
        }
        inner.supersede();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        inner.last_color = match animation {
            Animation::Solid(color)
            | Animation::ColorWipe { color, .. }
            | Animation::PulsedWipe { color, .. } => Some(color),
            Animation::Off => Some(Rgb::BLACK),
            Animation::Rainbow { .. } | Animation::RainbowCycle { .. } => None,
        };
        if inner.history.len() == HISTORY_LEN {
            inner.history.pop_front();
        }
        inner.history.push_back(animation);
        info!("[MOCK-LED] {} {:?}", animation.name(), animation);

        if animation.is_infinite() {
            let (tx, rx) = watch::channel(TaskStatus::Running);
            inner.current = Some(tx);
            inner.state = ControllerState::Running {
                id,
                animation: animation.name(),
            };
            Ok(AnimationHandle::new(id, animation, rx))
        } else {
            inner.state = ControllerState::Idle;
            Ok(AnimationHandle::finished(id, animation, Ok(Outcome::Completed)))
        }
    }

    async fn stop_animation(&self) -> Result<(), LedError> {
        let mut inner = self.inner.lock();
        if inner.state != ControllerState::Closed {
            inner.supersede();
            inner.state = ControllerState::Idle;
        }
        Ok(())
    }

    async fn set_brightness(&self, level: u8) -> Result<(), LedError> {
        let mut inner = self.inner.lock();
        if inner.state == ControllerState::Closed {
            return Err(LedError::Closed);
        }
        info!("[MOCK-LED] brightness {}", level);
        inner.brightness = level;
        Ok(())
    }

    async fn close(&self) -> Result<(), LedError> {
        let mut inner = self.inner.lock();
        if inner.state == ControllerState::Closed {
            return Ok(());
        }
        inner.supersede();
        inner.last_color = Some(Rgb::BLACK);
        inner.state = ControllerState::Closed;
        info!("[MOCK-LED] closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_mock_records_commands() {
        let mock = MockLedController::new(8);
        assert_eq!(mock.set_all(Rgb::RED).await.unwrap(), Outcome::Completed);
        mock.color_wipe(Rgb::BLUE, Duration::from_millis(10))
            .await
            .unwrap();
        mock.set_brightness(40).await.unwrap();

        assert_eq!(mock.last_color(), Some(Rgb::BLUE));
        assert_eq!(mock.history().len(), 2);
        assert_eq!(mock.brightness(), 40);
        assert_eq!(mock.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_mock_history_is_bounded() {
        let mock = MockLedController::new(4);
        for i in 0..HISTORY_LEN + 10 {
            mock.set_all(Rgb::new(i as u8, 0, 0)).await.unwrap();
        }

        let history = mock.history();
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history[0], Animation::Solid(Rgb::new(10, 0, 0)));
        assert_eq!(
            history[HISTORY_LEN - 1],
            Animation::Solid(Rgb::new((HISTORY_LEN + 9) as u8, 0, 0))
        );
    }

    #[tokio::test]
    async fn test_mock_supersedes_endless_animation() {
        let mock = MockLedController::new(8);
        let rainbow = mock.rainbow(Duration::from_millis(5)).await.unwrap();
        assert!(!rainbow.is_finished());
        assert!(matches!(mock.state(), ControllerState::Running { .. }));

        mock.off().await.unwrap();
        assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
        assert_eq!(mock.last_color(), Some(Rgb::BLACK));
    }

    #[tokio::test]
    async fn test_mock_close() {
        let mock = MockLedController::new(8);
        let pulse = mock
            .pulsed_wipe(Rgb::GREEN, Duration::from_millis(20))
            .await
            .unwrap();
        mock.close().await.unwrap();
        mock.close().await.unwrap();

        assert_eq!(pulse.wait().await.unwrap(), Outcome::Cancelled);
        assert!(matches!(
            mock.rainbow(Duration::ZERO).await,
            Err(LedError::Closed)
        ));
        assert!(mock.off().await.is_ok());
        assert!(mock.set_brightness(10).await.unwrap_err().is_invalid_command());
    }
}
