//! Application status indicator
//!
//! Maps named application states (boot, listening, speaking, ...) onto LED
//! effects. `set_state` is synchronous and never blocks, so voice and
//! gamepad threads can call it directly; a single dispatcher task applies
//! the states in the order they were submitted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ledstrip_driver::Rgb;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::animation::Animation;
use crate::control::LedControl;
use crate::error::LedError;

/// States the indicator knows how to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndicatorState {
    Boot,
    Ready,
    Fatal,
    Wake,
    Listen,
    Processing,
    Speaking,
    Off,
}

impl IndicatorState {
    pub const ALL: [IndicatorState; 8] = [
        IndicatorState::Boot,
        IndicatorState::Ready,
        IndicatorState::Fatal,
        IndicatorState::Wake,
        IndicatorState::Listen,
        IndicatorState::Processing,
        IndicatorState::Speaking,
        IndicatorState::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorState::Boot => "boot",
            IndicatorState::Ready => "ready",
            IndicatorState::Fatal => "fatal",
            IndicatorState::Wake => "wake",
            IndicatorState::Listen => "listen",
            IndicatorState::Processing => "processing",
            IndicatorState::Speaking => "speaking",
            IndicatorState::Off => "off",
        }
    }

    /// Map a conversation-manager state name. Unknown names turn the
    /// indicator off.
    pub fn from_conversation(name: &str) -> Self {
        match name {
            "WAKE" => IndicatorState::Wake,
            "ATTENTIVE_LISTEN" => IndicatorState::Listen,
            "THINK" => IndicatorState::Processing,
            "SPEAK" => IndicatorState::Speaking,
            other => other.parse().unwrap_or(IndicatorState::Off),
        }
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown indicator state: \"{s}\""))
    }
}

/// Effect shown for one indicator state, as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum StatusEffect {
    Solid {
        color: Rgb,
    },
    Wipe {
        color: Rgb,
        delay_ms: u64,
    },
    Pulse {
        color: Rgb,
        delay_ms: u64,
        /// Blank the strip before the pulse starts
        #[serde(default)]
        blank_first: bool,
    },
    Rainbow {
        delay_ms: u64,
    },
    Off,
}

impl StatusEffect {
    fn delay_ms(&self) -> Option<u64> {
        match *self {
            StatusEffect::Wipe { delay_ms, .. }
            | StatusEffect::Pulse { delay_ms, .. }
            | StatusEffect::Rainbow { delay_ms } => Some(delay_ms),
            StatusEffect::Solid { .. } | StatusEffect::Off => None,
        }
    }

    /// Check the effect would be accepted by a controller.
    pub fn validate(&self) -> Result<(), LedError> {
        match self.delay_ms() {
            Some(ms) => crate::error::check_frame_delay(Duration::from_millis(ms)).map(|_| ()),
            None => Ok(()),
        }
    }

    async fn apply(&self, control: &dyn LedControl) -> Result<(), LedError> {
        match *self {
            StatusEffect::Solid { color } => {
                control.set_all(color).await?;
            }
            StatusEffect::Wipe { color, delay_ms } => {
                control
                    .start(Animation::ColorWipe {
                        color,
                        delay: Duration::from_millis(delay_ms),
                    })
                    .await?;
            }
            StatusEffect::Pulse {
                color,
                delay_ms,
                blank_first,
            } => {
                if blank_first {
                    control.off().await?;
                }
                control
                    .pulsed_wipe(color, Duration::from_millis(delay_ms))
                    .await?;
            }
            StatusEffect::Rainbow { delay_ms } => {
                control.rainbow(Duration::from_millis(delay_ms)).await?;
            }
            StatusEffect::Off => {
                control.off().await?;
            }
        }
        Ok(())
    }
}

/// Effect per indicator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPalette {
    effects: BTreeMap<IndicatorState, StatusEffect>,
}

impl Default for StatusPalette {
    fn default() -> Self {
        use IndicatorState::*;
        let effects = BTreeMap::from([
            (Boot, pulse(Rgb::new(255, 160, 0), 30, false)),
            (Ready, StatusEffect::Solid { color: Rgb::new(0, 32, 0) }),
            (Fatal, StatusEffect::Solid { color: Rgb::RED }),
            (Wake, StatusEffect::Solid { color: Rgb::new(0, 128, 0) }),
            (Listen, pulse(Rgb::GREEN, 20, false)),
            (Processing, pulse(Rgb::new(0, 0, 128), 20, true)),
            (Speaking, StatusEffect::Solid { color: Rgb::BLUE }),
            (Off, StatusEffect::Off),
        ]);
        Self { effects }
    }
}

fn pulse(color: Rgb, delay_ms: u64, blank_first: bool) -> StatusEffect {
    StatusEffect::Pulse {
        color,
        delay_ms,
        blank_first,
    }
}

impl StatusPalette {
    pub fn effect(&self, state: IndicatorState) -> StatusEffect {
        self.effects
            .get(&state)
            .copied()
            .unwrap_or(StatusEffect::Off)
    }

    pub fn set(&mut self, state: IndicatorState, effect: StatusEffect) {
        self.effects.insert(state, effect);
    }
}

enum IndicatorCommand {
    Set(IndicatorState),
    Shutdown(oneshot::Sender<Result<(), LedError>>),
}

/// Non-blocking front end turning application states into LED effects
#[derive(Clone)]
pub struct StatusIndicator {
    tx: mpsc::UnboundedSender<IndicatorCommand>,
    control: Arc<dyn LedControl>,
}

impl StatusIndicator {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn new(control: Arc<dyn LedControl>, palette: StatusPalette) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatcher(Arc::clone(&control), palette, rx));
        Self { tx, control }
    }

    pub fn control(&self) -> &Arc<dyn LedControl> {
        &self.control
    }

    /// Queue a state change. Never blocks; callable from any thread.
    pub fn set_state(&self, state: IndicatorState) {
        if self.tx.send(IndicatorCommand::Set(state)).is_err() {
            debug!("Status indicator stopped, ignoring {}", state);
        }
    }

    /// Queue a state change by conversation-manager state name
    pub fn set_conversation_state(&self, name: &str) {
        self.set_state(IndicatorState::from_conversation(name));
    }

    /// Apply every queued state, then close the controller.
    pub async fn shutdown(&self) -> Result<(), LedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(IndicatorCommand::Shutdown(reply_tx)).is_ok() {
            if let Ok(result) = reply_rx.await {
                return result;
            }
        }
        self.control.close().await
    }
}

async fn dispatcher(
    control: Arc<dyn LedControl>,
    palette: StatusPalette,
    mut rx: mpsc::UnboundedReceiver<IndicatorCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            IndicatorCommand::Set(state) => {
                let effect = palette.effect(state);
                debug!("Indicator -> {} ({:?})", state, effect);
                if let Err(e) = effect.apply(control.as_ref()).await {
                    warn!("Failed to show indicator state {}: {}", state, e);
                }
            }
            IndicatorCommand::Shutdown(reply) => {
                let _ = reply.send(control.close().await);
                break;
            }
        }
    }
    debug!("Status indicator dispatcher stopped");
}
