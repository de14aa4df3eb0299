//! Animation engine.
//!
//! An [`Animation`] is an immutable request. [`Animation::frames`] turns it
//! into a [`Frames`] generator that renders one frame at a time into the
//! caller's buffer and says how long to wait before the next one. The engine
//! never sleeps and never touches hardware.

use std::time::Duration;

use ledstrip_driver::Rgb;

use crate::error::{check_frame_delay, LedError};

/// Number of hues on the colour wheel (one full rainbow cycle).
pub const WHEEL_STEPS: u64 = 256;

// ── Requests ─────────────────────────────────────────────────────────

/// An animation request as submitted to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    /// Whole strip one colour.
    Solid(Rgb),
    /// Light pixels 0..N-1 one after another.
    ColorWipe { color: Rgb, delay: Duration },
    /// Endless rainbow moving along the strip.
    Rainbow { wait: Duration },
    /// `cycles` full rainbows spread over the whole strip.
    RainbowCycle { wait: Duration, cycles: u32 },
    /// Endless colour wipe followed by black wipe.
    PulsedWipe { color: Rgb, delay: Duration },
    Off,
}

impl Animation {
    pub fn name(&self) -> &'static str {
        match self {
            Animation::Solid(_) => "solid",
            Animation::ColorWipe { .. } => "color_wipe",
            Animation::Rainbow { .. } => "rainbow",
            Animation::RainbowCycle { .. } => "rainbow_cycle",
            Animation::PulsedWipe { .. } => "pulsed_wipe",
            Animation::Off => "off",
        }
    }

    /// Whether the animation only ends by being cancelled.
    pub fn is_infinite(&self) -> bool {
        matches!(
            self,
            Animation::Rainbow { .. } | Animation::PulsedWipe { .. }
        )
    }

    /// Reject malformed parameters before anything reaches the strip.
    pub fn validate(&self) -> Result<(), LedError> {
        match *self {
            Animation::Solid(_) | Animation::Off => Ok(()),
            Animation::ColorWipe { delay, .. } | Animation::PulsedWipe { delay, .. } => {
                check_frame_delay(delay).map(|_| ())
            }
            Animation::Rainbow { wait } => check_frame_delay(wait).map(|_| ()),
            Animation::RainbowCycle { wait, cycles } => {
                if cycles == 0 {
                    return Err(LedError::InvalidCommand(
                        "rainbow_cycle needs at least one cycle".into(),
                    ));
                }
                check_frame_delay(wait).map(|_| ())
            }
        }
    }

    /// Total number of frames, `None` for infinite animations.
    pub fn frame_count(&self, len: usize) -> Option<u64> {
        match *self {
            Animation::Solid(_) | Animation::Off => Some(1),
            Animation::ColorWipe { .. } => Some(len as u64),
            Animation::RainbowCycle { cycles, .. } => Some(WHEEL_STEPS * cycles as u64),
            Animation::Rainbow { .. } | Animation::PulsedWipe { .. } => None,
        }
    }

    /// Start a fresh frame sequence for a strip of `len` pixels.
    pub fn frames(&self, len: usize) -> Frames {
        Frames {
            animation: *self,
            len,
            step: 0,
            total: self.frame_count(len),
        }
    }
}

// ── Frame generation ─────────────────────────────────────────────────

/// Lazy frame sequence of one animation run.
#[derive(Debug, Clone)]
pub struct Frames {
    animation: Animation,
    len: usize,
    step: u64,
    total: Option<u64>,
}

impl Frames {
    /// Frames produced so far.
    pub fn position(&self) -> u64 {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.total.is_some_and(|total| self.step >= total)
    }

    /// Render the next frame into `buf` and return the delay to wait after
    /// it is shown, or `None` once the sequence is exhausted.
    ///
    /// `buf` must be the buffer of the frame displayed last; wipes only
    /// overwrite the pixel they advance over.
    pub fn next_into(&mut self, buf: &mut [Rgb]) -> Option<Duration> {
        if self.is_done() || self.len == 0 {
            return None;
        }
        debug_assert_eq!(buf.len(), self.len);

        let step = self.step;
        let len = self.len as u64;
        let delay = match self.animation {
            Animation::Solid(color) => {
                buf.fill(color);
                Duration::ZERO
            }
            Animation::Off => {
                buf.fill(Rgb::BLACK);
                Duration::ZERO
            }
            Animation::ColorWipe { color, delay } => {
                buf[step as usize] = color;
                delay
            }
            Animation::Rainbow { wait } => {
                let j = step % WHEEL_STEPS;
                for (i, px) in buf.iter_mut().enumerate() {
                    *px = wheel(((i as u64 + j) & 255) as u8);
                }
                wait
            }
            Animation::RainbowCycle { wait, .. } => {
                let j = step % WHEEL_STEPS;
                for (i, px) in buf.iter_mut().enumerate() {
                    let hue = (i as u64 * WHEEL_STEPS / len + j) & 255;
                    *px = wheel(hue as u8);
                }
                wait
            }
            Animation::PulsedWipe { color, delay } => {
                let lit = (step / len) % 2 == 0;
                buf[(step % len) as usize] = if lit { color } else { Rgb::BLACK };
                delay
            }
        };

        self.step += 1;
        // Finite sequences end right after their last write
        if self.is_done() {
            Some(Duration::ZERO)
        } else {
            Some(delay)
        }
    }
}

/// Classic three-segment colour wheel: red → green → blue → red.
pub fn wheel(pos: u8) -> Rgb {
    match pos {
        0..=84 => Rgb::new(pos * 3, 255 - pos * 3, 0),
        85..=169 => {
            let p = pos - 85;
            Rgb::new(255 - p * 3, 0, p * 3)
        }
        _ => {
            let p = pos - 170;
            Rgb::new(0, p * 3, 255 - p * 3)
        }
    }
}
