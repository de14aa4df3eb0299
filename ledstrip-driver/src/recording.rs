//! In-memory recording driver
//!
//! `RecordingDriver` implements [`StripDriver`] without hardware. A cloneable
//! [`StripRecorder`] handle stays with the test (or harness) and observes
//! everything the driver saw:
//!
//! - a snapshot of the pixel buffer at every `show()`
//! - release count, brightness, full call log
//! - overlapping (re-entrant) calls, which must never happen
//! - "partial" frames: a `show()` after only some pixels were rewritten
//!
//! Show failures can be injected to simulate bus faults.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::DriverError;
use crate::types::Rgb;
use crate::StripDriver;

/// A single call observed by the recording driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    SetPixel { index: usize, color: Rgb },
    SetBrightness(u8),
    Show,
    Release,
}

struct RecorderState {
    pixels: Vec<Rgb>,
    touched: Vec<bool>,
    brightness: u8,
    calls: Vec<DriverCall>,
    frames: Vec<Vec<Rgb>>,
    releases: usize,
    released: bool,
    calls_after_release: usize,
    partial_frames: usize,
    failing_shows: usize,
}

/// Inspection handle shared with a [`RecordingDriver`]
#[derive(Clone)]
pub struct StripRecorder {
    state: Arc<Mutex<RecorderState>>,
    in_call: Arc<AtomicBool>,
    overlapping: Arc<AtomicUsize>,
}

impl StripRecorder {
    /// Pixel snapshots, one per successful `show()`
    pub fn frames(&self) -> Vec<Vec<Rgb>> {
        self.state.lock().frames.clone()
    }

    /// Number of successful `show()` calls so far
    pub fn show_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Last frame pushed to the "hardware"
    pub fn last_frame(&self) -> Option<Vec<Rgb>> {
        self.state.lock().frames.last().cloned()
    }

    /// Current driver buffer (including pixels not shown yet)
    pub fn pixels(&self) -> Vec<Rgb> {
        self.state.lock().pixels.clone()
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn brightness(&self) -> u8 {
        self.state.lock().brightness
    }

    /// How many times `release()` was called
    pub fn release_count(&self) -> usize {
        self.state.lock().releases
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Calls (other than `release`) made after the handle was released
    pub fn calls_after_release(&self) -> usize {
        self.state.lock().calls_after_release
    }

    /// Calls that started while another call was still executing
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    /// Shows that pushed a buffer in which only some pixels had been rewritten
    pub fn partial_frames(&self) -> usize {
        self.state.lock().partial_frames
    }

    /// Make the next `count` calls to `show()` fail with a bus fault
    pub fn fail_next_shows(&self, count: usize) {
        self.state.lock().failing_shows = count;
    }
}

/// Resets the in-call flag when a driver call returns
struct CallGuard<'a>(&'a AtomicBool);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Instrumented in-memory strip
pub struct RecordingDriver {
    len: usize,
    recorder: StripRecorder,
    /// Artificial latency for `show()` (simulates a slow bus)
    show_latency: Duration,
}

impl RecordingDriver {
    /// Create a driver for `len` pixels plus the handle used to inspect it
    pub fn new(len: usize) -> (Self, StripRecorder) {
        let recorder = StripRecorder {
            state: Arc::new(Mutex::new(RecorderState {
                pixels: vec![Rgb::BLACK; len],
                touched: vec![false; len],
                brightness: 255,
                calls: Vec::new(),
                frames: Vec::new(),
                releases: 0,
                released: false,
                calls_after_release: 0,
                partial_frames: 0,
                failing_shows: 0,
            })),
            in_call: Arc::new(AtomicBool::new(false)),
            overlapping: Arc::new(AtomicUsize::new(0)),
        };
        let driver = Self {
            len,
            recorder: recorder.clone(),
            show_latency: Duration::ZERO,
        };
        (driver, recorder)
    }

    /// Block inside every `show()` for `latency`
    pub fn with_show_latency(mut self, latency: Duration) -> Self {
        self.show_latency = latency;
        self
    }

    fn enter(&self) -> CallGuard<'_> {
        if self.recorder.in_call.swap(true, Ordering::SeqCst) {
            self.recorder.overlapping.fetch_add(1, Ordering::SeqCst);
            warn!("Recording driver entered while another call was in flight");
        }
        CallGuard(&self.recorder.in_call)
    }

    fn check_released(state: &mut RecorderState) -> Result<(), DriverError> {
        if state.released {
            state.calls_after_release += 1;
            return Err(DriverError::Released);
        }
        Ok(())
    }
}

impl StripDriver for RecordingDriver {
    fn len(&self) -> usize {
        self.len
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), DriverError> {
        let _guard = self.enter();
        let mut state = self.recorder.state.lock();
        Self::check_released(&mut state)?;
        if index >= self.len {
            return Err(DriverError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        state.calls.push(DriverCall::SetPixel { index, color });
        state.pixels[index] = color;
        state.touched[index] = true;
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DriverError> {
        let _guard = self.enter();
        let mut state = self.recorder.state.lock();
        Self::check_released(&mut state)?;
        state.calls.push(DriverCall::SetBrightness(level));
        state.brightness = level;
        Ok(())
    }

    fn show(&mut self) -> Result<(), DriverError> {
        let _guard = self.enter();
        if !self.show_latency.is_zero() {
            std::thread::sleep(self.show_latency);
        }

        let mut state = self.recorder.state.lock();
        Self::check_released(&mut state)?;
        state.calls.push(DriverCall::Show);

        let touched = state.touched.iter().filter(|t| **t).count();
        state.touched.iter_mut().for_each(|t| *t = false);
        if touched > 0 && touched < self.len {
            state.partial_frames += 1;
        }

        if state.failing_shows > 0 {
            state.failing_shows -= 1;
            debug!("Injected show failure");
            return Err(DriverError::Bus("injected show failure".into()));
        }

        let frame = state.pixels.clone();
        state.frames.push(frame);
        Ok(())
    }

    fn release(&mut self) -> Result<(), DriverError> {
        let _guard = self.enter();
        let mut state = self.recorder.state.lock();
        state.calls.push(DriverCall::Release);
        state.releases += 1;
        state.released = true;
        Ok(())
    }
}
