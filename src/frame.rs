//! Frame buffer and per-frame post-processing.

use ledstrip_driver::Rgb;

/// WS2812B model: each channel draws `MA_PER_CHANNEL` mA at value 255.
pub const MA_PER_CHANNEL: f32 = 20.0;

/// Logical pixel state of the strip. The length is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: Box<[Rgb]>,
}

impl FrameBuffer {
    /// All-black buffer of `len` pixels.
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Rgb::BLACK; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn fill(&mut self, color: Rgb) {
        self.pixels.fill(color);
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    pub fn is_black(&self) -> bool {
        self.pixels.iter().all(Rgb::is_black)
    }

    /// Copy of the buffer as it should be sent to the bus.
    pub fn to_wire(&self, budget_ma: u32) -> Vec<Rgb> {
        let mut out = self.pixels.to_vec();
        apply_power_budget(&mut out, budget_ma);
        out
    }
}

/// Estimated current draw of a frame in mA.
pub fn estimate_current_ma(leds: &[Rgb]) -> f32 {
    let ma_per_unit = MA_PER_CHANNEL / 255.0;
    leds.iter()
        .map(|c| (c.r as f32 + c.g as f32 + c.b as f32) * ma_per_unit)
        .sum()
}

/// Uniformly dim `leds` so the estimated current stays within `budget_ma`.
///
/// A budget of 0 means unlimited. Returns (estimated mA before scaling,
/// whether scaling was applied).
pub fn apply_power_budget(leds: &mut [Rgb], budget_ma: u32) -> (f32, bool) {
    let total_ma = estimate_current_ma(leds);

    if budget_ma > 0 && total_ma > budget_ma as f32 {
        let scale = budget_ma as f32 / total_ma;
        for led in leds.iter_mut() {
            *led = led.scale(scale);
        }
        (total_ma, true)
    } else {
        (total_ma, false)
    }
}
