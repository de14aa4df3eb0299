//! Common types for the driver layer

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// RGB colour triple, one byte per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }

    /// Scale every channel by `level / 255` (global brightness).
    pub fn dim(self, level: u8) -> Self {
        let scale = |c: u8| ((c as u16 * level as u16) / 255) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    /// Scale brightness by a factor in [0, 1].
    pub fn scale(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Self {
            r: (self.r as f32 * f) as u8,
            g: (self.g as f32 * f) as u8,
            b: (self.b as f32 * f) as u8,
        }
    }

    /// Parse a colour string: "#RRGGBB", "r,g,b", or a name like "red".
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() == 6 && hex.is_ascii() {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                return Some(Self::new(r, g, b));
            }
            return None;
        }
        if s.contains(',') {
            let mut parts = s.split(',').map(|p| p.trim().parse::<u8>());
            let (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return None;
            };
            return Some(Self::new(r, g, b));
        }
        match s.to_ascii_lowercase().as_str() {
            "red" => Some(Self::RED),
            "green" => Some(Self::GREEN),
            "blue" => Some(Self::BLUE),
            "white" => Some(Self::WHITE),
            "black" | "off" => Some(Self::BLACK),
            "yellow" => Some(Self::new(255, 255, 0)),
            "cyan" => Some(Self::new(0, 255, 255)),
            "magenta" | "pink" => Some(Self::new(255, 0, 255)),
            "orange" => Some(Self::new(255, 165, 0)),
            "purple" => Some(Self::new(128, 0, 255)),
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::parse(s).ok_or_else(|| format!("invalid colour: \"{s}\""))
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

// Colours round-trip through config files as "#RRGGBB" strings.
impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Order in which the strip expects colour channels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorOrder {
    Rgb,
    Rbg,
    /// WS2812B default
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorOrder::Rgb => "RGB",
            ColorOrder::Rbg => "RBG",
            ColorOrder::Grb => "GRB",
            ColorOrder::Gbr => "GBR",
            ColorOrder::Brg => "BRG",
            ColorOrder::Bgr => "BGR",
        }
    }

    /// Reorder a colour into wire byte order.
    pub fn arrange(&self, c: Rgb) -> [u8; 3] {
        match self {
            ColorOrder::Rgb => [c.r, c.g, c.b],
            ColorOrder::Rbg => [c.r, c.b, c.g],
            ColorOrder::Grb => [c.g, c.r, c.b],
            ColorOrder::Gbr => [c.g, c.b, c.r],
            ColorOrder::Brg => [c.b, c.r, c.g],
            ColorOrder::Bgr => [c.b, c.g, c.r],
        }
    }
}

impl FromStr for ColorOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(ColorOrder::Rgb),
            "RBG" => Ok(ColorOrder::Rbg),
            "GRB" => Ok(ColorOrder::Grb),
            "GBR" => Ok(ColorOrder::Gbr),
            "BRG" => Ok(ColorOrder::Brg),
            "BGR" => Ok(ColorOrder::Bgr),
            _ => Err(format!("unknown colour order: \"{s}\"")),
        }
    }
}

impl Serialize for ColorOrder {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColorOrder {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Low time after a frame: 48 bytes * 1.25us = 60us
pub(crate) const SPI_LATCH_BYTES: usize = 48;

/// Default spidev `bufsiz` module parameter
pub(crate) const SPIDEV_BUFSIZ: usize = 4096;

/// SPI wiring of a WS2812 strip (`/dev/spidev{bus}.{device}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpiConfig {
    pub bus: u8,
    pub device: u8,
    /// 6.4 MHz gives 1.25us per encoded bit (one SPI byte)
    pub speed_hz: u32,
    pub color_order: ColorOrder,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            device: 0,
            speed_hz: 6_400_000,
            color_order: ColorOrder::Grb,
        }
    }
}

impl SpiConfig {
    /// Longest strip that fits in one spidev transfer
    pub const MAX_PIXELS: usize = (SPIDEV_BUFSIZ - SPI_LATCH_BYTES) / 24;

    pub fn device_path(&self) -> String {
        format!("/dev/spidev{}.{}", self.bus, self.device)
    }
}
