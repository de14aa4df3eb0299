//! WS2812 strip over Linux spidev
//!
//! Every colour bit becomes one SPI byte at 6.4 MHz (1.25us per bit):
//! `0xF8` (high ~780ns) for a 1, `0xC0` (high ~310ns) for a 0. A frame is
//! `len * 24` encoded bytes followed by a run of zero bytes that holds the
//! line low long enough to latch, written in a single transfer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;

use tracing::{debug, info};

use crate::error::DriverError;
use crate::types::{ColorOrder, Rgb, SpiConfig, SPIDEV_BUFSIZ, SPI_LATCH_BYTES};
use crate::StripDriver;

const BIT_ONE: u8 = 0xF8;
const BIT_ZERO: u8 = 0xC0;

// spidev ioctl definitions
// From linux/spi/spidev.h:
// #define SPI_IOC_WR_MODE          _IOW(SPI_IOC_MAGIC, 1, __u8)
// #define SPI_IOC_WR_BITS_PER_WORD _IOW(SPI_IOC_MAGIC, 3, __u8)
// #define SPI_IOC_WR_MAX_SPEED_HZ  _IOW(SPI_IOC_MAGIC, 4, __u32)

const SPI_IOC_MAGIC: u8 = b'k';

const fn spi_iow(nr: u32, size: usize) -> libc::c_ulong {
    // _IOC_WRITE = 1; dir: bits 30-31, size: 16-29, type: 8-15, nr: 0-7
    let dir: u32 = 1;
    let size = (size as u32) & 0x3FFF;
    ((dir << 30) | (size << 16) | ((SPI_IOC_MAGIC as u32) << 8) | nr) as libc::c_ulong
}

const SPI_IOC_WR_MODE: libc::c_ulong = spi_iow(1, std::mem::size_of::<u8>());
const SPI_IOC_WR_BITS_PER_WORD: libc::c_ulong = spi_iow(3, std::mem::size_of::<u8>());
const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = spi_iow(4, std::mem::size_of::<u32>());

/// Number of bytes a frame of `len` pixels occupies on the wire
pub fn frame_size(len: usize) -> usize {
    len * 24 + SPI_LATCH_BYTES
}

/// Encode pixels into the SPI byte stream, latch gap included
fn encode_into(out: &mut Vec<u8>, pixels: &[Rgb], order: ColorOrder, brightness: u8) {
    out.clear();
    for pixel in pixels {
        for byte in order.arrange(pixel.dim(brightness)) {
            for bit in (0..8).rev() {
                out.push(if byte & (1 << bit) != 0 { BIT_ONE } else { BIT_ZERO });
            }
        }
    }
    out.resize(out.len() + SPI_LATCH_BYTES, 0);
}

/// WS2812 strip on `/dev/spidevB.D`
pub struct SpiStrip {
    path: String,
    file: Option<File>,
    order: ColorOrder,
    brightness: u8,
    pixels: Vec<Rgb>,
    tx: Vec<u8>,
}

impl SpiStrip {
    /// Open the spidev node and configure mode 0, 8 bits per word and the
    /// clock from `config`.
    pub fn open(len: usize, config: &SpiConfig) -> Result<Self, DriverError> {
        if len == 0 {
            return Err(DriverError::InvalidConfig("pixel count must be > 0".into()));
        }
        if len > SpiConfig::MAX_PIXELS {
            return Err(DriverError::InvalidConfig(format!(
                "{len} pixels need {} bytes per transfer, spidev allows {SPIDEV_BUFSIZ}",
                frame_size(len)
            )));
        }

        let path = config.device_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| DriverError::Open {
                path: path.clone(),
                source,
            })?;

        let mode: u8 = 0;
        ioctl_write(&file, SPI_IOC_WR_MODE, "SPI_IOC_WR_MODE", &mode)?;
        let bits: u8 = 8;
        ioctl_write(
            &file,
            SPI_IOC_WR_BITS_PER_WORD,
            "SPI_IOC_WR_BITS_PER_WORD",
            &bits,
        )?;
        ioctl_write(
            &file,
            SPI_IOC_WR_MAX_SPEED_HZ,
            "SPI_IOC_WR_MAX_SPEED_HZ",
            &config.speed_hz,
        )?;

        info!(
            "Opened {} ({} pixels, {} Hz, {})",
            path,
            len,
            config.speed_hz,
            config.color_order.as_str()
        );

        Ok(Self {
            path,
            file: Some(file),
            order: config.color_order,
            brightness: 255,
            pixels: vec![Rgb::BLACK; len],
            tx: Vec::with_capacity(frame_size(len)),
        })
    }

    fn file(&mut self) -> Result<&mut File, DriverError> {
        self.file.as_mut().ok_or(DriverError::Released)
    }
}

fn ioctl_write<T>(
    file: &File,
    request: libc::c_ulong,
    name: &'static str,
    value: &T,
) -> Result<(), DriverError> {
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), request as _, value as *const T) };
    if ret < 0 {
        return Err(DriverError::Ioctl {
            request: name,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

impl StripDriver for SpiStrip {
    fn len(&self) -> usize {
        self.pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), DriverError> {
        self.file()?;
        let len = self.pixels.len();
        let slot = self
            .pixels
            .get_mut(index)
            .ok_or(DriverError::IndexOutOfRange { index, len })?;
        *slot = color;
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DriverError> {
        self.file()?;
        self.brightness = level;
        Ok(())
    }

    fn show(&mut self) -> Result<(), DriverError> {
        let mut tx = std::mem::take(&mut self.tx);
        encode_into(&mut tx, &self.pixels, self.order, self.brightness);
        let result = self.file().and_then(|f| f.write_all(&tx).map_err(DriverError::Io));
        self.tx = tx;
        result
    }

    fn release(&mut self) -> Result<(), DriverError> {
        if self.file.take().is_some() {
            debug!("Released {}", self.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_numbers() {
        // Values from the C macros
        assert_eq!(SPI_IOC_WR_MODE, 0x40016B01);
        assert_eq!(SPI_IOC_WR_BITS_PER_WORD, 0x40016B03);
        assert_eq!(SPI_IOC_WR_MAX_SPEED_HZ, 0x40046B04);
    }

    #[test]
    fn test_encode_single_pixel() {
        let mut out = Vec::new();
        encode_into(&mut out, &[Rgb::new(0x80, 0x01, 0x00)], ColorOrder::Grb, 255);
        assert_eq!(out.len(), frame_size(1));

        // Green first: 0x01
        assert!(out[..7].iter().all(|b| *b == BIT_ZERO));
        assert_eq!(out[7], BIT_ONE);
        // Red: 0x80
        assert_eq!(out[8], BIT_ONE);
        assert!(out[9..16].iter().all(|b| *b == BIT_ZERO));
        // Blue: 0x00
        assert!(out[16..24].iter().all(|b| *b == BIT_ZERO));
        assert!(out[24..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_applies_brightness() {
        let mut out = Vec::new();
        encode_into(&mut out, &[Rgb::WHITE], ColorOrder::Rgb, 0);
        assert!(out[..24].iter().all(|b| *b == BIT_ZERO));
    }

    #[test]
    fn test_open_rejects_oversized_strip() {
        let err = SpiStrip::open(1000, &SpiConfig::default()).err().unwrap();
        assert!(matches!(err, DriverError::InvalidConfig(_)));
        let err = SpiStrip::open(0, &SpiConfig::default()).err().unwrap();
        assert!(matches!(err, DriverError::InvalidConfig(_)));
    }
}
