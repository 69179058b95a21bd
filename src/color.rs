//! Color quantization for the 1 bit panel
//!
//! The panel has no gray levels, so every input color is reduced to a single
//! bit. The rules are fixed integer thresholds so the same input always lights
//! the same pixels on every platform:
//!
//! - RGB colors are on when the integer luma `(299 R + 587 G + 114 B) / 1000`
//!   is at least [`LUMA_THRESHOLD`].
//! - RGBA2222 pixels are drawn when the 2 bit alpha is at least
//!   [`ALPHA2_THRESHOLD`], RGBA8888 pixels when the 8 bit alpha is at least
//!   [`ALPHA8_THRESHOLD`]. Pixels below the threshold leave the destination
//!   untouched.

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};

/// Minimum luma (0..=255) of a lit pixel
pub const LUMA_THRESHOLD: u32 = 128;

/// Minimum 2 bit alpha of a drawn RGBA2222 pixel
pub const ALPHA2_THRESHOLD: u8 = 2;

/// Minimum 8 bit alpha of a drawn RGBA8888 pixel
pub const ALPHA8_THRESHOLD: u8 = 128;

/// Native pixel format of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePixelFormat {
    /// One bit per pixel
    Mono,
}

/// Reduce a color to the panel bit
#[inline]
pub fn quantize(color: Rgb888) -> bool {
    luma(color.r(), color.g(), color.b()) >= LUMA_THRESHOLD
}

/// Integer luma of an 8 bit per channel color
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u32 {
    (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000
}

/// Expand a bit read back from the buffer to full intensity
#[inline]
pub fn expand(on: bool) -> Rgb888 {
    if on {
        Rgb888::WHITE
    } else {
        Rgb888::BLACK
    }
}

/// Decoded RGBA2222 pixel: `AABBGGRR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba2222(pub u8);

impl Rgba2222 {
    pub fn alpha(self) -> u8 {
        self.0 >> 6
    }

    /// Color part widened to 8 bits per channel
    pub fn rgb(self) -> Rgb888 {
        let widen = |v: u8| (v & 0x03) * 85;
        Rgb888::new(widen(self.0), widen(self.0 >> 2), widen(self.0 >> 4))
    }

    /// `Some(bit)` when the pixel is covered, `None` when it is transparent
    pub fn coverage(self) -> Option<bool> {
        (self.alpha() >= ALPHA2_THRESHOLD).then(|| quantize(self.rgb()))
    }
}

/// Decoded RGBA8888 pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba8888 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8888 {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Rgba8888 {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
            a: bytes[3],
        }
    }

    pub fn coverage(self) -> Option<bool> {
        (self.a >= ALPHA8_THRESHOLD).then(|| luma(self.r, self.g, self.b) >= LUMA_THRESHOLD)
    }
}
