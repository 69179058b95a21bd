//! Framebuffer engine for SSD1306 monochrome OLED panels
//!
//! Drawing goes into a packed 1 bit per pixel buffer in memory; a background
//! thread sends the changed 8 row pages to the panel. Colors are `Rgb888` and
//! quantized to a single bit, see [`color`].
//!
//! ### Usage
//!
//! 1. create an [`Ssd1306Controller`] with an [`EngineConfig`]
//! 1. attach the I2C bus with [`Ssd1306Controller::begin`]
//! 1. [`DisplayController::configure`] it for the panel, e.g. [`config::OLED_128X64`]
//! 1. draw, either through [`DisplayController`] or any
//!    [`embedded_graphics`](https://github.com/embedded-graphics/embedded-graphics)
//!    drawable, batching with
//!    [`DisplayController::suspend_background_primitive_execution`] /
//!    [`DisplayController::resume_background_primitive_execution`]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]

pub mod bitmap;
pub mod color;
pub mod config;
pub mod controller;
pub mod error;
pub mod framebuffer;
pub mod glyph;
mod raster;
pub mod scroll;
pub mod sim;
pub mod ssd1306;
pub mod sync;

pub use crate::bitmap::{Bitmap, PixelFormat, SaveBuffer};
pub use crate::color::NativePixelFormat;
pub use crate::config::{EngineConfig, PanMode, Resolution};
pub use crate::controller::{DisplayController, PaintState, Ssd1306Controller};
pub use crate::error::{DisplayError, Error, Result};
pub use crate::framebuffer::FrameBuffer;
pub use crate::glyph::{DoubleWidth, Glyph, GlyphOptions};
pub use crate::scroll::ScrollFill;
pub use crate::ssd1306::{cmd::Cmd, flag::Flag, interface::NoResetPin};
pub use crate::sync::{FlushStatsSnapshot, SyncTask};
