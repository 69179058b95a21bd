//! Packed 1 bit per pixel framebuffer
//!
//! Rows are stored top to bottom, `stride = ceil(width / 8)` bytes each, most
//! significant bit first (bit 7 of byte 0 is the leftmost pixel). Bits past the
//! screen width in the trailing byte of a row are always zero.
//!
//! Drawing works in logical (viewport) coordinates. A logical pixel lives at
//! physical position `((x + col) mod width, (y + row) mod height)` where
//! `col`/`row` are the current pan offsets.

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::config::Resolution;
use crate::error::{Error, Result};
use crate::ssd1306::flag::Flag;

/// Pan offsets, always normalised to `0..width` / `0..height`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub col: i32,
    pub row: i32,
}

/// Inclusive clipping bounds in logical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Clip {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub fn is_empty(&self) -> bool {
        self.x1 > self.x2 || self.y1 > self.y2
    }
}

pub struct FrameBuffer {
    buffers: Vec<Vec<u8>>,
    /// Index of the buffer drawing calls write to
    draw: usize,
    width: i32,
    height: i32,
    stride: usize,
    viewport_width: i32,
    viewport_height: i32,
    pub(crate) scroll: ScrollState,
    clip: Clip,
    /// Controller RAM pages waiting for transmission, bit n = page n
    dirty: u8,
    /// Start line register value waiting for transmission
    pending_start_line: Option<u8>,
}

impl FrameBuffer {
    /// Allocate storage for `resolution`; a viewport of `None` covers the screen
    pub fn new(resolution: &Resolution, viewport: Option<Size>, double_buffered: bool) -> Result<Self> {
        let width = resolution.width as i32;
        let height = resolution.height as i32;
        let (viewport_width, viewport_height) = match viewport {
            Some(size) => (size.width as i32, size.height as i32),
            None => (width, height),
        };
        if viewport_width > width || viewport_height > height {
            return Err(Error::Configuration(format!(
                "viewport {}x{} larger than screen {}x{}",
                viewport_width, viewport_height, width, height
            )));
        }

        let stride = (width as usize).div_ceil(8);
        let bytes = stride * height as usize;
        let count = if double_buffered { 2 } else { 1 };
        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory { bytes: bytes * count })?;
        for _ in 0..count {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(bytes)
                .map_err(|_| Error::OutOfMemory { bytes: bytes * count })?;
            buffer.resize(bytes, 0);
            buffers.push(buffer);
        }

        log::debug!(
            "Allocated {} framebuffer(s) of {} bytes, viewport {}x{}",
            count,
            bytes,
            viewport_width,
            viewport_height
        );

        Ok(FrameBuffer {
            buffers,
            draw: 0,
            width,
            height,
            stride,
            viewport_width,
            viewport_height,
            scroll: ScrollState::default(),
            clip: Clip {
                x1: 0,
                y1: 0,
                x2: viewport_width - 1,
                y2: viewport_height - 1,
            },
            dirty: Self::all_pages(height),
            pending_start_line: None,
        })
    }

    fn all_pages(height: i32) -> u8 {
        let pages = (height / 8) as u32;
        ((1u16 << pages) - 1) as u8
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn viewport_width(&self) -> i32 {
        self.viewport_width
    }

    pub fn viewport_height(&self) -> i32 {
        self.viewport_height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_double_buffered(&self) -> bool {
        self.buffers.len() == 2
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn clip(&self) -> Clip {
        self.clip
    }

    /// Restrict drawing to `rect`, intersected with the viewport
    pub fn set_clip(&mut self, rect: Rectangle) {
        // far bounds in i64, clamped to -1 (empty) ..= viewport edge
        let x2 = rect.top_left.x as i64 + rect.size.width as i64 - 1;
        let y2 = rect.top_left.y as i64 + rect.size.height as i64 - 1;
        self.clip = Clip {
            x1: rect.top_left.x.max(0),
            y1: rect.top_left.y.max(0),
            x2: x2.clamp(-1, self.viewport_width as i64 - 1) as i32,
            y2: y2.clamp(-1, self.viewport_height as i64 - 1) as i32,
        };
    }

    pub fn reset_clip(&mut self) {
        self.set_clip(Rectangle::new(
            Point::zero(),
            Size::new(self.viewport_width as u32, self.viewport_height as u32),
        ));
    }

    /// Bytes drawing calls write to
    pub fn draw_buffer(&self) -> &[u8] {
        &self.buffers[self.draw]
    }

    pub(crate) fn draw_buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffers[self.draw]
    }

    fn visible_index(&self) -> usize {
        if self.is_double_buffered() {
            1 - self.draw
        } else {
            self.draw
        }
    }

    /// Bytes the flush transmits
    pub fn visible_buffer(&self) -> &[u8] {
        &self.buffers[self.visible_index()]
    }

    /// Exchange drawing and visible buffers, no-op when single buffered
    pub fn swap(&mut self) -> bool {
        if !self.is_double_buffered() {
            return false;
        }
        self.draw = 1 - self.draw;
        self.mark_all_dirty();
        true
    }

    #[inline]
    pub(crate) fn phys_x(&self, x: i32) -> i32 {
        (x + self.scroll.col).rem_euclid(self.width)
    }

    #[inline]
    pub(crate) fn phys_y(&self, y: i32) -> i32 {
        (y + self.scroll.row).rem_euclid(self.height)
    }

    #[inline]
    fn bit_index(&self, px: i32, py: i32) -> (usize, u8) {
        let index = py as usize * self.stride + (px as usize >> 3);
        (index, 0x80 >> (px & 7))
    }

    #[inline]
    pub(crate) fn get_phys(&self, px: i32, py: i32) -> bool {
        let (index, mask) = self.bit_index(px, py);
        self.buffers[self.draw][index] & mask != 0
    }

    #[inline]
    pub(crate) fn put_phys(&mut self, px: i32, py: i32, on: bool) {
        let (index, mask) = self.bit_index(px, py);
        let byte = &mut self.buffers[self.draw][index];
        if on {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Pixel state at a logical position inside the screen
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.get_phys(self.phys_x(x), self.phys_y(y))
    }

    /// Write a logical pixel without clipping; position must be on screen
    pub(crate) fn put(&mut self, x: i32, y: i32, on: bool) {
        let (px, py) = (self.phys_x(x), self.phys_y(y));
        self.put_phys(px, py, on);
        self.mark_phys_rows_dirty(py, 1);
    }

    /// Write a logical pixel, ignoring it when outside the clipping rectangle
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if self.clip.contains(x, y) {
            self.put(x, y, on);
        }
    }

    /// Controller RAM row showing physical row `py`
    ///
    /// With the start line register covering the row pan the physical row is
    /// written as is; otherwise the row pan is applied while transmitting.
    pub(crate) fn ram_row(&self, py: i32) -> i32 {
        if self.row_pan_in_register() {
            py
        } else {
            (py - self.scroll.row).rem_euclid(self.height)
        }
    }

    /// The start line register can pan rows when the panel spans all controller rows
    pub(crate) fn row_pan_in_register(&self) -> bool {
        self.height == Flag::RAM_ROWS as i32
    }

    pub(crate) fn mark_phys_rows_dirty(&mut self, py: i32, count: i32) {
        if self.is_double_buffered() {
            // only swapping makes the drawing buffer visible
            return;
        }
        if count >= self.height {
            self.mark_all_dirty();
            return;
        }
        for row in py..py + count {
            let ram = self.ram_row(row.rem_euclid(self.height));
            self.dirty |= 1 << (ram / 8);
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.dirty = Self::all_pages(self.height);
    }

    pub fn dirty_pages(&self) -> u8 {
        self.dirty
    }

    pub(crate) fn queue_start_line(&mut self, line: u8) {
        self.pending_start_line = Some(line);
    }

    pub fn pending_start_line(&self) -> Option<u8> {
        self.pending_start_line
    }

    /// Copy of the visible buffer and pending updates, clearing both
    ///
    /// Returns `None` when there is nothing to transmit.
    pub(crate) fn take_snapshot(&mut self) -> Option<Snapshot> {
        if self.dirty == 0 && self.pending_start_line.is_none() {
            return None;
        }
        let snapshot = Snapshot {
            bits: self.visible_buffer().to_vec(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            col: self.scroll.col,
            row: if self.row_pan_in_register() { 0 } else { self.scroll.row },
            dirty: self.dirty,
            start_line: self.pending_start_line,
        };
        self.dirty = 0;
        self.pending_start_line = None;
        Some(snapshot)
    }

    /// Put back what a failed transmission did not deliver
    pub(crate) fn requeue(&mut self, dirty: u8, start_line: Option<u8>) {
        self.dirty |= dirty;
        if self.pending_start_line.is_none() {
            self.pending_start_line = start_line;
        }
    }

    /// Check that `rect` lies inside the viewport
    pub(crate) fn check_viewport(&self, rect: &Rectangle) -> Result<()> {
        let x = rect.top_left.x;
        let y = rect.top_left.y;
        let inside = x >= 0
            && y >= 0
            && x as i64 + rect.size.width as i64 <= self.viewport_width as i64
            && y as i64 + rect.size.height as i64 <= self.viewport_height as i64;
        if inside {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                x,
                y,
                width: rect.size.width,
                height: rect.size.height,
                vp_width: self.viewport_width as u32,
                vp_height: self.viewport_height as u32,
            })
        }
    }

    /// Pixel states of a viewport region, row-major
    pub fn read_region(&self, rect: &Rectangle) -> Result<Vec<bool>> {
        self.check_viewport(rect)?;
        let mut out = Vec::with_capacity((rect.size.width * rect.size.height) as usize);
        for y in 0..rect.size.height as i32 {
            for x in 0..rect.size.width as i32 {
                out.push(self.get(rect.top_left.x + x, rect.top_left.y + y));
            }
        }
        Ok(out)
    }
}

/// Visible buffer captured for one flush
#[derive(Debug, Clone)]
pub struct Snapshot {
    bits: Vec<u8>,
    width: i32,
    height: i32,
    stride: usize,
    /// Column pan applied while transmitting
    col: i32,
    /// Row pan applied while transmitting, zero when the register handles it
    row: i32,
    pub dirty: u8,
    pub start_line: Option<u8>,
}

impl Snapshot {
    pub fn width(&self) -> u16 {
        self.width as u16
    }

    /// Controller RAM bytes of one page: bit n of byte c is row `page * 8 + n`, column `c`
    pub fn page(&self, page: u8, out: &mut Vec<u8>) {
        out.clear();
        out.resize(self.width as usize, 0);
        for n in 0..8 {
            let ram_row = page as i32 * 8 + n;
            let py = (ram_row + self.row).rem_euclid(self.height) as usize;
            let row = &self.bits[py * self.stride..(py + 1) * self.stride];
            for (c, byte) in out.iter_mut().enumerate() {
                let px = (c as i32 + self.col).rem_euclid(self.width) as usize;
                if row[px >> 3] & (0x80 >> (px & 7)) != 0 {
                    *byte |= 1 << n;
                }
            }
        }
    }
}
