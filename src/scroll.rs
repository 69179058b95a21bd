//! Horizontal and vertical panning
//!
//! Positive deltas move the content right / down. Offsets wrap modulo the
//! screen size, so scrolling by `d` and then by `-d` is always a no-op when the
//! vacated area is not filled.

use embedded_graphics::pixelcolor::Rgb888;

use crate::color::quantize;
use crate::config::PanMode;
use crate::framebuffer::FrameBuffer;
use crate::raster::SpanOp;

/// What appears in the rows or columns uncovered by a scroll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScrollFill {
    /// Content leaving one edge comes back on the other
    #[default]
    Wrap,
    /// Uncovered pixels are painted with this color
    Color(Rgb888),
}

impl ScrollFill {
    fn bit(self) -> Option<bool> {
        match self {
            ScrollFill::Wrap => None,
            ScrollFill::Color(c) => Some(quantize(c)),
        }
    }
}

impl FrameBuffer {
    pub fn v_scroll(&mut self, delta: i32, mode: PanMode, fill: ScrollFill) {
        let height = self.height();
        let shift = delta.rem_euclid(height);
        if shift != 0 {
            match mode {
                PanMode::Hardware => self.set_screen_row(self.scroll.row - shift),
                PanMode::Shift => {
                    let stride = self.stride();
                    self.draw_buffer_mut().rotate_right(shift as usize * stride);
                    self.mark_all_dirty();
                }
            }
        }

        if let Some(on) = fill.bit() {
            let count = delta.unsigned_abs().min(height as u32) as i32;
            let first = if delta > 0 { 0 } else { height - count };
            let width = self.width();
            for y in first..first + count {
                self.logical_span(y, 0, width - 1, SpanOp::fill(on));
            }
        }
    }

    pub fn h_scroll(&mut self, delta: i32, mode: PanMode, fill: ScrollFill) {
        let width = self.width();
        let shift = delta.rem_euclid(width);
        if shift != 0 {
            match mode {
                PanMode::Hardware => self.set_screen_col(self.scroll.col - shift),
                PanMode::Shift => {
                    for py in 0..self.height() {
                        self.rotate_row(py, shift as u32);
                    }
                    self.mark_all_dirty();
                }
            }
        }

        if let Some(on) = fill.bit() {
            let count = delta.unsigned_abs().min(width as u32) as i32;
            let first = if delta > 0 { 0 } else { width - count };
            for y in 0..self.height() {
                self.logical_span(y, first, first + count - 1, SpanOp::fill(on));
            }
        }
    }

    /// Set the column pan; it is applied while transmitting
    pub fn set_screen_col(&mut self, value: i32) {
        let col = value.rem_euclid(self.width());
        if col != self.scroll.col {
            self.scroll.col = col;
            self.mark_all_dirty();
        }
    }

    /// Set the row pan, through the start line register when the panel allows
    pub fn set_screen_row(&mut self, value: i32) {
        let row = value.rem_euclid(self.height());
        if row == self.scroll.row {
            return;
        }
        self.scroll.row = row;
        if self.row_pan_in_register() {
            self.queue_start_line(row as u8);
        } else {
            self.mark_all_dirty();
        }
    }

    /// Rotate physical row `py` right by `shift` pixels
    fn rotate_row(&mut self, py: i32, shift: u32) {
        let width = self.width() as u32;
        let stride = self.stride();
        let start = py as usize * stride;
        let row = &mut self.draw_buffer_mut()[start..start + stride];

        // width <= 128: a row fits in one word, pixel 0 in the top bit
        let mut word = 0u128;
        for (i, byte) in row.iter().enumerate() {
            word |= (*byte as u128) << (120 - 8 * i);
        }
        let mask = if width == 128 {
            u128::MAX
        } else {
            !(u128::MAX >> width)
        };
        let rotated = ((word >> shift) | (word << (width - shift))) & mask;
        for (i, byte) in row.iter_mut().enumerate() {
            *byte = (rotated >> (120 - 8 * i)) as u8;
        }
    }
}
