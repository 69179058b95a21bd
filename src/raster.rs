//! Primitive rasterizer working directly on the packed framebuffer
//!
//! Lines and ellipses step with integer error terms only, so the same call
//! lights the same pixels on every target.

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::framebuffer::FrameBuffer;

/// What a span operation does to the covered bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpanOp {
    Set,
    Clear,
    Toggle,
}

impl SpanOp {
    pub(crate) fn fill(on: bool) -> Self {
        if on {
            SpanOp::Set
        } else {
            SpanOp::Clear
        }
    }

    #[inline]
    fn apply(self, byte: &mut u8, mask: u8) {
        match self {
            SpanOp::Set => *byte |= mask,
            SpanOp::Clear => *byte &= !mask,
            SpanOp::Toggle => *byte ^= mask,
        }
    }
}

/// Mask of bits `from..to` (pixel columns within one byte, `to` exclusive)
#[inline]
fn byte_mask(from: usize, to: usize) -> u8 {
    let head = 0xFFu8 >> from;
    let tail = if to >= 8 { 0xFF } else { !(0xFFu8 >> to) };
    head & tail
}

/// Last coordinate covered by a run of `len` pixels from `start`
#[inline]
fn last_covered(start: i32, len: u32) -> i64 {
    start as i64 + len as i64 - 1
}

/// Largest ellipse box side that is rasterized
const MAX_ELLIPSE_EXTENT: u32 = 4096;

impl FrameBuffer {
    /// Apply `op` to `len` physical pixels of row `py` starting at column `px`
    fn phys_span(&mut self, py: i32, px: i32, len: i32, op: SpanOp) {
        if len <= 0 {
            return;
        }
        let stride = self.stride();
        let row_start = py as usize * stride;
        let first = px as usize;
        let last = (px + len) as usize; // exclusive
        let row = &mut self.draw_buffer_mut()[row_start..row_start + stride];

        let (b1, b2) = (first >> 3, (last - 1) >> 3);
        if b1 == b2 {
            op.apply(&mut row[b1], byte_mask(first & 7, last - (b1 << 3)));
            return;
        }
        op.apply(&mut row[b1], byte_mask(first & 7, 8));
        for byte in &mut row[b1 + 1..b2] {
            op.apply(byte, 0xFF);
        }
        op.apply(&mut row[b2], byte_mask(0, last - (b2 << 3)));
    }

    /// Apply `op` to logical columns `x1..=x2` of row `y`, splitting where the pan wraps
    pub(crate) fn logical_span(&mut self, y: i32, x1: i32, x2: i32, op: SpanOp) {
        if x2 < x1 {
            return;
        }
        let width = self.width();
        let len = (x2 - x1 + 1).min(width);
        let py = self.phys_y(y);
        let px = self.phys_x(x1);
        let head = len.min(width - px);
        self.phys_span(py, px, head, op);
        self.phys_span(py, 0, len - head, op);
        self.mark_phys_rows_dirty(py, 1);
    }

    /// Set every pixel of the screen to `on`
    pub fn clear(&mut self, on: bool) {
        let width = self.width() as usize;
        let stride = self.stride();
        let tail = byte_mask(0, width - (stride - 1) * 8);
        let fill = if on { 0xFF } else { 0x00 };
        for row in self.draw_buffer_mut().chunks_mut(stride) {
            row.fill(fill);
            row[stride - 1] &= tail;
        }
        self.mark_all_dirty();
    }

    /// Horizontal run of pixels from `x1` to `x2` inclusive, in either order
    pub fn fill_row(&mut self, y: i32, x1: i32, x2: i32, on: bool) {
        let clip = self.clip();
        if y < clip.y1 || y > clip.y2 {
            return;
        }
        let (x1, x2) = (x1.min(x2).max(clip.x1), x1.max(x2).min(clip.x2));
        self.logical_span(y, x1, x2, SpanOp::fill(on));
    }

    pub fn fill_rect(&mut self, rect: &Rectangle, on: bool) {
        let Some((x1, y1, x2, y2)) = self.clip_rect(rect) else {
            return;
        };
        for y in y1..=y2 {
            self.logical_span(y, x1, x2, SpanOp::fill(on));
        }
    }

    /// Flip every pixel inside `rect`
    pub fn invert_rect(&mut self, rect: &Rectangle) {
        let Some((x1, y1, x2, y2)) = self.clip_rect(rect) else {
            return;
        };
        for y in y1..=y2 {
            self.logical_span(y, x1, x2, SpanOp::Toggle);
        }
    }

    /// Exchange pen and brush pixels inside `rect`
    ///
    /// With a single bit per pixel this is an inversion, or nothing when pen
    /// and brush quantize to the same value.
    pub fn swap_fg_bg(&mut self, rect: &Rectangle, pen: bool, brush: bool) {
        if pen != brush {
            self.invert_rect(rect);
        }
    }

    /// Inclusive bounds of `rect` inside the clipping rectangle
    pub(crate) fn clip_rect(&self, rect: &Rectangle) -> Option<(i32, i32, i32, i32)> {
        if rect.size.width == 0 || rect.size.height == 0 {
            return None;
        }
        let clip = self.clip();
        let x1 = rect.top_left.x.max(clip.x1);
        let y1 = rect.top_left.y.max(clip.y1);
        let x2 = last_covered(rect.top_left.x, rect.size.width).min(clip.x2 as i64) as i32;
        let y2 = last_covered(rect.top_left.y, rect.size.height).min(clip.y2 as i64) as i32;
        (x1 <= x2 && y1 <= y2).then_some((x1, y1, x2, y2))
    }

    /// Part of the segment inside the clipping rectangle (Cohen-Sutherland)
    ///
    /// Clipped ends are truncated to whole pixels.
    fn clip_line(&self, from: (i32, i32), to: (i32, i32)) -> Option<((i32, i32), (i32, i32))> {
        const LEFT: u8 = 1;
        const RIGHT: u8 = 2;
        const TOP: u8 = 4;
        const BOTTOM: u8 = 8;

        let clip = self.clip();
        if clip.is_empty() {
            return None;
        }
        let (xmin, ymin) = (clip.x1 as i64, clip.y1 as i64);
        let (xmax, ymax) = (clip.x2 as i64, clip.y2 as i64);
        let outcode = |(x, y): (i64, i64)| {
            let mut code = 0;
            if x < xmin {
                code |= LEFT;
            } else if x > xmax {
                code |= RIGHT;
            }
            if y < ymin {
                code |= TOP;
            } else if y > ymax {
                code |= BOTTOM;
            }
            code
        };
        // position along one axis where the other axis reaches `at`
        let cross = |a0: i64, a1: i64, b0: i64, b1: i64, at: i64| {
            a0 + ((a1 - a0) as i128 * (at - b0) as i128 / (b1 - b0) as i128) as i64
        };

        let mut p = (from.0 as i64, from.1 as i64);
        let mut q = (to.0 as i64, to.1 as i64);
        let (mut code_p, mut code_q) = (outcode(p), outcode(q));
        // each pass moves one end onto a clip edge
        for _ in 0..8 {
            if code_p | code_q == 0 {
                break;
            }
            if code_p & code_q != 0 {
                return None;
            }
            let out = if code_p != 0 { code_p } else { code_q };
            let ((x0, y0), (x1, y1)) = (p, q);
            let point = if out & TOP != 0 {
                (cross(x0, x1, y0, y1, ymin), ymin)
            } else if out & BOTTOM != 0 {
                (cross(x0, x1, y0, y1, ymax), ymax)
            } else if out & LEFT != 0 {
                (xmin, cross(y0, y1, x0, x1, xmin))
            } else {
                (xmax, cross(y0, y1, x0, x1, xmax))
            };
            if out == code_p {
                p = point;
                code_p = outcode(p);
            } else {
                q = point;
                code_q = outcode(q);
            }
        }
        (code_p | code_q == 0).then(|| ((p.0 as i32, p.1 as i32), (q.0 as i32, q.1 as i32)))
    }

    /// Bresenham line between two points, both ends included
    ///
    /// The segment is clipped first, so only visible pixels are stepped.
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, on: bool) {
        if y1 == y2 {
            self.fill_row(y1, x1, x2, on);
            return;
        }
        let Some(((x1, y1), (x2, y2))) = self.clip_line((x1, y1), (x2, y2)) else {
            return;
        };
        let dx = (x2 - x1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let dy = -(y2 - y1).abs();
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x1, y1);
        loop {
            self.set_pixel(x, y, on);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Ellipse outline inscribed in a `size` box centred on `center`
    pub fn draw_ellipse(&mut self, center: Point, size: Size, on: bool) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if size.width > MAX_ELLIPSE_EXTENT || size.height > MAX_ELLIPSE_EXTENT {
            log::debug!("Skipping {}x{} ellipse", size.width, size.height);
            return;
        }
        let mut x0 = center.x as i64 - size.width as i64 / 2;
        let mut y0 = center.y as i64 - size.height as i64 / 2;
        let mut x1 = x0 + size.width as i64 - 1;
        let mut y1 = y0 + size.height as i64 - 1;

        let clip = self.clip();
        if x1 < clip.x1 as i64 || x0 > clip.x2 as i64 || y1 < clip.y1 as i64 || y0 > clip.y2 as i64 {
            return;
        }

        let a = x1 - x0;
        let b = y1 - y0;
        let b1 = b & 1;
        let mut dx = 4 * (1 - a) * b * b;
        let mut dy = 4 * (b1 + 1) * a * a;
        let mut err = dx + dy + b1 * a * a;

        y0 += (b + 1) / 2;
        y1 = y0 - b1;
        let aa8 = 8 * a * a;
        let bb8 = 8 * b * b;

        let plot = |fb: &mut FrameBuffer, x: i64, y: i64| fb.set_pixel(x as i32, y as i32, on);

        loop {
            plot(self, x1, y0);
            plot(self, x0, y0);
            plot(self, x0, y1);
            plot(self, x1, y1);
            let e2 = 2 * err;
            if e2 <= dy {
                y0 += 1;
                y1 -= 1;
                dy += aa8;
                err += dy;
            }
            if e2 >= dx || 2 * err > dy {
                x0 += 1;
                x1 -= 1;
                dx += bb8;
                err += dx;
            }
            if x0 > x1 {
                break;
            }
        }

        // flat ellipses stop early, finish the tips
        while y0 - y1 < b {
            plot(self, x0 - 1, y0);
            plot(self, x1 + 1, y0);
            y0 += 1;
            plot(self, x0 - 1, y1);
            plot(self, x1 + 1, y1);
            y1 -= 1;
        }
    }

    /// Copy `source` so its top left corner lands on `dest`
    ///
    /// The source is limited to the viewport, the destination to the clipping
    /// rectangle. Overlapping areas copy as if through a temporary.
    pub fn copy_rect(&mut self, source: &Rectangle, dest: Point) {
        let vw = self.viewport_width();
        let vh = self.viewport_height();
        let sx1 = source.top_left.x.max(0);
        let sy1 = source.top_left.y.max(0);
        let sx2 = last_covered(source.top_left.x, source.size.width).min(vw as i64 - 1) as i32;
        let sy2 = last_covered(source.top_left.y, source.size.height).min(vh as i64 - 1) as i32;
        if source.size.width == 0 || source.size.height == 0 || sx1 > sx2 || sy1 > sy2 {
            return;
        }
        let ox = dest.x as i64 - source.top_left.x as i64;
        let oy = dest.y as i64 - source.top_left.y as i64;
        let w = (sx2 - sx1 + 1) as usize;

        let mut pixels = Vec::with_capacity(w * (sy2 - sy1 + 1) as usize);
        for y in sy1..=sy2 {
            for x in sx1..=sx2 {
                pixels.push(self.get(x, y));
            }
        }
        for (i, on) in pixels.into_iter().enumerate() {
            let x = (sx1 + (i % w) as i32) as i64 + ox;
            let y = (sy1 + (i / w) as i32) as i64 + oy;
            // anything outside i32 is outside the clip as well
            if let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) {
                self.set_pixel(x, y, on);
            }
        }
    }

    /// Copy logical columns `x1..=x2` of row `src_y` onto row `dst_y`
    ///
    /// Works on the whole screen regardless of the clipping rectangle.
    pub fn copy_row(&mut self, x1: i32, x2: i32, src_y: i32, dst_y: i32) {
        let (w, h) = (self.width(), self.height());
        if src_y == dst_y || !(0..h).contains(&src_y) || !(0..h).contains(&dst_y) {
            return;
        }
        let (x1, x2) = (x1.max(0), x2.min(w - 1));
        for x in x1..=x2 {
            let on = self.get(x, src_y);
            let (px, py) = (self.phys_x(x), self.phys_y(dst_y));
            self.put_phys(px, py, on);
        }
        let py = self.phys_y(dst_y);
        self.mark_phys_rows_dirty(py, 1);
    }
}
