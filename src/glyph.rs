//! Text glyph rendering
//!
//! Glyph bitmaps are row-major, `ceil(width / 8)` bytes per row, most
//! significant bit first. Two renderers share one contract: [`FullPath`] works
//! on whole framebuffer bytes and is picked when the glyph box starts on a byte
//! boundary and needs no clipping or wrapping horizontally, [`LightPath`] plots
//! pixel by pixel and handles every other placement.

use crate::framebuffer::FrameBuffer;

/// Glyph bitmap placed at a logical position
#[derive(Debug, Clone, Copy)]
pub struct Glyph<'a> {
    pub x: i32,
    pub y: i32,
    pub width: u16,
    pub height: u16,
    pub data: &'a [u8],
}

impl Glyph<'_> {
    fn stride(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    fn bit(&self, x: i32, y: i32) -> bool {
        let index = y as usize * self.stride() + (x as usize >> 3);
        self.data
            .get(index)
            .is_some_and(|b| b & (0x80 >> (x & 7)) != 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DoubleWidth {
    #[default]
    Normal,
    /// Every column drawn twice
    Double,
    /// Double width and height, upper half of the glyph
    DoubleTop,
    /// Double width and height, lower half of the glyph
    DoubleBottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphOptions {
    /// Paint unset glyph pixels with the brush; transparent otherwise
    pub fill_background: bool,
    pub bold: bool,
    pub italic: bool,
    /// Light the last row
    pub underline: bool,
    /// Exchange pen and brush
    pub invert: bool,
    /// Draw only background and underline
    pub blank: bool,
    pub double_width: DoubleWidth,
}

/// A glyph with its options resolved into drawing geometry
pub(crate) struct GlyphJob<'a> {
    glyph: Glyph<'a>,
    opts: GlyphOptions,
    pen: bool,
    brush: bool,
}

impl<'a> GlyphJob<'a> {
    pub(crate) fn new(glyph: Glyph<'a>, opts: GlyphOptions, pen: bool, brush: bool) -> Self {
        let (pen, brush) = if opts.invert { (brush, pen) } else { (pen, brush) };
        GlyphJob {
            glyph,
            opts,
            pen,
            brush,
        }
    }

    fn scale(&self) -> i32 {
        match self.opts.double_width {
            DoubleWidth::Normal => 1,
            _ => 2,
        }
    }

    /// Columns covered before italic shear
    fn cell_width(&self) -> i32 {
        self.glyph.width as i32 * self.scale()
    }

    /// Columns covered including italic shear
    fn box_width(&self) -> i32 {
        self.cell_width() + if self.opts.italic { 2 } else { 0 }
    }

    fn rows(&self) -> i32 {
        self.glyph.height as i32
    }

    /// Glyph row shown on output row `r`
    fn source_row(&self, r: i32) -> i32 {
        let half = self.rows() / 2;
        match self.opts.double_width {
            DoubleWidth::Normal | DoubleWidth::Double => r,
            DoubleWidth::DoubleTop => r / 2,
            DoubleWidth::DoubleBottom => half + r / 2,
        }
    }

    /// Italic shear of output row `r`
    fn skew(&self, r: i32) -> i32 {
        if !self.opts.italic {
            return 0;
        }
        let third = self.rows() / 3;
        if r < third {
            2
        } else if r < 2 * third {
            1
        } else {
            0
        }
    }

    fn is_underline(&self, r: i32) -> bool {
        self.opts.underline && r == self.rows() - 1
    }

    /// Foreground state of source column `sx` on source row `sy`
    fn foreground(&self, sx: i32, sy: i32) -> bool {
        !self.opts.blank
            && (self.glyph.bit(sx, sy) || (self.opts.bold && sx > 0 && self.glyph.bit(sx - 1, sy)))
    }
}

/// One way of putting a glyph into the framebuffer
pub(crate) trait GlyphStrategy {
    fn render(&self, fb: &mut FrameBuffer, job: &GlyphJob<'_>);
}

/// Byte-wise renderer for aligned, unclipped placement
pub(crate) struct FullPath;

/// Pixel-wise renderer, valid for any placement
pub(crate) struct LightPath;

/// Whether `job` can be rendered with [`FullPath`]
pub(crate) fn is_byte_aligned(fb: &FrameBuffer, job: &GlyphJob<'_>) -> bool {
    let x = job.glyph.x;
    let box_width = job.box_width();
    let clip = fb.clip();
    box_width > 0
        && box_width <= 128
        && x >= clip.x1
        && x + box_width - 1 <= clip.x2
        && fb.phys_x(x) % 8 == 0
        && fb.phys_x(x) + box_width <= fb.width()
}

fn strategy(fb: &FrameBuffer, job: &GlyphJob<'_>) -> &'static dyn GlyphStrategy {
    if is_byte_aligned(fb, job) {
        &FullPath
    } else {
        &LightPath
    }
}

impl GlyphStrategy for LightPath {
    fn render(&self, fb: &mut FrameBuffer, job: &GlyphJob<'_>) {
        let k = job.scale();
        for r in 0..job.rows() {
            let y = job.glyph.y + r;
            let sy = job.source_row(r);
            let underline = job.is_underline(r);
            let left = job.glyph.x + job.skew(r);
            for ox in 0..job.cell_width() {
                let fg = underline || job.foreground(ox / k, sy);
                if fg {
                    fb.set_pixel(left + ox, y, job.pen);
                } else if job.opts.fill_background {
                    fb.set_pixel(left + ox, y, job.brush);
                }
            }
        }
    }
}

/// `n` leading ones
fn ones(n: i32) -> u128 {
    if n <= 0 {
        0
    } else {
        u128::MAX << (128 - n)
    }
}

/// Each bit of `b` twice, MSB first
fn double_bits(b: u8) -> u16 {
    let mut out = 0u16;
    for i in 0..8 {
        if b & (0x80 >> i) != 0 {
            out |= 0xC000 >> (2 * i);
        }
    }
    out
}

impl FullPath {
    /// Source row `sy` as a left aligned word, bold applied
    fn source_word(job: &GlyphJob<'_>, sy: i32) -> u128 {
        let glyph = &job.glyph;
        let stride = glyph.stride();
        let start = sy as usize * stride;
        let mut word = 0u128;
        for i in 0..stride {
            let byte = glyph.data.get(start + i).copied().unwrap_or(0);
            word |= (byte as u128) << (120 - 8 * i);
        }
        word &= ones(glyph.width as i32);
        if job.opts.bold {
            word |= (word >> 1) & ones(glyph.width as i32);
        }
        word
    }

    fn doubled(word: u128) -> u128 {
        let mut out = 0u128;
        for i in 0..8 {
            let byte = (word >> (120 - 8 * i)) as u8;
            out |= (double_bits(byte) as u128) << (112 - 16 * i);
        }
        out
    }
}

impl GlyphStrategy for FullPath {
    fn render(&self, fb: &mut FrameBuffer, job: &GlyphJob<'_>) {
        let clip = fb.clip();
        let cell = ones(job.cell_width());
        let px = fb.phys_x(job.glyph.x) as usize;
        let first_byte = px >> 3;
        let byte_count = (job.box_width() as usize).div_ceil(8);
        let stride = fb.stride();

        for r in 0..job.rows() {
            let y = job.glyph.y + r;
            if y < clip.y1 || y > clip.y2 {
                continue;
            }

            let fg = if job.is_underline(r) {
                cell
            } else if job.opts.blank {
                0
            } else {
                let word = Self::source_word(job, job.source_row(r));
                if job.scale() == 2 {
                    Self::doubled(word)
                } else {
                    word
                }
            };

            let skew = job.skew(r) as u32;
            let fg = fg >> skew;
            let cell = cell >> skew;
            let (mask, value) = if job.opts.fill_background {
                let pen = if job.pen { fg } else { 0 };
                let brush = if job.brush { cell & !fg } else { 0 };
                (cell, pen | brush)
            } else {
                (fg, if job.pen { fg } else { 0 })
            };
            if mask == 0 {
                continue;
            }

            let py = fb.phys_y(y);
            let start = py as usize * stride + first_byte;
            let row = &mut fb.draw_buffer_mut()[start..start + byte_count];
            for (i, byte) in row.iter_mut().enumerate() {
                let shift = 120 - 8 * i;
                let m = (mask >> shift) as u8;
                let v = (value >> shift) as u8;
                *byte = (*byte & !m) | (v & m);
            }
            fb.mark_phys_rows_dirty(py, 1);
        }
    }
}

impl FrameBuffer {
    /// Draw `glyph` with pen and brush already quantized to bits
    pub fn draw_glyph(&mut self, glyph: Glyph<'_>, opts: GlyphOptions, pen: bool, brush: bool) {
        if glyph.width == 0 || glyph.height == 0 {
            return;
        }
        let job = GlyphJob::new(glyph, opts, pen, brush);
        let clip = self.clip();
        let (x, y) = (job.glyph.x as i64, job.glyph.y as i64);
        if x > clip.x2 as i64
            || y > clip.y2 as i64
            || x + job.box_width() as i64 <= clip.x1 as i64
            || y + job.rows() as i64 <= clip.y1 as i64
        {
            return;
        }
        strategy(self, &job).render(self, &job);
    }
}
