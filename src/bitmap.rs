//! Bitmap compositing with optional save/restore of the covered area
//!
//! A [`SaveBuffer`] passed to [`FrameBuffer::draw_bitmap`] receives the pixels
//! the bitmap is about to cover, packed 1 bit per pixel (row-major, MSB first)
//! together with the region they came from. Handing it to
//! [`FrameBuffer::restore_bitmap`] puts the background back, which is how a
//! small sprite is moved over a static screen.

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::color::{quantize, Rgba2222, Rgba8888};
use crate::framebuffer::FrameBuffer;

/// Source pixel encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 1 bit per pixel, rows padded to whole bytes, MSB first
    ///
    /// Set bits paint [`Bitmap::foreground`], clear bits are transparent. The
    /// pen color of the controller plays no part.
    Mask,
    /// 1 byte per pixel, `AABBGGRR`
    Rgba2222,
    /// 4 bytes per pixel, R G B A
    Rgba8888,
}

#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'a> {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub data: &'a [u8],
    /// Color of set bits in a [`PixelFormat::Mask`] bitmap
    pub foreground: Rgb888,
}

impl<'a> Bitmap<'a> {
    pub fn mask(width: u16, height: u16, data: &'a [u8], foreground: Rgb888) -> Self {
        Bitmap {
            width,
            height,
            format: PixelFormat::Mask,
            data,
            foreground,
        }
    }

    pub fn rgba2222(width: u16, height: u16, data: &'a [u8]) -> Self {
        Bitmap {
            width,
            height,
            format: PixelFormat::Rgba2222,
            data,
            foreground: Rgb888::new(255, 255, 255),
        }
    }

    pub fn rgba8888(width: u16, height: u16, data: &'a [u8]) -> Self {
        Bitmap {
            width,
            height,
            format: PixelFormat::Rgba8888,
            data,
            foreground: Rgb888::new(255, 255, 255),
        }
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.width as u32, self.height as u32))
    }

    fn mask_stride(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    /// Panel bit for source pixel (`x`, `y`), `None` when transparent
    fn sample(&self, x: i32, y: i32) -> Option<bool> {
        let index = y as usize * self.width as usize + x as usize;
        match self.format {
            PixelFormat::Mask => mask_bit(self.data, self.mask_stride(), x, y)
                .then(|| quantize(self.foreground)),
            PixelFormat::Rgba2222 => self.data.get(index).and_then(|p| Rgba2222(*p).coverage()),
            PixelFormat::Rgba8888 => self
                .data
                .get(index * 4..index * 4 + 4)
                .and_then(|p| Rgba8888::from_bytes(p).coverage()),
        }
    }
}

fn mask_bit(bits: &[u8], stride: usize, x: i32, y: i32) -> bool {
    bits.get(y as usize * stride + (x as usize >> 3))
        .is_some_and(|b| b & (0x80 >> (x & 7)) != 0)
}

/// Pixels saved from under a bitmap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveBuffer {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub bits: Vec<u8>,
}

impl SaveBuffer {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn stride(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }
}

impl FrameBuffer {
    /// Composite `source` (default: the whole bitmap) with its top left corner at `dest`
    ///
    /// Pixels outside the clipping rectangle are skipped. When `save` is given
    /// it is overwritten with the area about to be covered.
    pub fn draw_bitmap(
        &mut self,
        dest: Point,
        bitmap: &Bitmap<'_>,
        source: Option<Rectangle>,
        save: Option<&mut SaveBuffer>,
    ) {
        let source = source
            .map(|r| r.intersection(&bitmap.bounds()))
            .unwrap_or_else(|| bitmap.bounds());
        let target = Rectangle::new(dest, source.size);
        let region = self.clip_rect(&target);

        if let Some(save) = save {
            self.save_region(region, save);
        }
        let Some(region) = region else {
            return;
        };

        // bitmap pixel (0, 0) lands here
        let origin = dest - source.top_left;
        match bitmap.format {
            PixelFormat::Mask => self.blit_mask(
                region,
                origin,
                bitmap.data,
                bitmap.mask_stride(),
                quantize(bitmap.foreground),
                None,
            ),
            PixelFormat::Rgba2222 | PixelFormat::Rgba8888 => {
                let (x1, y1, x2, y2) = region;
                for y in y1..=y2 {
                    for x in x1..=x2 {
                        if let Some(on) = bitmap.sample(x - origin.x, y - origin.y) {
                            let (px, py) = (self.phys_x(x), self.phys_y(y));
                            self.put_phys(px, py, on);
                        }
                    }
                    let py = self.phys_y(y);
                    self.mark_phys_rows_dirty(py, 1);
                }
            }
        }
    }

    /// Write back the pixels saved by [`FrameBuffer::draw_bitmap`]
    pub fn restore_bitmap(&mut self, save: &SaveBuffer) {
        if save.is_empty() {
            return;
        }
        let area = Rectangle::new(Point::new(save.x, save.y), Size::new(save.width, save.height));
        if let Some(region) = self.clip_rect(&area) {
            self.blit_mask(
                region,
                Point::new(save.x, save.y),
                &save.bits,
                save.stride(),
                true,
                Some(false),
            );
        }
    }

    fn save_region(&self, region: Option<(i32, i32, i32, i32)>, save: &mut SaveBuffer) {
        save.bits.clear();
        let Some((x1, y1, x2, y2)) = region else {
            *save = SaveBuffer::default();
            return;
        };
        save.x = x1;
        save.y = y1;
        save.width = (x2 - x1 + 1) as u32;
        save.height = (y2 - y1 + 1) as u32;
        let stride = save.stride();
        save.bits.resize(stride * save.height as usize, 0);
        for y in y1..=y2 {
            for x in x1..=x2 {
                if self.get(x, y) {
                    let (dx, dy) = ((x - x1) as usize, (y - y1) as usize);
                    save.bits[dy * stride + (dx >> 3)] |= 0x80 >> (dx & 7);
                }
            }
        }
    }

    /// Paint `fg` where the mask is set and `bg` (if any) where it is clear
    ///
    /// `region` is already clipped; mask pixel (0, 0) sits at `origin`.
    fn blit_mask(
        &mut self,
        region: (i32, i32, i32, i32),
        origin: Point,
        bits: &[u8],
        stride: usize,
        fg: bool,
        bg: Option<bool>,
    ) {
        let (x1, y1, x2, y2) = region;
        for y in y1..=y2 {
            let py = self.phys_y(y);
            for x in x1..=x2 {
                let on = if mask_bit(bits, stride, x - origin.x, y - origin.y) {
                    fg
                } else if let Some(bg) = bg {
                    bg
                } else {
                    continue;
                };
                let px = self.phys_x(x);
                self.put_phys(px, py, on);
            }
            self.mark_phys_rows_dirty(py, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use embedded_graphics::pixelcolor::RgbColor;

    fn fb(w: u16, h: u16) -> FrameBuffer {
        FrameBuffer::new(&Resolution::new(w, h).unwrap(), None, false).unwrap()
    }

    fn backdrop(f: &mut FrameBuffer) {
        for y in (0..f.height()).step_by(2) {
            f.draw_line(0, y, f.width() - 1, (y * 3) % f.height(), true);
        }
    }

    /// 4x4 sprite: opaque white border, opaque black centre, transparent corners
    fn sprite() -> Vec<u8> {
        let mut data = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                let corner = (x == 0 || x == 3) && (y == 0 || y == 3);
                let centre = (1..3).contains(&x) && (1..3).contains(&y);
                let px: [u8; 4] = if corner {
                    [255, 255, 255, 0]
                } else if centre {
                    [0, 0, 0, 255]
                } else {
                    [255, 255, 255, 255]
                };
                data.extend_from_slice(&px);
            }
        }
        data
    }

    #[test]
    fn rgba8888_respects_alpha() {
        let mut f = fb(16, 8);
        f.fill_rect(&Rectangle::new(Point::zero(), Size::new(16, 8)), true);
        let data = sprite();
        f.draw_bitmap(Point::new(2, 2), &Bitmap::rgba8888(4, 4, &data), None, None);
        // corners transparent, centre black, border white
        assert!(f.get(2, 2));
        assert!(!f.get(3, 3) && !f.get(4, 4));
        assert!(f.get(3, 2));
    }

    #[test]
    fn rgba2222_respects_alpha() {
        let mut f = fb(16, 8);
        // alpha 3 white, alpha 2 black, alpha 1 white (transparent), alpha 0 black
        let data = [0b11_11_11_11, 0b10_00_00_00, 0b01_11_11_11, 0b00_00_00_00];
        f.set_pixel(1, 0, true);
        f.set_pixel(3, 0, true);
        f.draw_bitmap(Point::zero(), &Bitmap::rgba2222(4, 1, &data), None, None);
        assert!(f.get(0, 0));
        assert!(!f.get(1, 0));
        assert!(!f.get(2, 0));
        assert!(f.get(3, 0));
    }

    #[test]
    fn mask_leaves_clear_bits_alone() {
        let mut f = fb(16, 8);
        f.set_pixel(1, 0, true);
        let data = [0b1010_0000, 0b0100_0000];
        let bitmap = Bitmap::mask(3, 2, &data, Rgb888::WHITE);
        f.draw_bitmap(Point::new(0, 0), &bitmap, None, None);
        let lit: Vec<(i32, i32)> = (0..2)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .filter(|(x, y)| f.get(*x, *y))
            .collect();
        assert_eq!(lit, vec![(0, 0), (1, 0), (2, 0), (1, 1)]);

        // a dark foreground clears
        let bitmap = Bitmap::mask(3, 2, &data, Rgb888::new(20, 20, 20));
        f.draw_bitmap(Point::new(0, 0), &bitmap, None, None);
        assert!(!f.get(0, 0) && f.get(1, 0) && !f.get(2, 0));
    }

    #[test]
    fn save_then_restore_is_bit_identical() {
        let data = sprite();
        let bitmap = Bitmap::rgba8888(4, 4, &data);
        for dest in [Point::new(5, 3), Point::new(-2, -1), Point::new(30, 14), Point::new(9, 4)] {
            let mut f = fb(32, 16);
            f.scroll.col = 5;
            backdrop(&mut f);
            let before = f.draw_buffer().to_vec();
            let mut save = SaveBuffer::default();
            f.draw_bitmap(dest, &bitmap, None, Some(&mut save));
            f.restore_bitmap(&save);
            assert_eq!(f.draw_buffer(), &before[..], "dest {:?}", dest);
        }
    }

    #[test]
    fn save_covers_only_the_clipped_region() {
        let mut f = fb(16, 8);
        let data = sprite();
        let mut save = SaveBuffer::default();
        f.draw_bitmap(Point::new(-1, 6), &Bitmap::rgba8888(4, 4, &data), None, Some(&mut save));
        assert_eq!((save.x, save.y, save.width, save.height), (0, 6, 3, 2));
        assert_eq!(save.bits.len(), 2);

        f.draw_bitmap(Point::new(40, 40), &Bitmap::rgba8888(4, 4, &data), None, Some(&mut save));
        assert!(save.is_empty());
        f.restore_bitmap(&save);
    }

    #[test]
    fn source_rect_selects_part_of_bitmap() {
        let mut f = fb(16, 8);
        let data = sprite();
        let source = Rectangle::new(Point::new(1, 1), Size::new(3, 3));
        f.fill_rect(&Rectangle::new(Point::zero(), Size::new(16, 8)), true);
        f.draw_bitmap(Point::new(8, 0), &Bitmap::rgba8888(4, 4, &data), Some(source), None);
        // sprite (1, 1) is centre black, sprite (3, 3) a transparent corner
        assert!(!f.get(8, 0) && !f.get(9, 1));
        assert!(f.get(10, 0));
        assert!(f.get(10, 2));
        assert!(f.get(11, 0));
    }

    #[test]
    fn clipping_rectangle_limits_compositing() {
        let mut f = fb(16, 8);
        f.set_clip(Rectangle::new(Point::new(0, 0), Size::new(3, 8)));
        let data = [0xFF, 0xFF];
        f.draw_bitmap(Point::zero(), &Bitmap::mask(8, 2, &data, Rgb888::WHITE), None, None);
        assert!(f.get(2, 1));
        assert!(!f.get(3, 1));
    }
}
