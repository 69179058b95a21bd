//! SSD1306 display controller
//!
//! Ties the framebuffer, the drawing operations and the background flush
//! together behind [`DisplayController`]. Drawing calls on an unconfigured
//! controller do nothing.

use std::sync::{Arc, Mutex};

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::{DrawTarget, OriginDimensions, Pixel, Point, Size};
use embedded_graphics::primitives::Rectangle;
use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};

use crate::bitmap::{Bitmap, SaveBuffer};
use crate::color::{expand, quantize, NativePixelFormat};
use crate::config::{EngineConfig, Resolution};
use crate::error::{Error, Result};
use crate::framebuffer::FrameBuffer;
use crate::glyph::{Glyph, GlyphOptions};
use crate::scroll::ScrollFill;
use crate::ssd1306::interface::DisplayInterface;
use crate::sync::{lock, FlushStatsSnapshot, SharedBus, SharedFrame, SyncTask};

/// Drawing surface contract implemented by the controller
pub trait DisplayController {
    /// Set up the panel for `mode` (modeline or `WxH`); a non-positive
    /// viewport dimension means the screen dimension
    fn configure(
        &mut self,
        mode: &str,
        viewport_width: i32,
        viewport_height: i32,
        double_buffered: bool,
    ) -> Result<()>;

    /// Stop the background flush, free the buffers and switch the panel off
    fn teardown(&mut self);

    /// Whether a framebuffer is allocated
    fn available(&self) -> bool;

    fn native_pixel_format(&self) -> NativePixelFormat;

    fn screen_width(&self) -> i32;
    fn screen_height(&self) -> i32;
    fn viewport_width(&self) -> i32;
    fn viewport_height(&self) -> i32;

    /// Colors of a viewport region, row-major
    fn read_region(&self, rect: &Rectangle) -> Result<Vec<Rgb888>>;

    fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888);
    /// Fill the screen with the brush color
    fn clear_screen(&mut self);
    fn draw_line(&mut self, start: Point, end: Point);
    fn draw_ellipse(&mut self, center: Point, size: Size);
    fn fill_rect(&mut self, rect: &Rectangle);
    fn invert_rect(&mut self, rect: &Rectangle);
    fn swap_fg_bg(&mut self, rect: &Rectangle);
    fn copy_rect(&mut self, source: &Rectangle, dest: Point);
    fn draw_glyph(&mut self, glyph: Glyph<'_>, options: GlyphOptions);
    fn draw_bitmap(
        &mut self,
        dest: Point,
        bitmap: &Bitmap<'_>,
        save: Option<&mut SaveBuffer>,
        source: Option<Rectangle>,
    );
    fn restore_bitmap(&mut self, save: &SaveBuffer);
    fn v_scroll(&mut self, delta: i32);
    fn h_scroll(&mut self, delta: i32);

    fn swap_buffers(&mut self) -> bool;
    fn suspend_background_primitive_execution(&self);
    fn resume_background_primitive_execution(&self);
}

/// Colors and options applied by drawing calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintState {
    pub pen: Rgb888,
    pub brush: Rgb888,
    pub scroll_fill: ScrollFill,
    /// Draw with pen and brush exchanged
    pub swap_fg_bg: bool,
}

impl Default for PaintState {
    fn default() -> Self {
        PaintState {
            pen: Rgb888::WHITE,
            brush: Rgb888::BLACK,
            scroll_fill: ScrollFill::default(),
            swap_fg_bg: false,
        }
    }
}

impl PaintState {
    /// Quantized (pen, brush), after the swap option
    fn bits(&self) -> (bool, bool) {
        let (pen, brush) = (quantize(self.pen), quantize(self.brush));
        if self.swap_fg_bg {
            (brush, pen)
        } else {
            (pen, brush)
        }
    }
}

pub struct Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    config: EngineConfig,
    bus: Option<SharedBus<I2C, RST, DELAY>>,
    frame: SharedFrame,
    sync: Option<SyncTask<I2C, RST, DELAY>>,
    resolution: Option<Resolution>,
    paint: PaintState,
}

impl<I2C, RST, DELAY> Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    /// Detached controller; call [`Ssd1306Controller::begin`] next
    pub fn new(config: EngineConfig) -> Self {
        Ssd1306Controller {
            config,
            bus: None,
            frame: Arc::new(Mutex::new(None)),
            sync: None,
            resolution: None,
            paint: PaintState::default(),
        }
    }

    /// Attach the bus the panel sits on
    pub fn begin(&mut self, i2c: I2C, rst: Option<RST>, delay: DELAY) {
        if self.bus.is_some() {
            self.teardown();
        }
        let interface = DisplayInterface::new(i2c, self.config.address, rst, delay);
        log::info!("Attached SSD1306 at 0x{:02X}", self.config.address);
        self.bus = Some(Arc::new(Mutex::new(interface)));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Reset the panel, allocate the framebuffer and start the background flush
    pub fn configure_with(
        &mut self,
        resolution: Resolution,
        viewport: Option<Size>,
        double_buffered: bool,
    ) -> Result<()> {
        let bus = self.bus.clone().ok_or(Error::NotAttached)?;
        self.teardown();

        let attempts = self.config.reset_attempts;
        if lock(&bus).reset(&resolution, attempts).is_none() {
            log::error!("Panel {} did not answer to reset", resolution.label);
            return Err(Error::ResetFailed { attempts });
        }

        let fb = FrameBuffer::new(&resolution, viewport, double_buffered).map_err(|e| {
            log::error!("Cannot configure {}: {}", resolution.label, e);
            e
        })?;
        *lock(&self.frame) = Some(fb);

        let sync = match SyncTask::spawn(
            &self.config,
            Arc::clone(&self.frame),
            bus,
            resolution.column_base(),
        ) {
            Ok(sync) => sync,
            Err(e) => {
                *lock(&self.frame) = None;
                return Err(e);
            }
        };

        log::info!(
            "Configured {} ({}x{}), double buffered: {}",
            resolution.label,
            resolution.width,
            resolution.height,
            double_buffered
        );
        self.sync = Some(sync);
        self.resolution = Some(resolution);
        Ok(())
    }

    fn with_frame<R>(&self, f: impl FnOnce(&mut FrameBuffer) -> R) -> Option<R> {
        lock(&self.frame).as_mut().map(f)
    }

    /// Draw with the current pen and brush bits
    fn paint_with(&self, f: impl FnOnce(&mut FrameBuffer, bool, bool)) {
        let (pen, brush) = self.paint.bits();
        self.with_frame(|fb| f(fb, pen, brush));
    }

    pub fn paint(&self) -> PaintState {
        self.paint
    }

    pub fn set_pen_color(&mut self, color: Rgb888) {
        self.paint.pen = color;
    }

    pub fn set_brush_color(&mut self, color: Rgb888) {
        self.paint.brush = color;
    }

    pub fn set_scroll_fill(&mut self, fill: ScrollFill) {
        self.paint.scroll_fill = fill;
    }

    pub fn set_paint_swap_fg_bg(&mut self, swap: bool) {
        self.paint.swap_fg_bg = swap;
    }

    /// Restrict drawing to `rect`, in viewport coordinates
    pub fn set_clipping_rect(&mut self, rect: Rectangle) {
        self.with_frame(|fb| fb.set_clip(rect));
    }

    pub fn reset_clipping_rect(&mut self) {
        self.with_frame(FrameBuffer::reset_clip);
    }

    pub fn clipping_rect(&self) -> Option<Rectangle> {
        self.with_frame(|fb| {
            let clip = fb.clip();
            if clip.is_empty() {
                Rectangle::zero()
            } else {
                Rectangle::with_corners(Point::new(clip.x1, clip.y1), Point::new(clip.x2, clip.y2))
            }
        })
    }

    pub fn screen_col(&self) -> i32 {
        self.with_frame(|fb| fb.scroll().col).unwrap_or(0)
    }

    pub fn screen_row(&self) -> i32 {
        self.with_frame(|fb| fb.scroll().row).unwrap_or(0)
    }

    pub fn set_screen_col(&mut self, value: i32) {
        self.with_frame(|fb| fb.set_screen_col(value));
    }

    pub fn set_screen_row(&mut self, value: i32) {
        self.with_frame(|fb| fb.set_screen_row(value));
    }

    /// Horizontal run of pen pixels
    pub fn fill_row(&mut self, y: i32, x1: i32, x2: i32) {
        self.paint_with(|fb, pen, _| fb.fill_row(y, x1, x2, pen));
    }

    /// Copy a row segment, used for software scrolling
    pub fn copy_row(&mut self, x1: i32, x2: i32, src_y: i32, dst_y: i32) {
        self.with_frame(|fb| fb.copy_row(x1, x2, src_y, dst_y));
    }

    /// Flush pending changes on the calling thread
    ///
    /// Returns `Ok(false)` when suspended, unconfigured or nothing changed.
    pub fn flush(&self) -> Result<bool> {
        match &self.sync {
            Some(sync) => sync.flush_now(),
            None => Ok(false),
        }
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.sync.as_ref().map(SyncTask::stats).unwrap_or_default()
    }

    pub fn is_suspended(&self) -> bool {
        self.sync.as_ref().is_some_and(|s| s.suspend_count() > 0)
    }
}

impl<I2C, RST, DELAY> DisplayController for Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    fn configure(
        &mut self,
        mode: &str,
        viewport_width: i32,
        viewport_height: i32,
        double_buffered: bool,
    ) -> Result<()> {
        let resolution: Resolution = mode.parse()?;
        let width = if viewport_width > 0 {
            viewport_width as u32
        } else {
            resolution.width as u32
        };
        let height = if viewport_height > 0 {
            viewport_height as u32
        } else {
            resolution.height as u32
        };
        self.configure_with(resolution, Some(Size::new(width, height)), double_buffered)
    }

    fn teardown(&mut self) {
        if let Some(mut sync) = self.sync.take() {
            sync.stop();
        }
        // the flush thread has exited, nothing reads the buffers any more
        if lock(&self.frame).take().is_none() {
            return;
        }
        if let Some(bus) = &self.bus {
            if let Err(e) = lock(bus).display_off() {
                log::warn!("Could not switch the panel off: {:?}", e);
            }
        }
        if let Some(resolution) = self.resolution.take() {
            log::info!("Released {}", resolution.label);
        }
    }

    fn available(&self) -> bool {
        lock(&self.frame).is_some()
    }

    fn native_pixel_format(&self) -> NativePixelFormat {
        NativePixelFormat::Mono
    }

    fn screen_width(&self) -> i32 {
        self.with_frame(|fb| fb.width()).unwrap_or(0)
    }

    fn screen_height(&self) -> i32 {
        self.with_frame(|fb| fb.height()).unwrap_or(0)
    }

    fn viewport_width(&self) -> i32 {
        self.with_frame(|fb| fb.viewport_width()).unwrap_or(0)
    }

    fn viewport_height(&self) -> i32 {
        self.with_frame(|fb| fb.viewport_height()).unwrap_or(0)
    }

    fn read_region(&self, rect: &Rectangle) -> Result<Vec<Rgb888>> {
        let bits = self
            .with_frame(|fb| fb.read_region(rect))
            .ok_or(Error::NotConfigured)??;
        Ok(bits.into_iter().map(expand).collect())
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888) {
        let on = quantize(color);
        self.with_frame(|fb| fb.set_pixel(x, y, on));
    }

    fn clear_screen(&mut self) {
        self.paint_with(|fb, _, brush| fb.clear(brush));
    }

    fn draw_line(&mut self, start: Point, end: Point) {
        self.paint_with(|fb, pen, _| fb.draw_line(start.x, start.y, end.x, end.y, pen));
    }

    fn draw_ellipse(&mut self, center: Point, size: Size) {
        self.paint_with(|fb, pen, _| fb.draw_ellipse(center, size, pen));
    }

    fn fill_rect(&mut self, rect: &Rectangle) {
        self.paint_with(|fb, _, brush| fb.fill_rect(rect, brush));
    }

    fn invert_rect(&mut self, rect: &Rectangle) {
        self.with_frame(|fb| fb.invert_rect(rect));
    }

    fn swap_fg_bg(&mut self, rect: &Rectangle) {
        self.paint_with(|fb, pen, brush| fb.swap_fg_bg(rect, pen, brush));
    }

    fn copy_rect(&mut self, source: &Rectangle, dest: Point) {
        self.with_frame(|fb| fb.copy_rect(source, dest));
    }

    fn draw_glyph(&mut self, glyph: Glyph<'_>, options: GlyphOptions) {
        self.paint_with(|fb, pen, brush| fb.draw_glyph(glyph, options, pen, brush));
    }

    fn draw_bitmap(
        &mut self,
        dest: Point,
        bitmap: &Bitmap<'_>,
        save: Option<&mut SaveBuffer>,
        source: Option<Rectangle>,
    ) {
        self.with_frame(|fb| fb.draw_bitmap(dest, bitmap, source, save));
    }

    fn restore_bitmap(&mut self, save: &SaveBuffer) {
        self.with_frame(|fb| fb.restore_bitmap(save));
    }

    fn v_scroll(&mut self, delta: i32) {
        let (mode, fill) = (self.config.pan_mode, self.paint.scroll_fill);
        self.with_frame(|fb| fb.v_scroll(delta, mode, fill));
    }

    fn h_scroll(&mut self, delta: i32) {
        let (mode, fill) = (self.config.pan_mode, self.paint.scroll_fill);
        self.with_frame(|fb| fb.h_scroll(delta, mode, fill));
    }

    fn swap_buffers(&mut self) -> bool {
        let swapped = self.with_frame(FrameBuffer::swap).unwrap_or(false);
        if swapped {
            if let Some(sync) = &self.sync {
                sync.count_swap();
                sync.notify();
            }
        }
        swapped
    }

    fn suspend_background_primitive_execution(&self) {
        if let Some(sync) = &self.sync {
            sync.suspend();
        }
    }

    fn resume_background_primitive_execution(&self) {
        if let Some(sync) = &self.sync {
            sync.resume();
        }
    }
}

impl<I2C, RST, DELAY> Drop for Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<I2C, RST, DELAY> OriginDimensions for Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    fn size(&self) -> Size {
        self.with_frame(|fb| Size::new(fb.viewport_width() as u32, fb.viewport_height() as u32))
            .unwrap_or_else(Size::zero)
    }
}

impl<I2C, RST, DELAY> DrawTarget for Ssd1306Controller<I2C, RST, DELAY>
where
    I2C: I2c + Send + 'static,
    RST: OutputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.with_frame(|fb| {
            for Pixel(point, color) in pixels {
                fb.set_pixel(point.x, point.y, quantize(color));
            }
        });
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> core::result::Result<(), Self::Error> {
        let on = quantize(color);
        self.with_frame(|fb| fb.fill_rect(area, on));
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> core::result::Result<(), Self::Error> {
        let on = quantize(color);
        self.with_frame(|fb| {
            let area = Rectangle::new(
                Point::zero(),
                Size::new(fb.viewport_width() as u32, fb.viewport_height() as u32),
            );
            fb.fill_rect(&area, on);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OLED_128X32;
    use crate::sim::{PanelSim, StdDelay};
    use crate::ssd1306::interface::NoResetPin;
    use std::time::Duration;

    type Controller = Ssd1306Controller<PanelSim, NoResetPin, StdDelay>;

    fn controller() -> (PanelSim, Controller) {
        let sim = PanelSim::new();
        let config = EngineConfig::default().with_refresh_period(Duration::from_secs(3600));
        let mut ctrl = Controller::new(config);
        ctrl.begin(sim.clone(), None, StdDelay);
        (sim, ctrl)
    }

    #[test]
    fn configure_needs_a_bus() {
        let mut ctrl = Controller::new(EngineConfig::default());
        assert!(matches!(ctrl.configure("128x64", 0, 0, false), Err(Error::NotAttached)));
        assert!(!ctrl.available());
    }

    #[test]
    fn unconfigured_controller_ignores_drawing() {
        let (_sim, mut ctrl) = controller();
        ctrl.set_pixel(1, 1, Rgb888::WHITE);
        ctrl.draw_line(Point::zero(), Point::new(5, 5));
        ctrl.h_scroll(3);
        assert!(!ctrl.swap_buffers());
        assert_eq!(ctrl.size(), Size::zero());
        assert!(matches!(
            ctrl.read_region(&Rectangle::new(Point::zero(), Size::new(1, 1))),
            Err(Error::NotConfigured)
        ));
        assert!(!ctrl.flush().unwrap());
    }

    #[test]
    fn viewport_defaults_when_not_positive() {
        let (_sim, mut ctrl) = controller();
        ctrl.configure(OLED_128X32, -1, 16, false).unwrap();
        assert_eq!((ctrl.viewport_width(), ctrl.viewport_height()), (128, 16));
        assert_eq!((ctrl.screen_width(), ctrl.screen_height()), (128, 32));
        assert_eq!(ctrl.native_pixel_format(), NativePixelFormat::Mono);
    }

    #[test]
    fn bad_mode_leaves_controller_unconfigured() {
        let (_sim, mut ctrl) = controller();
        assert!(matches!(ctrl.configure("200x64", 0, 0, false), Err(Error::Configuration(_))));
        assert!(matches!(ctrl.configure("128x64", 128, 80, false), Err(Error::Configuration(_))));
        assert!(!ctrl.available());
    }

    #[test]
    fn reset_failure_is_reported() {
        let (sim, mut ctrl) = controller();
        sim.fail_next_writes(usize::MAX);
        assert!(matches!(
            ctrl.configure("128x64", 0, 0, false),
            Err(Error::ResetFailed { attempts: 3 })
        ));
        assert!(!ctrl.available());
    }

    #[test]
    fn paint_swap_exchanges_pen_and_brush() {
        let (_sim, mut ctrl) = controller();
        ctrl.configure("16x8", 0, 0, false).unwrap();
        ctrl.set_paint_swap_fg_bg(true);
        ctrl.clear_screen();
        let all = Rectangle::new(Point::zero(), Size::new(16, 8));
        assert!(ctrl.read_region(&all).unwrap().iter().all(|c| *c == Rgb888::WHITE));
        ctrl.draw_line(Point::new(0, 3), Point::new(15, 3));
        let row = Rectangle::new(Point::new(0, 3), Size::new(16, 1));
        assert!(ctrl.read_region(&row).unwrap().iter().all(|c| *c == Rgb888::BLACK));
    }

    #[test]
    fn teardown_switches_panel_off_and_is_repeatable() {
        let (sim, mut ctrl) = controller();
        ctrl.configure("128x64", 0, 0, true).unwrap();
        assert!(sim.is_on());
        ctrl.teardown();
        assert!(!sim.is_on());
        assert!(!ctrl.available());
        ctrl.teardown();
        ctrl.configure("128x64", 0, 0, false).unwrap();
        assert!(ctrl.available());
    }
}
