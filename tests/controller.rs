use std::time::Duration;

use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoTextStyle};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::Text;

use ssd1306_fb::config::{OLED_128X64, OLED_72X40};
use ssd1306_fb::sim::{PanelSim, StdDelay};
use ssd1306_fb::{
    Bitmap, Cmd, DisplayController, EngineConfig, NoResetPin, PanMode, Resolution, SaveBuffer,
    ScrollFill, Ssd1306Controller,
};

type Controller = Ssd1306Controller<PanelSim, NoResetPin, StdDelay>;

fn controller_for(mode: &str, pan_mode: PanMode) -> (PanelSim, Controller) {
    let resolution: Resolution = mode.parse().unwrap();
    let sim = PanelSim::for_resolution(&resolution);
    let config = EngineConfig::default()
        .with_refresh_period(Duration::from_secs(3600))
        .with_pan_mode(pan_mode);
    let mut ctrl = Controller::new(config);
    ctrl.begin(sim.clone(), None, StdDelay);
    ctrl.configure(mode, 0, 0, false).unwrap();
    // waits for the first flush of the thread, if it is still running
    ctrl.flush().unwrap();
    (sim, ctrl)
}

fn controller() -> (PanelSim, Controller) {
    controller_for(OLED_128X64, PanMode::Hardware)
}

fn whole(ctrl: &Controller) -> Rectangle {
    Rectangle::new(
        Point::zero(),
        Size::new(ctrl.viewport_width() as u32, ctrl.viewport_height() as u32),
    )
}

#[test]
fn horizontal_line_reaches_buffer_and_panel() {
    let (sim, mut ctrl) = controller();
    ctrl.draw_line(Point::new(0, 32), Point::new(127, 32));
    ctrl.flush().unwrap();

    let row = |y| Rectangle::new(Point::new(0, y), Size::new(128, 1));
    assert!(ctrl.read_region(&row(32)).unwrap().iter().all(|c| *c == Rgb888::WHITE));
    let lit = ctrl
        .read_region(&whole(&ctrl))
        .unwrap()
        .iter()
        .filter(|c| **c == Rgb888::WHITE)
        .count();
    assert_eq!(lit, 128);
    for x in 0..128 {
        assert!(sim.pixel(x, 32));
        assert!(!sim.pixel(x, 31) && !sim.pixel(x, 33));
    }
}

#[test]
fn clear_uses_the_brush() {
    let (_sim, mut ctrl) = controller();
    ctrl.set_brush_color(Rgb888::WHITE);
    ctrl.clear_screen();
    let area = whole(&ctrl);
    assert!(ctrl.read_region(&area).unwrap().iter().all(|c| *c == Rgb888::WHITE));

    ctrl.set_brush_color(Rgb888::BLACK);
    ctrl.clear_screen();
    assert!(ctrl.read_region(&area).unwrap().iter().all(|c| *c == Rgb888::BLACK));
}

#[test]
fn colors_are_quantized() {
    let (_sim, mut ctrl) = controller();
    ctrl.set_pixel(0, 0, Rgb888::new(200, 200, 200));
    ctrl.set_pixel(1, 0, Rgb888::new(20, 20, 20));
    ctrl.set_pixel(2, 0, Rgb888::GREEN);
    ctrl.set_pixel(3, 0, Rgb888::BLUE);
    let pixels = ctrl
        .read_region(&Rectangle::new(Point::zero(), Size::new(4, 1)))
        .unwrap();
    assert_eq!(
        pixels,
        vec![Rgb888::WHITE, Rgb888::BLACK, Rgb888::WHITE, Rgb888::BLACK]
    );
}

#[test]
fn read_region_outside_viewport_fails() {
    let (_sim, ctrl) = controller();
    assert!(ctrl
        .read_region(&Rectangle::new(Point::new(120, 0), Size::new(16, 1)))
        .is_err());
}

#[test]
fn h_scroll_round_trip_in_both_modes() {
    for pan_mode in [PanMode::Hardware, PanMode::Shift] {
        let (sim, mut ctrl) = controller_for(OLED_128X64, pan_mode);
        ctrl.draw_line(Point::new(0, 0), Point::new(40, 30));
        ctrl.set_pixel(127, 63, Rgb888::WHITE);
        let area = whole(&ctrl);
        let before = ctrl.read_region(&area).unwrap();

        ctrl.h_scroll(5);
        ctrl.flush().unwrap();
        // content moved right on the panel as well
        assert!(sim.pixel(5, 0), "{:?}", pan_mode);
        assert!(sim.pixel(4, 63), "{:?}", pan_mode);

        ctrl.h_scroll(-5);
        ctrl.flush().unwrap();
        assert_eq!(ctrl.read_region(&area).unwrap(), before, "{:?}", pan_mode);
        assert!(sim.pixel(0, 0) && sim.pixel(127, 63), "{:?}", pan_mode);
    }
}

#[test]
fn v_scroll_uses_start_line_on_64_row_panels() {
    let (sim, mut ctrl) = controller();
    ctrl.set_pixel(5, 10, Rgb888::WHITE);
    ctrl.flush().unwrap();
    let data_before = sim.data_bytes();

    ctrl.v_scroll(8);
    ctrl.flush().unwrap();
    assert_eq!(sim.start_line(), 56);
    assert_eq!(ctrl.screen_row(), 56);
    // only the register changed
    assert_eq!(sim.data_bytes(), data_before);
    assert!(sim.pixel(5, 18));
    assert!(!sim.pixel(5, 10));
    assert_eq!(
        ctrl.read_region(&Rectangle::new(Point::new(5, 18), Size::new(1, 1)))
            .unwrap(),
        vec![Rgb888::WHITE]
    );
}

#[test]
fn v_scroll_on_short_panel_resends_pixels() {
    let (sim, mut ctrl) = controller_for("128x32", PanMode::Hardware);
    ctrl.set_pixel(5, 10, Rgb888::WHITE);
    ctrl.v_scroll(3);
    ctrl.flush().unwrap();
    assert_eq!(sim.start_line(), 0);
    assert!(sim.pixel(5, 13));
    assert!(!sim.pixel(5, 10));
}

#[test]
fn scroll_fill_paints_uncovered_rows() {
    let (sim, mut ctrl) = controller();
    ctrl.set_scroll_fill(ScrollFill::Color(Rgb888::WHITE));
    ctrl.v_scroll(2);
    ctrl.flush().unwrap();
    for x in [0, 64, 127] {
        assert!(sim.pixel(x, 0) && sim.pixel(x, 1));
        assert!(!sim.pixel(x, 2));
    }
}

#[test]
fn narrow_panel_uses_centred_columns() {
    let (sim, mut ctrl) = controller_for(OLED_72X40, PanMode::Hardware);
    assert_eq!((ctrl.screen_width(), ctrl.screen_height()), (72, 40));
    ctrl.set_pixel(0, 0, Rgb888::WHITE);
    ctrl.set_pixel(71, 39, Rgb888::WHITE);
    ctrl.flush().unwrap();
    assert!(sim.pixel(0, 0));
    assert!(sim.pixel(71, 39));
    assert!(!sim.pixel(1, 0));
    // 72x40 cannot use the start line register
    ctrl.v_scroll(1);
    ctrl.flush().unwrap();
    assert_eq!(sim.start_line(), 0);
    assert!(sim.pixel(0, 1));
}

#[test]
fn bitmap_save_and_restore() {
    let (sim, mut ctrl) = controller();
    for y in (0..64).step_by(3) {
        ctrl.draw_line(Point::new(0, y), Point::new(127, 63 - y));
    }
    let area = whole(&ctrl);
    let before = ctrl.read_region(&area).unwrap();

    let pixels = [0xFFu8; 8 * 8 * 4];
    let sprite = Bitmap::rgba8888(8, 8, &pixels);
    let mut save = SaveBuffer::default();
    ctrl.draw_bitmap(Point::new(60, 30), &sprite, Some(&mut save), None);
    assert!(!save.is_empty());
    ctrl.flush().unwrap();
    for (x, y) in [(60, 30), (67, 37)] {
        assert!(sim.pixel(x, y));
    }

    ctrl.restore_bitmap(&save);
    ctrl.flush().unwrap();
    assert_eq!(ctrl.read_region(&area).unwrap(), before);
}

#[test]
fn text_through_draw_target() {
    let (sim, mut ctrl) = controller();
    let style = MonoTextStyle::new(&FONT_6X10, Rgb888::WHITE);
    Text::new("Hi", Point::new(0, 8), style).draw(&mut ctrl).unwrap();
    ctrl.flush().unwrap();

    let lit = ctrl
        .read_region(&Rectangle::new(Point::zero(), Size::new(12, 10)))
        .unwrap()
        .iter()
        .filter(|c| **c == Rgb888::WHITE)
        .count();
    assert!(lit > 10);
    // nothing right of the two glyph cells
    let rest = Rectangle::new(Point::new(12, 0), Size::new(116, 64));
    assert!(ctrl.read_region(&rest).unwrap().iter().all(|c| *c == Rgb888::BLACK));
    assert!((0..12).any(|x| (0..10).any(|y| sim.pixel(x, y))));
}

#[test]
fn clipping_limits_drawing() {
    let (_sim, mut ctrl) = controller();
    ctrl.set_clipping_rect(Rectangle::new(Point::new(10, 10), Size::new(5, 5)));
    ctrl.set_brush_color(Rgb888::WHITE);
    ctrl.fill_rect(&Rectangle::new(Point::zero(), Size::new(128, 64)));
    ctrl.reset_clipping_rect();

    let lit = ctrl
        .read_region(&whole(&ctrl))
        .unwrap()
        .iter()
        .filter(|c| **c == Rgb888::WHITE)
        .count();
    assert_eq!(lit, 25);
    assert_eq!(
        ctrl.clipping_rect(),
        Some(Rectangle::new(Point::zero(), Size::new(128, 64)))
    );
}

#[test]
fn viewport_smaller_than_screen() {
    let sim = PanelSim::new();
    let mut ctrl = Controller::new(EngineConfig::default().with_refresh_period(Duration::from_secs(3600)));
    ctrl.begin(sim, None, StdDelay);
    ctrl.configure(OLED_128X64, 64, 32, true).unwrap();
    assert_eq!(ctrl.size(), Size::new(64, 32));
    assert!(ctrl
        .read_region(&Rectangle::new(Point::new(0, 32), Size::new(1, 1)))
        .is_err());
    assert!(ctrl.swap_buffers());
}

#[test]
fn mask_bitmap_paints_its_own_foreground() {
    let (sim, mut ctrl) = controller();
    ctrl.set_pen_color(Rgb888::BLACK);
    let bits = [0b1010_0000u8, 0b0100_0000];
    let mask = Bitmap::mask(3, 2, &bits, Rgb888::WHITE);
    ctrl.draw_bitmap(Point::new(10, 20), &mask, None, None);
    ctrl.flush().unwrap();

    assert!(sim.pixel(10, 20) && sim.pixel(12, 20) && sim.pixel(11, 21));
    assert!(!sim.pixel(11, 20) && !sim.pixel(10, 21) && !sim.pixel(12, 21));
}

#[test]
fn panel_commands_follow_the_lifecycle() {
    let (sim, mut ctrl) = controller_for("128x32", PanMode::Hardware);
    assert_eq!(sim.multiplex(), 31);
    assert!(sim.is_on());
    let commands = sim.commands();
    assert!(commands.contains(&Cmd::SET_MULTIPLEX));
    // initialization starts with the panel off and ends by switching it on
    let last = |cmd: u8| commands.iter().rposition(|c| *c == cmd);
    assert!(last(Cmd::DISPLAY_ON) > last(Cmd::DISPLAY_OFF));

    ctrl.teardown();
    assert!(!sim.is_on());
    assert_eq!(sim.commands().last(), Some(&Cmd::DISPLAY_OFF));
}
