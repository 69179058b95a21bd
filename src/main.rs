use std::thread;
use std::time::Duration;

use anyhow::Context;
use embedded_graphics::mono_font::iso_8859_15::FONT_5X8;
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::primitives::{Circle, PrimitiveStyle, Rectangle};
use embedded_graphics::{prelude::*, text::Text};

// https://docs.rs/embedded-graphics/0.8.1/embedded_graphics/mono_font/index.html#modules
use embedded_graphics::mono_font::{iso_8859_15::FONT_6X10, MonoTextStyle, MonoTextStyleBuilder};

use ssd1306_fb::config::OLED_128X64;
use ssd1306_fb::sim::{PanelSim, StdDelay};
use ssd1306_fb::{
    Bitmap, DisplayController, EngineConfig, Glyph, GlyphOptions, NoResetPin, PanMode, Resolution,
    SaveBuffer, Ssd1306Controller,
};

// 8x8 smiley, one byte per row
const SMILEY: [u8; 8] = [
    0b0011_1100,
    0b0100_0010,
    0b1010_0101,
    0b1000_0001,
    0b1010_0101,
    0b1001_1001,
    0b0100_0010,
    0b0011_1100,
];

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Panel mode from the command line, e.g. `128x32` or a quoted modeline
    let mode = std::env::args().nth(1).unwrap_or_else(|| OLED_128X64.to_string());
    let resolution: Resolution = mode.parse().context("Unsupported panel mode")?;

    let sim = PanelSim::for_resolution(&resolution);
    let config = EngineConfig::default()
        .with_refresh_period(Duration::from_millis(10))
        .with_pan_mode(PanMode::Hardware);

    log::info!("Creating controller for {}", resolution.label);
    let mut display: Ssd1306Controller<PanelSim, NoResetPin, StdDelay> = Ssd1306Controller::new(config);
    display.begin(sim.clone(), None, StdDelay);
    display
        .configure(&mode, 0, 0, false)
        .map_err(|e| anyhow::anyhow!("Configuration failed: {}", e))?;

    // Batch the whole frame into one flush
    display.suspend_background_primitive_execution();

    display.clear_screen();
    let title_style = MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(Rgb888::WHITE)
        .build();
    Text::new("ssd1306-fb", Point::new(2, 9), title_style)
        .draw(&mut display)
        .map_err(|e| anyhow::anyhow!("Failed to draw title: {:?}", e))?;

    let label_style = MonoTextStyle::new(&FONT_5X8, Rgb888::WHITE);
    Text::new(&resolution.label, Point::new(2, 20), label_style)
        .draw(&mut display)
        .map_err(|e| anyhow::anyhow!("Failed to draw label: {:?}", e))?;

    let width = display.viewport_width();
    let height = display.viewport_height();
    display.draw_line(Point::new(0, 11), Point::new(width - 1, 11));
    Circle::new(Point::new(width - 22, 1), 20)
        .into_styled(PrimitiveStyle::with_stroke(Rgb888::WHITE, 1))
        .draw(&mut display)
        .map_err(|e| anyhow::anyhow!("Failed to draw circle: {:?}", e))?;

    let options = GlyphOptions {
        bold: true,
        underline: true,
        ..Default::default()
    };
    display.draw_glyph(
        Glyph {
            x: 80,
            y: height - 10,
            width: 8,
            height: 8,
            data: &SMILEY,
        },
        options,
    );

    display.resume_background_primitive_execution();

    // Move a sprite over the static screen, putting the background back each step
    let sprite = Bitmap::mask(8, 8, &SMILEY, Rgb888::WHITE);
    let mut save = SaveBuffer::default();
    for step in 0..8 {
        display.suspend_background_primitive_execution();
        display.restore_bitmap(&save);
        let dest = Point::new(4 + step * 6, height - 12);
        display.draw_bitmap(dest, &sprite, Some(&mut save), None);
        display.resume_background_primitive_execution();
        thread::sleep(Duration::from_millis(20));
    }

    display.h_scroll(4);
    display.invert_rect(&Rectangle::new(Point::zero(), Size::new(width as u32, 11)));
    thread::sleep(Duration::from_millis(50));
    display.flush().map_err(|e| anyhow::anyhow!("Flush failed: {}", e))?;

    println!("{}", sim.render());

    let stats = display.stats();
    log::info!(
        "Frames: {}, pages: {}, errors: {}, swaps: {}, last flush: {} us",
        stats.frames,
        stats.pages_sent,
        stats.errors,
        stats.buffer_swaps,
        stats.last_flush_us
    );

    display.teardown();
    Ok(())
}
