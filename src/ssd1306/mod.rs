//! SSD1306 OLED controller over I2C
//!
//! Used in the common 0.96" 128x64 and 0.91" 128x32 modules, and in the
//! smaller 96x16, 72x40 and 64x48 variants.
//!
//! Every I2C write starts with a control byte: [`flag::Flag::CONTROL_COMMAND`]
//! for command bytes, [`flag::Flag::CONTROL_DATA`] for GDDRAM data. The
//! controller RAM is 128 columns by 8 pages; each data byte covers 8 rows of
//! one column, least significant bit on top.
//!
//! Datasheet: <https://cdn-shop.adafruit.com/datasheets/SSD1306.pdf>

pub mod cmd;
pub mod flag;
pub mod interface;
