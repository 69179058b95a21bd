//! Engine configuration and panel resolution descriptors

use core::str::FromStr;
use std::time::Duration;

use crate::error::Error;
use crate::ssd1306::flag::Flag;

/// 128x64 panel, the common 0.96" module
pub const OLED_128X64: &str = "\"OLED_128x64\" 128 64";
/// 128x32 panel, the common 0.91" module
pub const OLED_128X32: &str = "\"OLED_128x32\" 128 32";
/// 96x16 panel
pub const OLED_96X16: &str = "\"OLED_96x16\" 96 16";
/// 72x40 panel, centred in controller RAM
pub const OLED_72X40: &str = "\"OLED_72x40\" 72 40";
/// 64x48 panel, centred in controller RAM
pub const OLED_64X48: &str = "\"OLED_64x48\" 64 48";

/// Physical panel geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub label: String,
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub fn new(width: u16, height: u16) -> Result<Self, Error> {
        let resolution = Resolution {
            label: format!("{}x{}", width, height),
            width,
            height,
        };
        resolution.validate()?;
        Ok(resolution)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.width > Flag::RAM_COLUMNS {
            return Err(Error::Configuration(format!(
                "width {} outside 1..={}",
                self.width,
                Flag::RAM_COLUMNS
            )));
        }
        if self.height == 0 || self.height > Flag::RAM_ROWS || self.height % 8 != 0 {
            return Err(Error::Configuration(format!(
                "height {} must be a multiple of 8 up to {}",
                self.height,
                Flag::RAM_ROWS
            )));
        }
        Ok(())
    }

    /// Number of 8 row pages
    pub fn pages(&self) -> u8 {
        (self.height / 8) as u8
    }

    /// First controller RAM column used by the panel
    pub fn column_base(&self) -> u8 {
        ((Flag::RAM_COLUMNS - self.width) / 2) as u8
    }
}

impl FromStr for Resolution {
    type Err = Error;

    /// Parse either a modeline (`"label" width height`) or `WIDTHxHEIGHT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || Error::Configuration(format!("unrecognised resolution {:?}", s));
        let parse_dim = |v: &str| v.trim().parse::<u16>().map_err(|_| bad());

        let resolution = if let Some(rest) = s.strip_prefix('"') {
            let end = rest.find('"').ok_or_else(bad)?;
            let label = rest[..end].to_string();
            let mut dims = rest[end + 1..].split_whitespace();
            let width = parse_dim(dims.next().ok_or_else(bad)?)?;
            let height = parse_dim(dims.next().ok_or_else(bad)?)?;
            Resolution {
                label,
                width,
                height,
            }
        } else {
            let (w, h) = s.split_once(['x', 'X']).ok_or_else(bad)?;
            Resolution {
                label: s.to_string(),
                width: parse_dim(w)?,
                height: parse_dim(h)?,
            }
        };
        resolution.validate()?;
        Ok(resolution)
    }
}

/// How scrolling is realised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanMode {
    /// Change the pan offsets; the panel start line register handles rows when
    /// the panel covers all controller rows, transmit addressing handles the rest
    Hardware,
    /// Move the buffer contents
    Shift,
}

/// Engine settings supplied once at setup
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 7 bit I2C address of the panel
    pub address: u8,
    /// Period of the background flush
    pub refresh_period: Duration,
    /// Hard + soft reset attempts before giving up
    pub reset_attempts: u8,
    pub pan_mode: PanMode,
    pub task_name: String,
    pub task_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            address: Flag::DEFAULT_ADDRESS,
            refresh_period: Duration::from_millis(20),
            reset_attempts: 3,
            pan_mode: PanMode::Hardware,
            task_name: "ssd1306-sync".to_string(),
            task_stack_size: 16 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    pub fn with_reset_attempts(mut self, attempts: u8) -> Self {
        self.reset_attempts = attempts.max(1);
        self
    }

    pub fn with_pan_mode(mut self, mode: PanMode) -> Self {
        self.pan_mode = mode;
        self
    }

    /// Name of the flush thread
    pub fn with_task_name(mut self, name: impl Into<String>) -> Self {
        self.task_name = name.into();
        self
    }

    pub fn with_task_stack_size(mut self, bytes: usize) -> Self {
        self.task_stack_size = bytes;
        self
    }
}
