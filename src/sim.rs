//! Host side stand-ins for the panel and the delay provider
//!
//! [`PanelSim`] decodes the SSD1306 I2C stream into a 128x64 GDDRAM model so
//! the engine can run, and be tested, without hardware. Clones share state:
//! hand one to the controller and keep one to inspect the panel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation};

use crate::config::Resolution;
use crate::ssd1306::{cmd::Cmd, flag::Flag};
use crate::sync::lock;

const PAGES: usize = Flag::RAM_ROWS as usize / 8;
const COLUMNS: usize = Flag::RAM_COLUMNS as usize;

#[derive(Debug)]
struct PanelState {
    ram: [[u8; COLUMNS]; PAGES],
    width: u16,
    height: u16,
    column_base: u8,
    start_line: u8,
    display_on: bool,
    multiplex: u8,
    columns: (u8, u8),
    pages: (u8, u8),
    column: u8,
    page: u8,
    commands: Vec<u8>,
    writes: usize,
    data_bytes: usize,
    fail_writes: usize,
}

impl PanelState {
    fn command(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            let cmd = bytes[i];
            let arg = |n: usize| bytes.get(i + n).copied().unwrap_or(0);
            self.commands.push(cmd);
            let args = match cmd {
                Cmd::COLUMN_ADDR => {
                    self.columns = (arg(1), arg(2));
                    self.column = arg(1);
                    2
                }
                Cmd::PAGE_ADDR => {
                    self.pages = (arg(1), arg(2));
                    self.page = arg(1);
                    2
                }
                Cmd::SET_MULTIPLEX => {
                    self.multiplex = arg(1);
                    1
                }
                Cmd::DISPLAY_ON => {
                    self.display_on = true;
                    0
                }
                Cmd::DISPLAY_OFF => {
                    self.display_on = false;
                    0
                }
                0x40..=0x7F => {
                    self.start_line = cmd & Flag::START_LINE_MASK;
                    0
                }
                Cmd::SET_CONTRAST
                | Cmd::MEMORY_MODE
                | Cmd::SET_DISPLAY_OFFSET
                | Cmd::SET_COM_PINS
                | Cmd::SET_DISPLAY_CLOCK_DIV
                | Cmd::SET_PRECHARGE
                | Cmd::SET_VCOM_DETECT
                | Cmd::CHARGE_PUMP => 1,
                _ => 0,
            };
            i += 1 + args;
        }
    }

    fn data(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.ram[self.page as usize % PAGES][self.column as usize % COLUMNS] = *byte;
            self.data_bytes += 1;
            if self.column >= self.columns.1 {
                self.column = self.columns.0;
                self.page = if self.page >= self.pages.1 {
                    self.pages.0
                } else {
                    self.page + 1
                };
            } else {
                self.column += 1;
            }
        }
    }

    fn pixel(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        let row = (y as usize + self.start_line as usize) % Flag::RAM_ROWS as usize;
        let column = self.column_base as usize + x as usize;
        self.ram[row / 8][column] & (1 << (row % 8)) != 0
    }
}

/// Simulated SSD1306 on an I2C bus
#[derive(Debug, Clone)]
pub struct PanelSim {
    state: Arc<Mutex<PanelState>>,
}

impl Default for PanelSim {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelSim {
    /// Full 128x64 panel
    pub fn new() -> Self {
        Self::with_panel(Flag::RAM_COLUMNS, Flag::RAM_ROWS)
    }

    /// Panel showing `resolution`, centred in controller RAM
    pub fn for_resolution(resolution: &Resolution) -> Self {
        Self::with_panel(resolution.width, resolution.height)
    }

    fn with_panel(width: u16, height: u16) -> Self {
        let state = PanelState {
            ram: [[0; COLUMNS]; PAGES],
            width,
            height,
            column_base: ((Flag::RAM_COLUMNS - width) / 2) as u8,
            start_line: 0,
            display_on: false,
            multiplex: (Flag::RAM_ROWS - 1) as u8,
            columns: (0, (COLUMNS - 1) as u8),
            pages: (0, (PAGES - 1) as u8),
            column: 0,
            page: 0,
            commands: Vec::new(),
            writes: 0,
            data_bytes: 0,
            fail_writes: 0,
        };
        PanelSim {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make the next `count` writes fail with a NACK
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.state).fail_writes = count;
    }

    /// Visible pixel at panel position (`x`, `y`)
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        lock(&self.state).pixel(x, y)
    }

    pub fn start_line(&self) -> u8 {
        lock(&self.state).start_line
    }

    pub fn is_on(&self) -> bool {
        lock(&self.state).display_on
    }

    pub fn multiplex(&self) -> u8 {
        lock(&self.state).multiplex
    }

    /// Every command byte received so far, arguments excluded
    pub fn commands(&self) -> Vec<u8> {
        lock(&self.state).commands.clone()
    }

    /// Successful I2C writes
    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }

    pub fn data_bytes(&self) -> usize {
        lock(&self.state).data_bytes
    }

    /// The visible area as text, `#` for lit pixels
    pub fn render(&self) -> String {
        let state = lock(&self.state);
        let mut out = String::with_capacity((state.width as usize + 1) * state.height as usize);
        for y in 0..state.height as i32 {
            for x in 0..state.width as i32 {
                out.push(if state.pixel(x, y) { '#' } else { '.' });
            }
            out.push('\n');
        }
        out
    }
}

impl ErrorType for PanelSim {
    type Error = ErrorKind;
}

impl I2c for PanelSim {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Address,
            ));
        }
        if address != Flag::DEFAULT_ADDRESS && address != Flag::DEFAULT_ADDRESS + 1 {
            return Err(ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Address,
            ));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    state.writes += 1;
                    match bytes.split_first() {
                        Some((&Flag::CONTROL_COMMAND, rest)) => state.command(rest),
                        Some((&Flag::CONTROL_DATA, rest)) => state.data(rest),
                        _ => return Err(ErrorKind::Other),
                    }
                }
                Operation::Read(buffer) => buffer.fill(0),
            }
        }
        Ok(())
    }
}

/// [`DelayNs`] backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}
