//! Display interface using I2C
use crate::config::Resolution;
use crate::ssd1306::{cmd::Cmd, flag::Flag};
use display_interface::DisplayError;
use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, OutputPin},
    i2c::I2c,
};

const RESET_PULSE_MS: u32 = 10;
const RESET_SETTLE_MS: u32 = 10;

/// Largest data payload per I2C write, not counting the control byte
pub const CHUNK_SIZE: usize = 32;

/// Placeholder for panels whose reset line is tied to the board reset
pub struct NoResetPin;

impl ErrorType for NoResetPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoResetPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Command/data framing for the SSD1306 over I2C plus the reset handshake
pub struct DisplayInterface<I2C, RST, DELAY> {
    /// I2C peripheral
    i2c: I2C,
    /// 7 bit panel address
    address: u8,
    /// Pin for resetting, `None` when not wired
    rst: Option<RST>,
    pub(crate) delay: DELAY,
}

impl<I2C, RST, DELAY> DisplayInterface<I2C, RST, DELAY> {
    pub fn new(i2c: I2C, address: u8, rst: Option<RST>, delay: DELAY) -> Self {
        DisplayInterface {
            i2c,
            address,
            rst,
            delay,
        }
    }
}

impl<I2C, RST, DELAY> DisplayInterface<I2C, RST, DELAY>
where
    I2C: I2c,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Send one command byte
    pub(crate) fn cmd(&mut self, command: u8) -> Result<(), DisplayError> {
        self.cmds(&[command])
    }

    /// Send a command followed by its argument bytes in one transfer
    pub(crate) fn cmds(&mut self, commands: &[u8]) -> Result<(), DisplayError> {
        let mut frame: heapless::Vec<u8, 8> = heapless::Vec::new();
        frame
            .push(Flag::CONTROL_COMMAND)
            .map_err(|_| DisplayError::InvalidFormatError)?;
        frame
            .extend_from_slice(commands)
            .map_err(|_| DisplayError::InvalidFormatError)?;

        match self.i2c.write(self.address, &frame) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("I2C write error for command 0x{:02X}: {:?}", commands[0], e);
                Err(DisplayError::BusWriteError)
            }
        }
    }

    /// Send display data, split in chunks the peripheral can take at once
    pub(crate) fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        let mut frame: heapless::Vec<u8, { CHUNK_SIZE + 1 }> = heapless::Vec::new();
        for chunk in data.chunks(CHUNK_SIZE) {
            frame.clear();
            // capacity is CHUNK_SIZE + 1, both pushes fit
            let _ = frame.push(Flag::CONTROL_DATA);
            let _ = frame.extend_from_slice(chunk);
            self.i2c
                .write(self.address, &frame)
                .map_err(|_| DisplayError::BusWriteError)?;
        }
        Ok(())
    }

    /// Pulse the reset line
    pub(crate) fn hard_reset(&mut self) -> Result<(), DisplayError> {
        let Some(rst) = self.rst.as_mut() else {
            log::debug!("No reset pin, skipping hard reset");
            return Ok(());
        };
        rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(1);
        rst.set_low().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(RESET_SETTLE_MS);
        Ok(())
    }

    /// Initialization command sequence, ends with the panel switched on
    pub(crate) fn soft_reset(&mut self, resolution: &Resolution) -> Result<(), DisplayError> {
        let com_pins = if resolution.height > 32 {
            Flag::COM_PINS_ALTERNATIVE
        } else {
            Flag::COM_PINS_SEQUENTIAL
        };

        self.cmd(Cmd::DISPLAY_OFF)?;
        self.cmds(&[Cmd::SET_DISPLAY_CLOCK_DIV, Flag::CLOCK_DIV_DEFAULT])?;
        self.cmds(&[Cmd::SET_MULTIPLEX, (resolution.height - 1) as u8])?;
        self.cmds(&[Cmd::SET_DISPLAY_OFFSET, 0x00])?;
        self.cmd(Cmd::SET_START_LINE)?;
        self.cmds(&[Cmd::CHARGE_PUMP, Flag::CHARGE_PUMP_ENABLE])?;
        self.cmds(&[Cmd::MEMORY_MODE, Flag::ADDRESSING_HORIZONTAL])?;
        self.cmd(Cmd::SEG_REMAP)?;
        self.cmd(Cmd::COM_SCAN_DEC)?;
        self.cmds(&[Cmd::SET_COM_PINS, com_pins])?;
        self.cmds(&[Cmd::SET_CONTRAST, Flag::CONTRAST_DEFAULT])?;
        self.cmds(&[Cmd::SET_PRECHARGE, Flag::PRECHARGE_INTERNAL])?;
        self.cmds(&[Cmd::SET_VCOM_DETECT, Flag::VCOM_DETECT_DEFAULT])?;
        self.cmd(Cmd::DISPLAY_ALL_ON_RESUME)?;
        self.cmd(Cmd::NORMAL_DISPLAY)?;
        self.cmd(Cmd::DEACTIVATE_SCROLL)?;
        self.cmd(Cmd::DISPLAY_ON)?;
        Ok(())
    }

    /// Hard + soft reset, retried up to `attempts` times
    ///
    /// Returns the number of attempts used, or `None` when all failed.
    pub(crate) fn reset(&mut self, resolution: &Resolution, attempts: u8) -> Option<u8> {
        for attempt in 1..=attempts {
            log::info!(
                "Resetting panel {} at 0x{:02X} (attempt {}/{})",
                resolution.label,
                self.address,
                attempt,
                attempts
            );
            let result = self.hard_reset().and_then(|_| self.soft_reset(resolution));
            match result {
                Ok(()) => return Some(attempt),
                Err(e) => log::warn!("Panel reset attempt {} failed: {:?}", attempt, e),
            }
        }
        None
    }

    /// Move the display start line, the row pan register
    pub(crate) fn set_start_line(&mut self, line: u8) -> Result<(), DisplayError> {
        self.cmd(Cmd::SET_START_LINE | (line & Flag::START_LINE_MASK))
    }

    /// Address one page across the panel columns, ready for `data`
    pub(crate) fn set_page_window(
        &mut self,
        page: u8,
        column_base: u8,
        width: u16,
    ) -> Result<(), DisplayError> {
        let last_column = column_base + (width - 1) as u8;
        self.cmds(&[Cmd::COLUMN_ADDR, column_base, last_column])?;
        self.cmds(&[Cmd::PAGE_ADDR, page, page])
    }

    /// Switch the panel off, used on teardown
    pub(crate) fn display_off(&mut self) -> Result<(), DisplayError> {
        self.cmd(Cmd::DISPLAY_OFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType as I2cErrorType, Operation};

    #[derive(Default)]
    struct RecordingI2c {
        writes: Vec<(u8, Vec<u8>)>,
        fail_first: usize,
    }

    impl I2cErrorType for RecordingI2c {
        type Error = ErrorKind;
    }

    impl I2c for RecordingI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail_first > 0 {
                self.fail_first -= 1;
                return Err(ErrorKind::Other);
            }
            for op in operations {
                if let Operation::Write(bytes) = op {
                    self.writes.push((address, bytes.to_vec()));
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPin {
        levels: Vec<bool>,
    }

    impl ErrorType for RecordingPin {
        type Error = core::convert::Infallible;
    }

    impl OutputPin for RecordingPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.levels.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.levels.push(true);
            Ok(())
        }
    }

    struct MockDelay;
    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn interface(fail_first: usize) -> DisplayInterface<RecordingI2c, RecordingPin, MockDelay> {
        let i2c = RecordingI2c {
            fail_first,
            ..Default::default()
        };
        DisplayInterface::new(i2c, 0x3C, Some(RecordingPin::default()), MockDelay)
    }

    #[test]
    fn commands_use_command_control_byte() {
        let mut iface = interface(0);
        iface.cmds(&[Cmd::COLUMN_ADDR, 0, 127]).unwrap();
        assert_eq!(iface.i2c.writes, vec![(0x3C, vec![0x00, 0x21, 0, 127])]);
    }

    #[test]
    fn data_is_chunked_with_data_control_byte() {
        let mut iface = interface(0);
        let payload = [0xAAu8; CHUNK_SIZE * 2 + 3];
        iface.data(&payload).unwrap();

        let writes = &iface.i2c.writes;
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|(_, w)| w[0] == Flag::CONTROL_DATA));
        assert_eq!(writes[0].1.len(), CHUNK_SIZE + 1);
        assert_eq!(writes[2].1.len(), 4);
    }

    #[test]
    fn hard_reset_pulses_low() {
        let mut iface = interface(0);
        iface.hard_reset().unwrap();
        assert_eq!(iface.rst.as_ref().unwrap().levels, vec![true, false, true]);
    }

    #[test]
    fn reset_retries_until_success() {
        let resolution = Resolution::new(128, 64).unwrap();
        // first soft reset fails on its very first command
        let mut iface = interface(1);
        assert_eq!(iface.reset(&resolution, 3), Some(2));
        let first = &iface.i2c.writes[0].1;
        assert_eq!(first, &vec![0x00, Cmd::DISPLAY_OFF]);
        let last = &iface.i2c.writes.last().unwrap().1;
        assert_eq!(last, &vec![0x00, Cmd::DISPLAY_ON]);
    }

    #[test]
    fn reset_gives_up_after_bounded_attempts() {
        let resolution = Resolution::new(128, 32).unwrap();
        let mut iface = interface(usize::MAX);
        assert_eq!(iface.reset(&resolution, 3), None);
        // high, low, high on every attempt
        assert_eq!(iface.rst.as_ref().unwrap().levels.len(), 9);
    }

    #[test]
    fn multiplex_and_com_pins_follow_height() {
        let mut iface = interface(0);
        iface.soft_reset(&Resolution::new(128, 32).unwrap()).unwrap();
        let writes: Vec<_> = iface.i2c.writes.iter().map(|(_, w)| w.clone()).collect();
        assert!(writes.contains(&vec![0x00, Cmd::SET_MULTIPLEX, 31]));
        assert!(writes.contains(&vec![0x00, Cmd::SET_COM_PINS, Flag::COM_PINS_SEQUENTIAL]));
    }

    #[test]
    fn start_line_is_masked() {
        let mut iface = interface(0);
        iface.set_start_line(70).unwrap();
        assert_eq!(iface.i2c.writes[0].1, vec![0x00, 0x40 | 6]);
    }
}
