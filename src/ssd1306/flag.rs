/// Flag values and constants for the SSD1306 controller.
///
/// Values are grouped by the command they belong to.
pub struct Flag;
#[allow(missing_docs)]
impl Flag {
    // Controller RAM (GDDRAM) geometry
    pub const RAM_COLUMNS: u16 = 128;
    pub const RAM_ROWS: u16 = 64;

    // I2C control byte: Co = 0, D/C# selects command or data stream
    pub const CONTROL_COMMAND: u8 = 0x00;
    pub const CONTROL_DATA: u8 = 0x40;

    // Default 7 bit address (SA0 low); 0x3D with SA0 high
    pub const DEFAULT_ADDRESS: u8 = 0x3C;

    // Memory Addressing Mode (0x20)
    pub const ADDRESSING_HORIZONTAL: u8 = 0x00;

    // Charge Pump Setting (0x8D)
    pub const CHARGE_PUMP_ENABLE: u8 = 0x14;

    // COM Pins Hardware Configuration (0xDA)
    pub const COM_PINS_SEQUENTIAL: u8 = 0x02; // panels up to 32 rows
    pub const COM_PINS_ALTERNATIVE: u8 = 0x12; // taller panels

    // Set Display Clock Divide Ratio (0xD5): suggested oscillator/ratio
    pub const CLOCK_DIV_DEFAULT: u8 = 0x80;

    // Pre-charge Period (0xD9) with internal charge pump
    pub const PRECHARGE_INTERNAL: u8 = 0xF1;

    // VCOMH Deselect Level (0xDB)
    pub const VCOM_DETECT_DEFAULT: u8 = 0x40;

    // Contrast (0x81)
    pub const CONTRAST_DEFAULT: u8 = 0xCF;

    // Display Start Line (0x40 | line)
    pub const START_LINE_MASK: u8 = 0x3F;
}
