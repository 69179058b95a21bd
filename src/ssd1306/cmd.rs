pub struct Cmd;
impl Cmd {
    // Fundamental
    pub const SET_CONTRAST: u8 = 0x81;
    pub const DISPLAY_ALL_ON_RESUME: u8 = 0xA4;
    pub const NORMAL_DISPLAY: u8 = 0xA6;
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;

    // Scrolling
    pub const DEACTIVATE_SCROLL: u8 = 0x2E;

    // Addressing
    pub const MEMORY_MODE: u8 = 0x20;
    pub const COLUMN_ADDR: u8 = 0x21;
    pub const PAGE_ADDR: u8 = 0x22;

    // Hardware configuration
    pub const SET_START_LINE: u8 = 0x40;
    pub const SEG_REMAP: u8 = 0xA1;
    pub const SET_MULTIPLEX: u8 = 0xA8;
    pub const COM_SCAN_DEC: u8 = 0xC8;
    pub const SET_DISPLAY_OFFSET: u8 = 0xD3;
    pub const SET_COM_PINS: u8 = 0xDA;

    // Timing and driving
    pub const SET_DISPLAY_CLOCK_DIV: u8 = 0xD5;
    pub const SET_PRECHARGE: u8 = 0xD9;
    pub const SET_VCOM_DETECT: u8 = 0xDB;
    pub const CHARGE_PUMP: u8 = 0x8D;
}

/*
Datasheet command table (SSD1306 rev 1.1, section 9):
0x81 - Set Contrast Control
0xA4/0xA5 - Entire Display ON (resume / ignore RAM)
0xA6/0xA7 - Normal / Inverse
0xAE/0xAF - Display OFF / ON
0x20 - Memory Addressing Mode
0x21 - Column Address (start, end)
0x22 - Page Address (start, end)
0x40..0x7F - Display Start Line
0xA8 - Multiplex Ratio
0xD3 - Display Offset
0xDA - COM Pins Hardware Configuration
0x8D - Charge Pump Setting
*/
