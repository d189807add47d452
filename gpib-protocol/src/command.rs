//! Interface command bytes sent with ATN asserted.
//!
//! These configure the state of the bus itself; they are never device data.

/// Go to local.
pub const GTL: u8 = 0x01;
/// Selected device clear.
pub const SDC: u8 = 0x04;
/// Parallel poll configure.
pub const PPC: u8 = 0x05;
/// Group execute trigger.
pub const GET: u8 = 0x08;
/// Take control (passes Controller-in-Charge to the addressed talker).
pub const TCT: u8 = 0x09;
/// Local lockout.
pub const LLO: u8 = 0x11;
/// Device clear (universal, unaddressed).
pub const DCL: u8 = 0x14;
/// Parallel poll unconfigure (universal).
pub const PPU: u8 = 0x15;
/// Serial poll enable.
pub const SPE: u8 = 0x18;
/// Serial poll disable.
pub const SPD: u8 = 0x19;
/// Unlisten.
pub const UNL: u8 = 0x3F;
/// Untalk.
pub const UNT: u8 = 0x5F;
/// Parallel poll enable (base of the secondary command group; the low nibble
/// carries the sense bit and data line assignment).
pub const PPE: u8 = 0x60;
/// Parallel poll disable.
pub const PPD: u8 = 0x70;

/// My-listen-address command for a primary address.
pub const fn mla(pad: u8) -> u8 {
    0x20 | (pad & 0x1F)
}

/// My-talk-address command for a primary address.
pub const fn mta(pad: u8) -> u8 {
    0x40 | (pad & 0x1F)
}

/// Parallel poll enable command for a data line (1..=8) and sense bit.
/// The device asserts its line during a poll when its individual status
/// equals `sense`.
pub const fn ppe(data_line: u8, sense: bool) -> u8 {
    PPE | ((sense as u8) << 3) | ((data_line - 1) & 0x07)
}
