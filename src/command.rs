/// Anything that goes on the wire as a single command byte.
pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM function commands understood by every 1-Wire slave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Followed by 64 address bits; only the matching device stays selected
    MatchRom = 0x55,
    SearchRom = 0xF0,
    /// Like `SearchRom`, but only devices with an alarm flag participate
    SearchRomAlarmed = 0xEC,
    /// Addresses every device at once
    SkipRom = 0xCC,
    /// Single-drop buses only
    ReadRom = 0x33,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
