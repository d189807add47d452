use std::{error::Error, fmt::Display};

/// The error taxonomy reported through the thread-scoped error code.
///
/// A code is meaningful only while the accompanying status word has the
/// error flag set. The numeric values match the classic driver taxonomy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// System error.
    System = 0,
    /// The operation requires the board to be Controller-in-Charge.
    NotController = 1,
    /// A write found no listeners on the bus.
    NoListener = 2,
    /// The board is not addressed correctly.
    Address = 3,
    /// Invalid argument.
    InvalidArgument = 4,
    /// The operation requires the board to be System Controller.
    NotSystemController = 5,
    /// The I/O operation was aborted.
    Aborted = 6,
    /// Non-existent interface board.
    NoBoard = 7,
    /// Error performing DMA.
    Dma = 8,
    /// An I/O operation was started while a previous one was in progress.
    InProgress = 10,
    /// No capability for the intended operation.
    NoCapability = 11,
    /// File system operation error.
    FileSystem = 12,
    /// Command error during a device call.
    Bus = 14,
    /// A serial poll status byte was lost.
    StatusByteLost = 15,
    /// SRQ remains asserted.
    SrqStuck = 16,
    /// The return buffer is full.
    TableOverflow = 20,
    /// The address or board is locked.
    Locked = 21,
    /// The unit descriptor is invalid or stale.
    InvalidHandle = 23,
    /// A wait is already in progress on this unit.
    WaitInProgress = 26,
    /// The wait was cancelled by an interface reset.
    InterfaceReset = 27,
    /// The system or board lost power or went to standby.
    PowerLoss = 28,
}

impl ErrorCode {
    /// The numeric code of the classic taxonomy.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ErrorCode::System => "system error",
            ErrorCode::NotController => "board is not Controller-in-Charge",
            ErrorCode::NoListener => "no listeners on the bus",
            ErrorCode::Address => "board not addressed correctly",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::NotSystemController => "board is not System Controller",
            ErrorCode::Aborted => "I/O operation aborted",
            ErrorCode::NoBoard => "non-existent interface board",
            ErrorCode::Dma => "DMA error",
            ErrorCode::InProgress => "I/O operation already in progress",
            ErrorCode::NoCapability => "no capability for operation",
            ErrorCode::FileSystem => "file system error",
            ErrorCode::Bus => "command error during device call",
            ErrorCode::StatusByteLost => "serial poll status byte lost",
            ErrorCode::SrqStuck => "SRQ remains asserted",
            ErrorCode::TableOverflow => "return buffer full",
            ErrorCode::Locked => "address or board is locked",
            ErrorCode::InvalidHandle => "invalid unit descriptor",
            ErrorCode::WaitInProgress => "wait already in progress",
            ErrorCode::InterfaceReset => "wait cancelled by interface reset",
            ErrorCode::PowerLoss => "board lost power or went to standby",
        };
        write!(f, "{}", message)
    }
}

impl Error for ErrorCode {}

/// Errors raised while validating or decoding a bus address.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressError {
    PrimaryOutOfRange(u8),
    SecondaryOutOfRange(u8),
    ReservedTerminator,
}

impl Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressError::PrimaryOutOfRange(pad) => {
                write!(f, "primary address {} outside 0..=30", pad)
            }
            AddressError::SecondaryOutOfRange(sad) => {
                write!(f, "secondary address {:#04x} outside 0x60..=0x7e", sad)
            }
            AddressError::ReservedTerminator => {
                write!(f, "the address list terminator is not a valid address")
            }
        }
    }
}

impl Error for AddressError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_match_the_classic_taxonomy() {
        assert_eq!(ErrorCode::System.code(), 0);
        assert_eq!(ErrorCode::NotController.code(), 1);
        assert_eq!(ErrorCode::NotSystemController.code(), 5);
        assert_eq!(ErrorCode::InProgress.code(), 10);
        assert_eq!(ErrorCode::TableOverflow.code(), 20);
        assert_eq!(ErrorCode::InvalidHandle.code(), 23);
        assert_eq!(ErrorCode::PowerLoss.code(), 28);
    }
}
