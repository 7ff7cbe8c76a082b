use core::fmt::Debug;
use thiserror::Error;

/// Error type
///
/// Every variant is local to one transaction: callers treat the device as
/// offline for the current cycle and carry on with the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error<E: Sized + Debug> {
    /// Wire not high before reset, or still held low after the presence window
    #[error("1-Wire line stuck low")]
    WireFault,
    /// No presence on wire
    #[error("no presence pulse")]
    NoPresence,
    /// The bridge chip stayed busy past the polling limit
    #[error("1-Wire bridge busy timeout")]
    BridgeTimeout,
    /// The bridge chip did not report a completed device reset
    #[error("1-Wire bridge did not reset")]
    BridgeReset,
    #[error("CRC mismatch {{ computed={0:#04x}, received={1:#04x} }}")]
    CrcMismatch(u8, u8),
    /// Both the bit and its complement read as 1 during a ROM search
    #[error("ROM search collision at bit {0}")]
    SearchCollision(u8),
    /// Decoded temperature outside [-55.0, 125.0] °C, in decicelsius
    #[error("temperature out of range: {0}")]
    OutOfRange(i16),
    /// The register still holds its power-up value, no conversion happened
    #[error("sensor reports its power-on reset value")]
    PowerOnReset,
    #[error("unexpected family code {{ expected={0:#04x}, found={1:#04x} }}")]
    FamilyCodeMismatch(u8, u8),
    #[error("port error: {0:?}")]
    Port(E),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No device answered or the line is unusable
    Bus,
    /// Corrupted data on a live bus
    Data,
    /// Physically implausible reading
    Range,
    /// The pin or I²C peripheral itself failed
    Port,
}

impl<E: Sized + Debug> Error<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WireFault | Error::NoPresence | Error::BridgeTimeout | Error::BridgeReset => {
                ErrorKind::Bus
            }
            Error::CrcMismatch(..) | Error::SearchCollision(_) | Error::FamilyCodeMismatch(..) => {
                ErrorKind::Data
            }
            Error::OutOfRange(_) | Error::PowerOnReset => ErrorKind::Range,
            Error::Port(_) => ErrorKind::Port,
        }
    }
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Port(e)
    }
}
