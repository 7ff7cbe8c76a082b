use crate::{Address, Command, Error, OpCode};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Outcome of one ROM search step: the bit, its complement, and the
/// direction that was written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triplet {
    pub id_bit: bool,
    pub complement: bool,
    pub direction: bool,
}

impl Triplet {
    /// Devices answered with both 0 and 1 at this position.
    pub fn is_discrepancy(&self) -> bool {
        !self.id_bit && !self.complement
    }

    /// Nobody pulled the line during either read slot.
    pub fn is_collision(&self) -> bool {
        self.id_bit && self.complement
    }
}

/// Logical 1-Wire master operations.
///
/// Implemented once by bit-banging a GPIO line and once by a DS2482 bridge
/// over I²C. Everything above this trait is backend agnostic and reaches it
/// through static dispatch only.
///
/// Timing faults are not detected here. A slot that was stretched by
/// something outside the master's control silently corrupts bits, which the
/// CRC checks further up catch.
pub trait BusTransport {
    type Error: Debug;

    /// Reset pulse followed by presence detection.
    ///
    /// `Err(NoPresence)` if no device answered, `Err(WireFault)` if the
    /// line is held low.
    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<Self::Error>>;

    /// Exchanges a single time slot. Writing `true` doubles as a read slot.
    fn exchange_bit(
        &mut self,
        delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<Self::Error>>;

    /// Like [`reset`](Self::reset), with a missing presence pulse reported as
    /// `Ok(false)` instead of an error.
    fn reset_presence(&mut self, delay: &mut impl DelayNs) -> Result<bool, Error<Self::Error>> {
        match self.reset(delay) {
            Ok(()) => Ok(true),
            Err(Error::NoPresence) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Eight slots, LSB first.
    fn exchange_byte(
        &mut self,
        delay: &mut impl DelayNs,
        byte: u8,
    ) -> Result<u8, Error<Self::Error>> {
        let mut out = byte;
        let mut read = 0_u8;
        for _ in 0..8 {
            read >>= 1;
            if self.exchange_bit(delay, out & 0x01 == 0x01)? {
                read |= 0x80;
            }
            out >>= 1;
        }
        Ok(read)
    }

    fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<Self::Error>> {
        self.exchange_byte(delay, 0xFF)
    }

    fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), Error<Self::Error>> {
        self.exchange_byte(delay, byte).map(|_| ())
    }

    fn read_bytes(
        &mut self,
        delay: &mut impl DelayNs,
        dst: &mut [u8],
    ) -> Result<(), Error<Self::Error>> {
        for d in dst {
            *d = self.read_byte(delay)?;
        }
        Ok(())
    }

    fn write_bytes(
        &mut self,
        delay: &mut impl DelayNs,
        bytes: &[u8],
    ) -> Result<(), Error<Self::Error>> {
        for b in bytes {
            self.write_byte(delay, *b)?;
        }
        Ok(())
    }

    /// One ROM search step: read the bit and its complement, then write the
    /// direction to follow. Where all devices agree their bit wins over
    /// `direction`.
    fn triplet(
        &mut self,
        delay: &mut impl DelayNs,
        direction: bool,
    ) -> Result<Triplet, Error<Self::Error>> {
        let id_bit = self.exchange_bit(delay, true)?;
        let complement = self.exchange_bit(delay, true)?;
        let direction = match (id_bit, complement) {
            (false, false) => direction,
            (bit, _) => bit,
        };
        if !(id_bit && complement) {
            self.exchange_bit(delay, direction)?;
        }
        Ok(Triplet {
            id_bit,
            complement,
            direction,
        })
    }

    /// Reset, then address a single device, or every device with `None`.
    fn select(
        &mut self,
        delay: &mut impl DelayNs,
        address: Option<&Address>,
    ) -> Result<(), Error<Self::Error>> {
        self.reset(delay)?;
        match address {
            Some(address) => {
                self.write_byte(delay, Command::MatchRom.op_code())?;
                self.write_bytes(delay, address.as_ref())
            }
            None => self.write_byte(delay, Command::SkipRom.op_code()),
        }
    }
}
