use crate::{BusTransport, Command, Error, OpCode};
use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Deref,
    str::FromStr,
};
use embedded_hal::delay::DelayNs;

/// 64-bit ROM code: family code, 48-bit serial number and CRC-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Address {
    raw: [u8; Self::BYTES as usize],
}

impl Default for Address {
    fn default() -> Self {
        Self::from([0; Self::BYTES as usize])
    }
}

impl From<[u8; Self::BYTES as usize]> for Address {
    fn from(raw: [u8; Self::BYTES as usize]) -> Self {
        Address { raw }
    }
}

impl From<Address> for [u8; Address::BYTES as usize] {
    fn from(addr: Address) -> [u8; Address::BYTES as usize] {
        addr.raw
    }
}

impl Deref for Address {
    type Target = [u8; Self::BYTES as usize];

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Address {
    /// The length of device address in bytes
    pub const BYTES: u8 = 8;

    /// The length of device address in bits
    pub const BITS: u8 = Self::BYTES * 8;

    pub fn family_code(&self) -> u8 {
        self.raw[0]
    }

    /// Whether the trailing CRC byte matches the family code and serial.
    pub fn is_valid(&self) -> bool {
        crate::crc8(&self.raw[..7]) == self.raw[7]
    }

    /// An all-zero family code marks an empty slot in the manual sensor table.
    pub fn is_unassigned(&self) -> bool {
        self.family_code() == 0x00
    }

    /// The address as seen by the ROM search: the first bit on the wire is
    /// the most significant. Search results come out in ascending key order.
    pub fn search_key(&self) -> u64 {
        u64::from_le_bytes(self.raw).reverse_bits()
    }

    pub(crate) fn bit(&self, bit: u8) -> bool {
        self.raw[(bit / 8) as usize] & (0x01 << (bit % 8)) != 0x00
    }
}

/// Error type
#[derive(Debug, PartialEq, Eq)]
pub enum AddressError {
    NotEnough,
    Invalid,
}

fn hex_to_u8(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut raw = [0u8; Self::BYTES as usize];
        let mut chars = s.chars().filter(|c| !c.is_whitespace() && *c != ':');

        for byte in raw.iter_mut() {
            match (chars.next(), chars.next()) {
                (Some(h), Some(l)) => match (hex_to_u8(h), hex_to_u8(l)) {
                    (Some(h), Some(l)) => {
                        *byte = (h << 4) | l;
                    }
                    _ => return Err(AddressError::Invalid),
                },
                _ => return Err(AddressError::NotEnough),
            }
        }

        if chars.next().is_some() {
            return Err(AddressError::Invalid);
        }

        Ok(Address::from(raw))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self[0], self[1], self[2], self[3], self[4], self[5], self[6], self[7],
        )
    }
}

impl Address {
    /// Reads the ROM code of the only device on the bus.
    pub fn read_single<B: BusTransport>(
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<B::Error>> {
        bus.reset(delay)?;
        bus.write_byte(delay, Command::ReadRom.op_code())?;
        let mut raw = [0u8; Self::BYTES as usize];
        bus.read_bytes(delay, &mut raw)?;
        let address = Address::from(raw);
        if !address.is_valid() {
            return Err(Error::CrcMismatch(crate::crc8(&raw[..7]), raw[7]));
        }
        Ok(address)
    }
}
