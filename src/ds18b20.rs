//! DS18B20 digital thermometer.

use crate::{Address, BusTransport, Device, Error, OpCode, Temperature};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

pub const FAMILY_CODE: u8 = 0x28;

/// Temperature register content after power-up (+85.0 °C), before any
/// conversion has completed
pub const POWER_ON_RESET_RAW: u16 = 0x0550;

/// Time the control loop waits between starting conversions and reading
/// them back; covers 12-bit resolution
pub const CONVERSION_WAIT_MS: u32 = 760;

#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    Convert = 0x44,
    ReadScratchpad = 0xBE,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}

/// Conversion resolution, bits 5 and 6 of the configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Nine,
    Ten,
    Eleven,
    Twelve,
}

impl Resolution {
    const MASK: u8 = 0b0110_0000;

    pub fn from_config(config: u8) -> Self {
        match (config & Self::MASK) >> 5 {
            0b00 => Resolution::Nine,
            0b01 => Resolution::Ten,
            0b10 => Resolution::Eleven,
            _ => Resolution::Twelve,
        }
    }

    pub fn time_ms(&self) -> u16 {
        match self {
            Resolution::Nine => 94,
            Resolution::Ten => 188,
            Resolution::Eleven => 375,
            Resolution::Twelve => 750,
        }
    }

    /// Low bits of the temperature register that carry no information.
    pub fn undefined_bits(&self) -> u16 {
        match self {
            Resolution::Nine => 0b111,
            Resolution::Ten => 0b11,
            Resolution::Eleven => 0b1,
            Resolution::Twelve => 0,
        }
    }
}

/// The nine scratchpad bytes, with a CRC that has already been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad {
    bytes: [u8; 9],
}

impl Scratchpad {
    pub fn from_bytes<E: Sized + Debug>(bytes: [u8; 9]) -> Result<Self, Error<E>> {
        // a slave holding the line low reads as zeros, CRC included
        if bytes.iter().all(|byte| *byte == 0) {
            return Err(Error::WireFault);
        }
        if !crate::check_crc8(&bytes) {
            return Err(Error::CrcMismatch(crate::crc8(&bytes[..8]), bytes[8]));
        }
        Ok(Scratchpad { bytes })
    }

    /// Temperature register, two's complement in 1/16 °C.
    pub fn raw(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn alarm_high(&self) -> i8 {
        self.bytes[2] as i8
    }

    pub fn alarm_low(&self) -> i8 {
        self.bytes[3] as i8
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.bytes[4])
    }

    pub fn temperature<E: Sized + Debug>(&self) -> Result<Temperature, Error<E>> {
        let raw = self.raw();
        if raw == POWER_ON_RESET_RAW {
            return Err(Error::PowerOnReset);
        }
        let decicelsius = raw_to_decicelsius(raw, self.resolution());
        i16::try_from(decicelsius)
            .ok()
            .and_then(Temperature::from_decicelsius)
            .ok_or(Error::OutOfRange(decicelsius.clamp(i16::MIN as i32, i16::MAX as i32) as i16))
    }
}

/// Converts the temperature register to decicelsius.
///
/// Works on the magnitude so that masking and truncation behave the same
/// on both sides of zero. Only non-negative values are rounded to the
/// nearest tenth (625/1000 = 640/1024), negative ones are truncated.
pub fn raw_to_decicelsius(raw: u16, resolution: Resolution) -> i32 {
    let negative = raw & 0x8000 != 0;
    let mut measure = if negative {
        (raw ^ 0xFFFF).wrapping_add(1)
    } else {
        raw
    };
    measure &= !resolution.undefined_bits();

    let mut fraction = u32::from(measure & 0x000F) * 640;
    if !negative {
        fraction += 512;
    }
    let decicelsius = i32::from(measure >> 4) * 10 + (fraction / 1024) as i32;

    if negative {
        -decicelsius
    } else {
        decicelsius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18b20 {
    address: Address,
}

impl From<Ds18b20> for Address {
    fn from(device: Ds18b20) -> Self {
        device.address
    }
}

impl Ds18b20 {
    /// Starts a conversion and returns immediately. The result is ready
    /// after [`Resolution::time_ms`].
    pub fn start_conversion<B: BusTransport>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error<B::Error>> {
        bus.select(delay, Some(&self.address))?;
        bus.write_byte(delay, Command::Convert.op_code())
    }

    pub fn read_scratchpad<B: BusTransport>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Scratchpad, Error<B::Error>> {
        bus.select(delay, Some(&self.address))?;
        bus.write_byte(delay, Command::ReadScratchpad.op_code())?;
        let mut bytes = [0u8; 9];
        bus.read_bytes(delay, &mut bytes)?;
        Scratchpad::from_bytes(bytes)
    }

    /// Reads back the last conversion. Any failure means the sensor is
    /// offline for this cycle.
    pub fn read_temperature<B: BusTransport>(
        &self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Temperature, Error<B::Error>> {
        self.read_scratchpad(bus, delay)?.temperature()
    }
}

impl Device for Ds18b20 {
    const FAMILY_CODE: u8 = FAMILY_CODE;

    fn address(&self) -> &Address {
        &self.address
    }

    fn from_address_unchecked(address: Address) -> Self {
        Self { address }
    }
}
