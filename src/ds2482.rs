//! DS2482-100 I²C to 1-Wire bridge.
//!
//! The bridge generates all slot timing itself, so the host only issues
//! commands and polls the status register. Every poll is bounded; a chip
//! that stays busy is reported as [`Error::BridgeTimeout`].

use crate::{BusTransport, Error, Triplet};
use embedded_hal::{delay::DelayNs, i2c::I2c};

/// 7-bit bus address with both AD pins low
pub const DEFAULT_ADDRESS: u8 = 0x18;

/// Upper bound on status reads while waiting for the bridge
pub const MAX_BUSY_POLLS: u16 = 200;
const POLL_INTERVAL_US: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum BridgeCommand {
    DeviceReset = 0xF0,
    SetReadPointer = 0xE1,
    WriteConfiguration = 0xD2,
    OneWireReset = 0xB4,
    OneWireSingleBit = 0x87,
    OneWireWriteByte = 0xA5,
    OneWireReadByte = 0x96,
    OneWireTriplet = 0x78,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    Status = 0xF0,
    ReadData = 0xE1,
}

mod flag {
    pub const BUSY: u8 = 0x01;
    pub const PRESENCE: u8 = 0x02;
    pub const SHORT: u8 = 0x04;
    pub const DEVICE_RESET: u8 = 0x10;
    pub const SINGLE_BIT: u8 = 0x20;
    pub const TRIPLET_SECOND_BIT: u8 = 0x40;
    pub const BRANCH_DIRECTION: u8 = 0x80;
}

/// Active pull-up, standard speed, no strong pull-up.
const CONFIG_ACTIVE_PULLUP: u8 = 0x01;
/// Bit-pattern selector for single-bit and triplet commands
const BIT_ONE: u8 = 0x80;

pub struct Ds2482<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Ds2482<I> {
    pub fn new(i2c: I) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I {
        self.i2c
    }

    /// Resets the bridge and enables the active pull-up.
    pub fn init(&mut self) -> Result<(), Error<I::Error>> {
        self.command(BridgeCommand::DeviceReset, None)?;
        if self.read_register(Register::Status)? & flag::DEVICE_RESET == 0 {
            return Err(Error::BridgeReset);
        }
        // upper nibble carries the one's complement of the lower one
        let config = CONFIG_ACTIVE_PULLUP;
        self.command(
            BridgeCommand::WriteConfiguration,
            Some((config & 0x0F) | (!config << 4)),
        )
    }

    fn command(
        &mut self,
        command: BridgeCommand,
        payload: Option<u8>,
    ) -> Result<(), Error<I::Error>> {
        match payload {
            Some(payload) => self.i2c.write(self.address, &[command as u8, payload])?,
            None => self.i2c.write(self.address, &[command as u8])?,
        }
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u8, Error<I::Error>> {
        let mut value = [0u8];
        self.i2c.write_read(
            self.address,
            &[BridgeCommand::SetReadPointer as u8, register as u8],
            &mut value,
        )?;
        Ok(value[0])
    }

    /// Status register once the 1-Wire side is idle.
    fn wait_idle(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<I::Error>> {
        for _ in 0..MAX_BUSY_POLLS {
            let status = self.read_register(Register::Status)?;
            if status & flag::BUSY == 0 {
                return Ok(status);
            }
            delay.delay_us(POLL_INTERVAL_US);
        }
        Err(Error::BridgeTimeout)
    }

    fn run(
        &mut self,
        delay: &mut impl DelayNs,
        command: BridgeCommand,
        payload: Option<u8>,
    ) -> Result<u8, Error<I::Error>> {
        self.wait_idle(delay)?;
        self.command(command, payload)?;
        self.wait_idle(delay)
    }
}

impl<I: I2c> BusTransport for Ds2482<I> {
    type Error = I::Error;

    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<I::Error>> {
        let status = self.run(delay, BridgeCommand::OneWireReset, None)?;
        if status & flag::SHORT != 0 {
            Err(Error::WireFault)
        } else if status & flag::PRESENCE == 0 {
            Err(Error::NoPresence)
        } else {
            Ok(())
        }
    }

    fn exchange_bit(
        &mut self,
        delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<I::Error>> {
        let pattern = if bit { BIT_ONE } else { 0 };
        let status = self.run(delay, BridgeCommand::OneWireSingleBit, Some(pattern))?;
        Ok(status & flag::SINGLE_BIT != 0)
    }

    fn read_byte(&mut self, delay: &mut impl DelayNs) -> Result<u8, Error<I::Error>> {
        self.run(delay, BridgeCommand::OneWireReadByte, None)?;
        self.read_register(Register::ReadData)
    }

    fn write_byte(&mut self, delay: &mut impl DelayNs, byte: u8) -> Result<(), Error<I::Error>> {
        self.run(delay, BridgeCommand::OneWireWriteByte, Some(byte))
            .map(|_| ())
    }

    fn triplet(
        &mut self,
        delay: &mut impl DelayNs,
        direction: bool,
    ) -> Result<Triplet, Error<I::Error>> {
        let pattern = if direction { BIT_ONE } else { 0 };
        let status = self.run(delay, BridgeCommand::OneWireTriplet, Some(pattern))?;
        Ok(Triplet {
            id_bit: status & flag::SINGLE_BIT != 0,
            complement: status & flag::TRIPLET_SECOND_BIT != 0,
            direction: status & flag::BRANCH_DIRECTION != 0,
        })
    }
}
