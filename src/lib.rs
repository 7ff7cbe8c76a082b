#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

mod address;
#[cfg(feature = "bitbang")]
pub mod bitbang;
mod command;
pub mod config;
pub mod controller;
mod device;
pub mod directory;
#[cfg(feature = "ds2482")]
pub mod ds2482;
pub mod ds18b20;
#[cfg(feature = "bitbang")]
mod iowire;
pub mod pwm;
mod result;
mod search;
#[cfg(test)]
mod sim;
pub mod tach;
mod temperature;
mod transport;
pub mod zone;

pub use address::{Address, AddressError};
#[cfg(feature = "bitbang")]
pub use bitbang::BitBang;
pub use command::{Command, OpCode};
pub use config::{ConfigError, ConfigStorage, Configuration, LoadOutcome};
pub use controller::Controller;
pub use device::Device;
pub use directory::Directory;
#[cfg(feature = "ds2482")]
pub use ds2482::Ds2482;
#[cfg(feature = "bitbang")]
pub use iowire::{Inverted, IoWire};
pub use pwm::DutyOutput;
pub use result::{Error, ErrorKind};
pub use search::{DeviceSearch, DeviceSearchIter};
pub use tach::Tachometer;
pub use temperature::Temperature;
pub use transport::{BusTransport, Triplet};

/// Dallas/Maxim CRC-8 (polynomial `X^8 + X^5 + X^4 + 1`, reflected `0x8C`),
/// continued from `crc`.
pub fn compute_partial_crc8(crc: u8, data: &[u8]) -> u8 {
    let mut crc = crc;
    for byte in data.iter() {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0x00 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

pub fn crc8(data: &[u8]) -> u8 {
    compute_partial_crc8(0, data)
}

/// True if `data` ends with a check byte matching the bytes before it.
pub fn check_crc8(data: &[u8]) -> bool {
    !data.is_empty() && crc8(data) == 0
}
