//! Bit-level model of a 1-Wire bus with any number of slaves, for tests.
//!
//! Slaves follow the ROM command layer (search, match, skip) and answer
//! DS18B20 function commands. The line is a wired AND of the master's
//! written bit and every participating slave's output.

use crate::{crc8, Address, BusTransport, Error};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use std::vec::Vec;

#[derive(Debug, Clone)]
pub(crate) struct SimDevice {
    pub rom: Address,
    pub scratchpad: [u8; 9],
    /// Answers the presence pulse and participates in searches
    pub responsive: bool,
    /// Takes part in alarm searches
    pub alarm: bool,
    /// Scratchpad the next conversion latches
    pending: Option<[u8; 9]>,
}

impl SimDevice {
    pub fn new(family: u8, serial: [u8; 6]) -> Self {
        let mut raw = [0u8; 8];
        raw[0] = family;
        raw[1..7].copy_from_slice(&serial);
        raw[7] = crc8(&raw[..7]);
        SimDevice {
            rom: Address::from(raw),
            scratchpad: scratchpad(0x0550, 0x7F),
            responsive: true,
            alarm: false,
            pending: None,
        }
    }

    pub fn ds18b20(serial: [u8; 6]) -> Self {
        Self::new(0x28, serial)
    }

    pub fn with_reading(mut self, raw: u16, config: u8) -> Self {
        self.scratchpad = scratchpad(raw, config);
        self
    }

    /// Reading that shows up after the next Convert T.
    pub fn set_reading(&mut self, raw: u16, config: u8) {
        self.pending = Some(scratchpad(raw, config));
    }
}

/// A scratchpad with a correct CRC and datasheet power-up filler bytes.
pub(crate) fn scratchpad(raw: u16, config: u8) -> [u8; 9] {
    let [lsb, msb] = raw.to_le_bytes();
    let mut sp = [lsb, msb, 0x4B, 0x46, config, 0xFF, 0x0C, 0x10, 0x00];
    sp[8] = crc8(&sp[..8]);
    sp
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    RomCommand { value: u8, count: u8 },
    FunctionCommand { value: u8, count: u8 },
    Search { bit: u8, step: u8 },
    Match { bit: u8 },
    ReadRom { bit: u8 },
    ReadScratchpad { pos: u16 },
}

pub(crate) struct SimBus {
    pub devices: Vec<SimDevice>,
    active: Vec<bool>,
    phase: Phase,
    /// One-shot: answer (1,1) at this search bit
    pub collide_at: Option<u8>,
    pub resets: usize,
    pub conversions: Vec<Address>,
    pub line_stuck: bool,
    /// One-shot: the next reset sees no presence pulse
    pub fail_next_reset: bool,
}

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        SimBus {
            active: std::vec![false; devices.len()],
            devices,
            phase: Phase::Idle,
            collide_at: None,
            resets: 0,
            conversions: Vec::new(),
            line_stuck: false,
            fail_next_reset: false,
        }
    }

    fn wired_and(&self, out: bool, slave_bit: impl Fn(&SimDevice) -> bool) -> bool {
        out && self
            .devices
            .iter()
            .zip(self.active.iter())
            .filter(|(_, active)| **active)
            .all(|(device, _)| slave_bit(device))
    }

    fn rom_command(&mut self, command: u8) {
        self.phase = match command {
            0xF0 => Phase::Search { bit: 0, step: 0 },
            0xEC => {
                for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
                    *active &= device.alarm;
                }
                Phase::Search { bit: 0, step: 0 }
            }
            0x55 => Phase::Match { bit: 0 },
            0x33 => Phase::ReadRom { bit: 0 },
            0xCC => Phase::FunctionCommand { value: 0, count: 0 },
            _ => Phase::Idle,
        };
    }

    fn function_command(&mut self, command: u8) {
        self.phase = match command {
            0x44 => {
                for (device, active) in self.devices.iter_mut().zip(self.active.iter()) {
                    if *active {
                        if let Some(latched) = device.pending.take() {
                            device.scratchpad = latched;
                        }
                        self.conversions.push(device.rom);
                    }
                }
                Phase::Idle
            }
            0xBE => Phase::ReadScratchpad { pos: 0 },
            _ => Phase::Idle,
        };
    }
}

impl BusTransport for SimBus {
    type Error = Infallible;

    fn reset(&mut self, _delay: &mut impl DelayNs) -> Result<(), Error<Infallible>> {
        self.resets += 1;
        if core::mem::take(&mut self.fail_next_reset) {
            return Err(Error::NoPresence);
        }
        if self.line_stuck {
            return Err(Error::WireFault);
        }
        for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
            *active = device.responsive;
        }
        self.phase = Phase::RomCommand { value: 0, count: 0 };
        if self.active.iter().any(|a| *a) {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    fn exchange_bit(
        &mut self,
        _delay: &mut impl DelayNs,
        out: bool,
    ) -> Result<bool, Error<Infallible>> {
        let line = match self.phase {
            Phase::Idle => out,
            Phase::RomCommand { value, count } | Phase::FunctionCommand { value, count } => {
                let value = value | ((out as u8) << count);
                let count = count + 1;
                let rom_stage = matches!(self.phase, Phase::RomCommand { .. });
                if count == 8 {
                    if rom_stage {
                        self.rom_command(value);
                    } else {
                        self.function_command(value);
                    }
                } else if rom_stage {
                    self.phase = Phase::RomCommand { value, count };
                } else {
                    self.phase = Phase::FunctionCommand { value, count };
                }
                out
            }
            Phase::Search { bit, step } => match step {
                0 | 1 if self.collide_at == Some(bit) => {
                    if step == 1 {
                        self.collide_at = None;
                        self.phase = Phase::Idle;
                    } else {
                        self.phase = Phase::Search { bit, step: 1 };
                    }
                    out
                }
                0 => {
                    self.phase = Phase::Search { bit, step: 1 };
                    self.wired_and(out, |d| d.rom.bit(bit))
                }
                1 => {
                    self.phase = Phase::Search { bit, step: 2 };
                    self.wired_and(out, |d| !d.rom.bit(bit))
                }
                _ => {
                    for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        if device.rom.bit(bit) != out {
                            *active = false;
                        }
                    }
                    self.phase = if bit + 1 == Address::BITS {
                        Phase::Idle
                    } else {
                        Phase::Search {
                            bit: bit + 1,
                            step: 0,
                        }
                    };
                    out
                }
            },
            Phase::Match { bit } => {
                for (device, active) in self.devices.iter().zip(self.active.iter_mut()) {
                    if device.rom.bit(bit) != out {
                        *active = false;
                    }
                }
                self.phase = if bit + 1 == Address::BITS {
                    Phase::FunctionCommand { value: 0, count: 0 }
                } else {
                    Phase::Match { bit: bit + 1 }
                };
                out
            }
            Phase::ReadRom { bit } => {
                self.phase = if bit + 1 == Address::BITS {
                    Phase::FunctionCommand { value: 0, count: 0 }
                } else {
                    Phase::ReadRom { bit: bit + 1 }
                };
                self.wired_and(out, |d| d.rom.bit(bit))
            }
            Phase::ReadScratchpad { pos } => {
                let byte = (pos / 8) as usize;
                let mask = 1 << (pos % 8);
                self.phase = Phase::ReadScratchpad { pos: pos + 1 };
                if byte < 9 {
                    self.wired_and(out, |d| d.scratchpad[byte] & mask != 0)
                } else {
                    out
                }
            }
        };
        Ok(line)
    }
}

/// Delay provider that only accumulates the requested time.
#[derive(Default)]
pub(crate) struct NoDelay {
    pub elapsed_ns: u64,
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }
}
