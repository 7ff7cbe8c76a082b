//! Persistent configuration record.
//!
//! Layout, little endian:
//!
//! | offset | size | field                                    |
//! |--------|------|------------------------------------------|
//! | 0      | 2    | magic `0x4644`                           |
//! | 2      | 1    | number of zones                          |
//! | 3      | 30   | two zone slots, 15 bytes each            |
//! | 33     | 1    | sensor assignment, 0 search / 1 manual   |
//! | 34     | 32   | four manually assigned ROM codes         |
//! | 66     | 1    | CRC-8 over all preceding bytes           |

use crate::directory::MAX_SENSORS;
use crate::zone::{ZoneConfig, MAX_FANS};
use crate::Address;
use byteorder::{ByteOrder, LittleEndian};
use core::fmt::Debug;
use heapless::Vec;
use log::info;
use thiserror::Error;

pub const CONFIG_MAGIC: u16 = 0x4644;
/// Most bytes the storage backend can hold
pub const MAX_RECORD_SIZE: usize = 256;
pub const MAX_ZONES: usize = 2;

const ZONE_RECORD_SIZE: usize = 15;
const ZONES_OFFSET: usize = 3;
const ASSIGNMENT_OFFSET: usize = ZONES_OFFSET + MAX_ZONES * ZONE_RECORD_SIZE;
const SENSORS_OFFSET: usize = ASSIGNMENT_OFFSET + 1;
const CRC_OFFSET: usize = SENSORS_OFFSET + MAX_SENSORS * Address::BYTES as usize;

pub const RECORD_SIZE: usize = CRC_OFFSET + 1;

const _: () = assert!(RECORD_SIZE <= MAX_RECORD_SIZE);

/// How the sensor directory is filled at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assignment {
    /// Enumerate the bus
    #[default]
    Search,
    /// Use the stored ROM codes, in slot order
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub zones: Vec<ZoneConfig, MAX_ZONES>,
    pub assignment: Assignment,
    /// Manual assignment table; slots after the first unassigned one are ignored
    pub sensors: [Address; MAX_SENSORS],
}

impl Default for Configuration {
    /// A single zone on the first fan, fed by every sensor found.
    fn default() -> Self {
        let mut zones = Vec::new();
        let _ = zones.push(ZoneConfig::default());
        Configuration {
            zones,
            assignment: Assignment::Search,
            sensors: [Address::default(); MAX_SENSORS],
        }
    }
}

/// Why a stored record was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("bad magic {0:#06x}")]
    Magic(u16),
    #[error("checksum mismatch")]
    Checksum,
    #[error("unsupported zone count {0}")]
    ZoneCount(u8),
    #[error("zone {0} thresholds inconsistent")]
    Zone(u8),
    #[error("zones share a fan channel")]
    SharedFan,
    #[error("unknown sensor assignment {0}")]
    Assignment(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError<E: Sized + Debug> {
    /// The record does not fit the storage. Not recoverable at runtime.
    #[error("configuration record of {size} bytes exceeds storage of {capacity}")]
    Oversize { size: usize, capacity: usize },
    #[error("storage error: {0:?}")]
    Storage(E),
}

impl<E: Sized + Debug> From<E> for ConfigError<E> {
    fn from(e: E) -> Self {
        ConfigError::Storage(e)
    }
}

/// Whether [`Configuration::load`] found a usable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Defaults were loaded and written back
    Defaulted,
}

/// Byte-addressed non-volatile memory holding the record at offset 0.
pub trait ConfigStorage {
    type Error: Debug;

    fn capacity(&self) -> usize;

    fn read_config(&mut self, record: &mut [u8]) -> Result<(), Self::Error>;

    fn write_config(&mut self, record: &[u8]) -> Result<(), Self::Error>;
}

impl Configuration {
    /// Two independent zones, sensor 1 on fan 1 and sensor 2 on fan 2. A
    /// lone sensor feeds both.
    pub fn dual_zone() -> Self {
        let mut config = Configuration::default();
        config.zones.clear();
        for channel in 0..MAX_ZONES {
            let _ = config.zones.push(ZoneConfig {
                fans: 1 << channel,
                sensors: 1 << channel,
                ..Default::default()
            });
        }
        config
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        if self.zones.is_empty() {
            return Err(RecordError::ZoneCount(0));
        }
        let mut used = 0u8;
        for (index, zone) in self.zones.iter().enumerate() {
            if !zone.is_valid() {
                return Err(RecordError::Zone(index as u8));
            }
            if used & zone.fans != 0 {
                return Err(RecordError::SharedFan);
            }
            used |= zone.fans;
        }
        Ok(())
    }

    /// Fan channels no zone drives.
    pub fn idle_fans(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_FANS).filter(move |channel| !self.zones.iter().any(|zone| zone.drives(*channel)))
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        LittleEndian::write_u16(&mut record[0..2], CONFIG_MAGIC);
        record[2] = self.zones.len() as u8;

        for (zone, slot) in self
            .zones
            .iter()
            .zip(record[ZONES_OFFSET..ASSIGNMENT_OFFSET].chunks_exact_mut(ZONE_RECORD_SIZE))
        {
            encode_zone(zone, slot);
        }

        record[ASSIGNMENT_OFFSET] = match self.assignment {
            Assignment::Search => 0,
            Assignment::Manual => 1,
        };
        for (address, slot) in self
            .sensors
            .iter()
            .zip(record[SENSORS_OFFSET..CRC_OFFSET].chunks_exact_mut(Address::BYTES as usize))
        {
            slot.copy_from_slice(address.as_ref());
        }

        record[CRC_OFFSET] = crate::crc8(&record[..CRC_OFFSET]);
        record
    }

    pub fn decode(record: &[u8; RECORD_SIZE]) -> Result<Self, RecordError> {
        let magic = LittleEndian::read_u16(&record[0..2]);
        if magic != CONFIG_MAGIC {
            return Err(RecordError::Magic(magic));
        }
        if !crate::check_crc8(record) {
            return Err(RecordError::Checksum);
        }

        let count = record[2];
        if count == 0 || usize::from(count) > MAX_ZONES {
            return Err(RecordError::ZoneCount(count));
        }
        let zones = record[ZONES_OFFSET..ASSIGNMENT_OFFSET]
            .chunks_exact(ZONE_RECORD_SIZE)
            .take(usize::from(count))
            .map(decode_zone)
            .collect();

        let assignment = match record[ASSIGNMENT_OFFSET] {
            0 => Assignment::Search,
            1 => Assignment::Manual,
            other => return Err(RecordError::Assignment(other)),
        };

        let mut sensors = [Address::default(); MAX_SENSORS];
        for (address, slot) in sensors
            .iter_mut()
            .zip(record[SENSORS_OFFSET..CRC_OFFSET].chunks_exact(Address::BYTES as usize))
        {
            let mut raw = [0u8; Address::BYTES as usize];
            raw.copy_from_slice(slot);
            *address = Address::from(raw);
        }

        let config = Configuration {
            zones,
            assignment,
            sensors,
        };
        config.validate()?;
        Ok(config)
    }

    fn check_capacity<S: ConfigStorage>(storage: &S) -> Result<(), ConfigError<S::Error>> {
        if storage.capacity() < RECORD_SIZE {
            return Err(ConfigError::Oversize {
                size: RECORD_SIZE,
                capacity: storage.capacity(),
            });
        }
        Ok(())
    }

    /// Reads the stored record. Anything unusable is replaced by the
    /// defaults, which are persisted right away.
    pub fn load<S: ConfigStorage>(
        storage: &mut S,
    ) -> Result<(Configuration, LoadOutcome), ConfigError<S::Error>> {
        Self::check_capacity(storage)?;
        let mut record = [0u8; RECORD_SIZE];
        storage.read_config(&mut record)?;

        match Configuration::decode(&record) {
            Ok(config) => Ok((config, LoadOutcome::Loaded)),
            Err(reason) => {
                info!("stored configuration rejected ({}), loading defaults", reason);
                let config = Configuration::default();
                config.save(storage)?;
                Ok((config, LoadOutcome::Defaulted))
            }
        }
    }

    pub fn save<S: ConfigStorage>(&self, storage: &mut S) -> Result<(), ConfigError<S::Error>> {
        Self::check_capacity(storage)?;
        storage.write_config(&self.encode())?;
        Ok(())
    }
}

fn encode_zone(zone: &ZoneConfig, slot: &mut [u8]) {
    slot[0] = zone.fans;
    slot[1] = zone.sensors;
    slot[2] = zone.pct_max;
    slot[3] = zone.pct_min;
    slot[4] = zone.pct_start;
    LittleEndian::write_u16(&mut slot[5..7], zone.min_rpm);
    slot[7] = zone.min_off as u8;
    slot[8] = zone.min_sensors;
    LittleEndian::write_i16(&mut slot[9..11], zone.temp_min);
    LittleEndian::write_i16(&mut slot[11..13], zone.temp_max);
    LittleEndian::write_u16(&mut slot[13..15], zone.hysteresis);
}

fn decode_zone(slot: &[u8]) -> ZoneConfig {
    ZoneConfig {
        fans: slot[0],
        sensors: slot[1],
        pct_max: slot[2],
        pct_min: slot[3],
        pct_start: slot[4],
        min_rpm: LittleEndian::read_u16(&slot[5..7]),
        min_off: slot[7] != 0,
        min_sensors: slot[8],
        temp_min: LittleEndian::read_i16(&slot[9..11]),
        temp_max: LittleEndian::read_i16(&slot[11..13]),
        hysteresis: LittleEndian::read_u16(&slot[13..15]),
    }
}
