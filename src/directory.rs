//! Bounded list of the sensors the controller works with.

use crate::{Address, BusTransport, DeviceSearch, Error, ErrorKind};
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};

/// Most sensors a directory holds; the search stops once it is full
pub const MAX_SENSORS: usize = 4;
/// Most family codes a search can filter for
pub const MAX_FAMILIES: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    addresses: Vec<Address, MAX_SENSORS>,
    /// Per accepted family, in the order the caller listed them
    counts: Vec<(u8, u8), MAX_FAMILIES>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the directory from manually assigned slots. Slots are taken in
    /// order up to the first unassigned one.
    pub fn from_assigned(slots: &[Address]) -> Self {
        let mut directory = Directory::new();
        for address in slots.iter().take_while(|a| !a.is_unassigned()) {
            if directory.addresses.push(*address).is_err() {
                break;
            }
            directory.count(address.family_code());
        }
        directory
    }

    /// Enumerates the bus and keeps the devices whose family code is listed
    /// in `families`, in discovery order.
    ///
    /// Devices of other families are skipped without taking a slot. A
    /// collision ends the enumeration early with whatever was found so far;
    /// an empty bus gives an empty directory. Only port-level failures, a
    /// stuck line or an unresponsive bridge are returned as errors.
    pub fn search<B: BusTransport>(
        bus: &mut B,
        delay: &mut impl DelayNs,
        families: &[u8],
    ) -> Result<Self, Error<B::Error>> {
        let mut directory = Directory::new();
        for family in families.iter().take(MAX_FAMILIES) {
            // capacity is MAX_FAMILIES, take() keeps us inside it
            let _ = directory.counts.push((*family, 0));
        }

        let mut search = DeviceSearch::new();
        while !directory.is_full() {
            let address = match search.search_next(bus, delay) {
                Ok(Some(address)) => address,
                Ok(None) => break,
                Err(error) if error.kind() == ErrorKind::Data => {
                    warn!("device search aborted: {}", error);
                    break;
                }
                Err(error) => return Err(error),
            };

            if !address.is_valid() {
                warn!("discarding device {} with bad ROM CRC", address);
                continue;
            }

            let Some(slot) = directory
                .counts
                .iter_mut()
                .find(|(family, _)| *family == address.family_code())
            else {
                debug!("skipping device {} of family {:#04x}", address, address.family_code());
                continue;
            };
            slot.1 += 1;
            // is_full() was checked above
            let _ = directory.addresses.push(address);
            debug!("found device {}", address);
        }

        info!("found {} of {} maximum sensors", directory.len(), MAX_SENSORS);
        Ok(directory)
    }

    fn count(&mut self, family: u8) {
        if let Some(slot) = self.counts.iter_mut().find(|(f, _)| *f == family) {
            slot.1 += 1;
        } else {
            let _ = self.counts.push((family, 1));
        }
    }

    /// How many devices of `family` were accepted.
    pub fn count_for(&self, family: u8) -> u8 {
        self.counts
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.addresses.is_full()
    }

    pub fn get(&self, index: usize) -> Option<&Address> {
        self.addresses.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.addresses
    }
}
