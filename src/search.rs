use crate::{Address, BusTransport, Command, Error, OpCode};
use embedded_hal::delay::DelayNs;

/// Cursor of an enumeration of the devices on a bus.
///
/// Each [`search_next`](Self::search_next) call walks the implicit binary
/// trie of all ROM codes once, taking the 0 branch at fresh discrepancies
/// and remembering the deepest such branch point. The next call replays the
/// path up to that point and takes the 1 branch there, so devices come out
/// in ascending [`Address::search_key`] order, one bus transaction each.
#[derive(Debug, Clone, Default)]
pub struct DeviceSearch {
    rom: [u8; Address::BYTES as usize],
    /// Bit where the previous pass last went down the 0 branch; `None`
    /// before the first pass
    last_discrepancy: Option<u8>,
    finished: bool,
    alarmed_only: bool,
}

impl DeviceSearch {
    pub fn new() -> DeviceSearch {
        DeviceSearch::default()
    }

    /// Only devices with an active alarm flag take part.
    pub fn new_alarmed() -> DeviceSearch {
        DeviceSearch {
            alarmed_only: true,
            ..Default::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_discrepancy(&self) -> Option<u8> {
        self.last_discrepancy
    }

    /// Forget all progress; the next pass searches from scratch.
    pub fn restart(&mut self) {
        *self = DeviceSearch {
            alarmed_only: self.alarmed_only,
            ..Default::default()
        };
    }

    fn is_bit_set(&self, bit: u8) -> bool {
        self.rom[(bit / 8) as usize] & (0x01 << (bit % 8)) != 0x00
    }

    fn write_bit(&mut self, bit: u8, value: bool) {
        let index = (bit / 8) as usize;
        let mask = 0x01 << (bit % 8);
        if value {
            self.rom[index] |= mask;
        } else {
            self.rom[index] &= !mask;
        }
    }

    /// Finds the next device.
    ///
    /// `Ok(None)` once every device has been returned, or right away when
    /// nobody answers the reset. A [`SearchCollision`](Error::SearchCollision)
    /// abandons the pass and rewinds the cursor to a fresh search.
    pub fn search_next<B: BusTransport>(
        &mut self,
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Address>, Error<B::Error>> {
        if self.finished {
            return Ok(None);
        }

        if !bus.reset_presence(delay)? {
            self.restart();
            self.finished = true;
            return Ok(None);
        }

        let command = if self.alarmed_only {
            Command::SearchRomAlarmed
        } else {
            Command::SearchRom
        };
        bus.write_byte(delay, command.op_code())?;

        let mut last_zero = None;
        for bit in 0..Address::BITS {
            let direction = match self.last_discrepancy {
                // replay the previous path
                Some(last) if bit < last => self.is_bit_set(bit),
                // second visit of the deepest branch point
                Some(last) if bit == last => true,
                _ => false,
            };

            let triplet = match bus.triplet(delay, direction) {
                Ok(triplet) => triplet,
                Err(error) => {
                    self.restart();
                    return Err(error);
                }
            };

            if triplet.is_collision() {
                self.restart();
                return Err(Error::SearchCollision(bit));
            }

            if triplet.is_discrepancy() && !triplet.direction {
                last_zero = Some(bit);
            }
            self.write_bit(bit, triplet.direction);
        }

        self.last_discrepancy = last_zero;
        self.finished = last_zero.is_none();
        Ok(Some(Address::from(self.rom)))
    }

    pub fn into_iter<'a, B: BusTransport, D: DelayNs>(
        self,
        bus: &'a mut B,
        delay: &'a mut D,
    ) -> DeviceSearchIter<'a, B, D> {
        DeviceSearchIter {
            search: Some(self),
            bus,
            delay,
        }
    }
}

/// Iterator over [`DeviceSearch`] results. Ends after the first error.
pub struct DeviceSearchIter<'a, B: BusTransport, D: DelayNs> {
    search: Option<DeviceSearch>,
    bus: &'a mut B,
    delay: &'a mut D,
}

impl<B: BusTransport, D: DelayNs> Iterator for DeviceSearchIter<'_, B, D> {
    type Item = Result<Address, Error<B::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut search = self.search.take()?;
        let result = search
            .search_next(&mut *self.bus, &mut *self.delay)
            .transpose()?;
        if result.is_ok() {
            self.search = Some(search);
        }
        Some(result)
    }
}
