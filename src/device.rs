use crate::{Address, BusTransport, DeviceSearch, Error};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Generic device interface
pub trait Device: Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Get device address
    fn address(&self) -> &Address;

    /// Wraps an address without looking at its family code.
    fn from_address_unchecked(address: Address) -> Self;

    /// Instantiate device from address
    fn from_address<E: Sized + Debug>(address: Address) -> Result<Self, Error<E>> {
        if address.family_code() != Self::FAMILY_CODE {
            Err(Error::FamilyCodeMismatch(
                Self::FAMILY_CODE,
                address.family_code(),
            ))
        } else {
            Ok(Self::from_address_unchecked(address))
        }
    }

    /// First device of this family in search order.
    fn search_first<B: BusTransport>(
        bus: &mut B,
        delay: &mut impl DelayNs,
    ) -> Result<Option<Self>, Error<B::Error>> {
        let mut search = DeviceSearch::new();
        while let Some(address) = search.search_next(bus, delay)? {
            if address.family_code() == Self::FAMILY_CODE && address.is_valid() {
                return Ok(Some(Self::from_address_unchecked(address)));
            }
        }
        Ok(None)
    }
}
