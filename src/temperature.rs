use core::fmt::{Display, Formatter, Result as FmtResult};

/// Temperature in tenths of a degree Celsius.
///
/// Only values a DS18B20 can physically report, -55.0 °C to +125.0 °C,
/// can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temperature(i16);

impl Temperature {
    pub const MIN: Temperature = Temperature(-550);
    pub const MAX: Temperature = Temperature(1250);

    pub const fn from_decicelsius(decicelsius: i16) -> Option<Self> {
        if decicelsius < Self::MIN.0 || decicelsius > Self::MAX.0 {
            None
        } else {
            Some(Temperature(decicelsius))
        }
    }

    pub const fn decicelsius(self) -> i16 {
        self.0
    }
}

impl Display for Temperature {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, abs / 10, abs % 10)
    }
}
