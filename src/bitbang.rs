//! 1-Wire master that bit-bangs a single GPIO line.
//!
//! Slot timings are standard speed and assume the delay provider is
//! accurate to about a microsecond. Interrupts are masked only around the
//! sampling windows, through [`critical_section::with`], which restores
//! whatever interrupt state was active on entry.

use crate::{BusTransport, Error, IoWire};
use embedded_hal::delay::DelayNs;

/// Reset pulse length
const RESET_LOW_US: u32 = 480;
/// Presence is sampled this long after the reset pulse ends
const PRESENCE_SAMPLE_US: u32 = 64;
/// Rest of the presence window, after which slaves have released the line
const PRESENCE_TAIL_US: u32 = RESET_LOW_US - PRESENCE_SAMPLE_US;
/// Slot start, must exceed 1 µs
const SLOT_START_US: u32 = 2;
/// Slave data is valid for 15 µs after the falling edge
const SLOT_SAMPLE_US: u32 = 15 - SLOT_START_US;
const SLOT_TAIL_US: u32 = 60 - 15 - SLOT_START_US;
/// Minimum is 1 µs; longer lines need more
const RECOVERY_US: u32 = 20;
/// Number of 2 µs polls for the line to float high before a reset
const IDLE_POLLS: u8 = 125;

pub struct BitBang<W: IoWire> {
    wire: W,
}

impl<W: IoWire> BitBang<W> {
    pub fn new(wire: W) -> Self {
        BitBang { wire }
    }

    pub fn release(self) -> W {
        self.wire
    }

    /// The line should idle high through the pull-up. A line that stays low
    /// is shorted or has a slave stuck mid-slot.
    fn ensure_wire_high(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<W::Error>> {
        for _ in 0..IDLE_POLLS {
            if self.wire.is_high()? {
                return Ok(());
            }
            delay.delay_us(2);
        }
        Err(Error::WireFault)
    }
}

impl<W: IoWire> BusTransport for BitBang<W> {
    type Error = W::Error;

    fn reset(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<W::Error>> {
        self.wire.release()?;
        self.ensure_wire_high(delay)?;

        self.wire.pull_low()?;
        delay.delay_us(RESET_LOW_US);

        let presence = critical_section::with(|_| -> Result<bool, W::Error> {
            self.wire.release()?;
            delay.delay_us(PRESENCE_SAMPLE_US);
            self.wire.is_low()
        })?;

        delay.delay_us(PRESENCE_TAIL_US);
        if self.wire.is_low()? {
            // slaves had to let go by now
            return Err(Error::WireFault);
        }

        if presence {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    fn exchange_bit(
        &mut self,
        delay: &mut impl DelayNs,
        bit: bool,
    ) -> Result<bool, Error<W::Error>> {
        let sampled = critical_section::with(|_| -> Result<bool, W::Error> {
            self.wire.pull_low()?;
            delay.delay_us(SLOT_START_US);
            if bit {
                self.wire.release()?;
            }
            delay.delay_us(SLOT_SAMPLE_US);
            let sampled = bit && self.wire.is_high()?;
            delay.delay_us(SLOT_TAIL_US);
            self.wire.release()?;
            Ok(sampled)
        })?;
        delay.delay_us(RECOVERY_US);
        Ok(sampled)
    }
}
