use core::fmt::Debug;
use embedded_hal::pwm::SetDutyCycle;

/// Fan outputs addressed by channel number.
pub trait DutyOutput {
    type Error: Debug;

    fn channels(&self) -> usize;

    /// Sets `channel` to `percent` (0 to 100) of full duty. Unknown channels
    /// are ignored.
    fn set_duty(&mut self, channel: usize, percent: u8) -> Result<(), Self::Error>;
}

impl<P: SetDutyCycle, const N: usize> DutyOutput for [P; N] {
    type Error = P::Error;

    fn channels(&self) -> usize {
        N
    }

    fn set_duty(&mut self, channel: usize, percent: u8) -> Result<(), P::Error> {
        match self.get_mut(channel) {
            Some(pin) => pin.set_duty_cycle_percent(percent.min(100)),
            None => Ok(()),
        }
    }
}
