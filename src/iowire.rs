use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// The open-drain data line as seen by the bit-bang master.
///
/// `release` must let the pull-up take the line high rather than actively
/// driving it, otherwise slaves cannot answer.
pub trait IoWire {
    type Error: Error;

    /// Samples the line.
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }

    /// Pulls the line low.
    fn pull_low(&mut self) -> Result<(), Self::Error>;

    /// Lets go of the line.
    fn release(&mut self) -> Result<(), Self::Error>;
}

/// A single open-drain pin that can be read back while released.
impl<IO> IoWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }
}

/// Separate sense input and drive output, e.g. an input pin plus a
/// transistor that pulls the bus down.
impl<E, I, O> IoWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }
}

/// Inverted wire wrapper, for drivers with an inverting transistor stage
pub struct Inverted<P>(pub P);

impl<I: ErrorType> ErrorType for Inverted<I> {
    type Error = I::Error;
}

impl<I> InputPin for Inverted<I>
where
    I: InputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O> OutputPin for Inverted<O>
where
    O: OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}
