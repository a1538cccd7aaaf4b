//! Error type for the loader as a whole.
use crate::{hal::serial::Write, uprintln};
use core::convert::Infallible;

/// Top level error type for the loader. Unlike the specific
/// driver errors, this error contains textual descriptions of
/// the problem as it is meant to be directly reported through
/// the UART.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Error caused by a high level device
    DeviceError(&'static str),
    /// Corrupted character on the serial line
    LineError(&'static str),
    /// The loaded image returned control to the loader
    ImageReturned,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self { match never {} }
}

impl Error {
    /// Reports error via abstract serial device
    pub fn report<S: Write<u8>>(&self, mut serial: &mut S) {
        // A failure to report has nowhere else to go.
        let _ = match self {
            Error::DeviceError(text) => uprintln!(serial, "[Device Error] -> {}", *text),
            Error::LineError(text) => uprintln!(serial, "[Line Error] -> {}", *text),
            Error::ImageReturned => {
                uprintln!(serial, "[Logic Error] -> Loaded image returned to the loader")
            }
        };
    }
}
