//! Word level serial interfaces, plus the glue needed to print
//! through them with `ufmt`.
use core::str;
use nb;
use ufmt::{uDisplay, uWrite, Formatter};

/// UART read half
pub trait Read<Word> {
    type Error;

    /// Reads a single word
    fn read(&mut self) -> nb::Result<Word, Self::Error>;
}

/// UART write half
pub trait Write<Word> {
    type Error;

    /// Writes a single word
    fn write(&mut self, word: Word) -> nb::Result<(), Self::Error>;
}

/// Error state of a serial line. Corrupted characters still arrive
/// as data; the first fault is latched until taken.
pub trait LineStatus {
    type Fault;

    /// Returns and clears the latched fault, if any.
    fn take_fault(&mut self) -> Option<Self::Fault>;
}

impl<T: Read<W> + ?Sized, W> Read<W> for &mut T {
    type Error = T::Error;
    fn read(&mut self) -> nb::Result<W, Self::Error> { (**self).read() }
}

impl<T: Write<W> + ?Sized, W> Write<W> for &mut T {
    type Error = T::Error;
    fn write(&mut self, word: W) -> nb::Result<(), Self::Error> { (**self).write(word) }
}

impl<T: LineStatus + ?Sized> LineStatus for &mut T {
    type Fault = T::Fault;
    fn take_fault(&mut self) -> Option<Self::Fault> { (**self).take_fault() }
}

/// Blocking byte sink over a serial write half, so `ufmt` can
/// format straight onto the wire.
pub struct Console<'a, S: Write<u8> + ?Sized> {
    serial: &'a mut S,
}

impl<'a, S: Write<u8> + ?Sized> Console<'a, S> {
    pub fn new(serial: &'a mut S) -> Self { Self { serial } }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), S::Error> {
        for &byte in bytes {
            nb::block!(self.serial.write(byte))?;
        }
        Ok(())
    }
}

impl<'a, S: Write<u8> + ?Sized> uWrite for Console<'a, S> {
    type Error = S::Error;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> { self.write_bytes(s.as_bytes()) }
}

/// Zero padded hexadecimal rendering of a 32 bit word, as `0x0000abcd`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Hex(pub u32);

impl uDisplay for Hex {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut text = *b"0x00000000";
        for (i, digit) in text[2..].iter_mut().enumerate() {
            let nibble = (self.0 >> (28 - 4 * i)) & 0xF;
            *digit = DIGITS[nibble as usize];
        }
        // Only ASCII digits were written
        f.write_str(str::from_utf8(&text).unwrap_or("0x????????"))
    }
}

/// Prints to an abstract serial device
#[macro_export]
macro_rules! uprint {
    ($serial:expr, $($arg:tt)+) => {
        ufmt::uwrite!($crate::hal::serial::Console::new(&mut $serial), $($arg)+)
    };
}

/// Prints to an abstract serial device, ending the line with CR LF
/// so raw serial consoles return to the first column.
#[macro_export]
macro_rules! uprintln {
    ($serial:expr, $($arg:tt)+) => {{
        let mut console = $crate::hal::serial::Console::new(&mut $serial);
        ufmt::uwrite!(console, $($arg)+).and_then(|_| console.write_bytes(b"\r\n"))
    }};
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::doubles::serial::ScriptedSerial;

    #[test]
    fn uprint_leaves_the_line_open() {
        // Given
        let mut serial = ScriptedSerial::default();

        // When
        uprint!(serial, "R0 = {}", 7u32).unwrap();

        // Then
        assert_eq!(b"R0 = 7", &serial.outgoing[..]);
    }

    #[test]
    fn uprintln_terminates_the_line() {
        let mut serial = ScriptedSerial::default();
        uprintln!(serial, "Detected '{}'", "Raspberry Pi b").unwrap();
        assert_eq!(b"Detected 'Raspberry Pi b'\r\n", &serial.outgoing[..]);
    }

    #[test]
    fn console_forwards_raw_bytes() {
        let mut serial = ScriptedSerial::default();
        Console::new(&mut serial).write_bytes(&[0x03, 0x03, 0x03]).unwrap();
        assert_eq!(&[0x03, 0x03, 0x03], &serial.outgoing[..]);
    }

    #[test]
    fn hex_words_are_zero_padded() {
        let mut serial = ScriptedSerial::default();
        let mut reference = &mut serial;
        uprint!(reference, "{} {}", Hex(0x8000), Hex(0xDEAD_BEEF)).unwrap();
        assert_eq!(b"0x00008000 0xdeadbeef", &serial.outgoing[..]);
    }

    #[test]
    fn reading_through_a_mutable_reference() {
        let mut serial = ScriptedSerial::with_input(&[7]);
        let mut reference = &mut serial;
        assert!(matches!(Read::read(&mut reference), Ok(7)));
        assert!(matches!(Read::read(&mut reference), Err(nb::Error::Other(_))));
    }
}
