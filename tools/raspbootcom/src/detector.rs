//! Triple break detection on the device to terminal stream.
//!
//! Three ETX bytes in a row are the device asking for a kernel. Up to
//! two ETX bytes are held back while a run is building up. If a
//! different byte breaks the run they are released, followed by that
//! byte, so stray ETX bytes still reach the terminal.
use raspbootin_lib::protocol::{ETX, TRIGGER};
use std::{
    io::{self, Write},
    mem,
};

/// What to do with the byte just fed to the detector.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// The byte is an ETX and was held back.
    Hold,
    /// Forward the byte.
    Emit(u8),
    /// Forward `breaks` held ETX bytes, then the byte.
    Flush { breaks: usize, byte: u8 },
    /// A full trigger was seen; upload a kernel.
    Trigger,
}

impl Event {
    /// Writes whatever the event forwards to the terminal.
    pub fn write_to<W: Write + ?Sized>(&self, output: &mut W) -> io::Result<()> {
        match *self {
            Event::Hold | Event::Trigger => Ok(()),
            Event::Emit(byte) => output.write_all(&[byte]),
            Event::Flush { breaks, byte } => {
                for _ in 0..breaks {
                    output.write_all(&[ETX])?;
                }
                output.write_all(&[byte])
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Detector {
    breaks: usize,
}

impl Detector {
    pub fn new() -> Self { Self::default() }

    pub fn feed(&mut self, byte: u8) -> Event {
        if byte == ETX {
            self.breaks += 1;
            if self.breaks == TRIGGER.len() {
                self.breaks = 0;
                return Event::Trigger;
            }
            return Event::Hold;
        }

        match mem::take(&mut self.breaks) {
            0 => Event::Emit(byte),
            breaks => Event::Flush { breaks, byte },
        }
    }

    /// Number of ETX bytes currently held back.
    pub fn held(&self) -> usize { self.breaks }

    /// Forgets any partial run.
    pub fn reset(&mut self) { self.breaks = 0; }
}
