use super::error::FakeError;
use crate::hal::serial;
use std::{collections::VecDeque, vec::Vec};

/// Serial double that replays a fixed script of incoming bytes
/// and records everything written to it. Reading past the end
/// of the script fails with `FakeError`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSerial {
    pub incoming: VecDeque<u8>,
    pub outgoing: Vec<u8>,
    /// Index of an incoming byte that arrives corrupted.
    pub corrupt_at: Option<usize>,
    read_count: usize,
    fault: Option<FakeError>,
}

impl ScriptedSerial {
    pub fn with_input(bytes: &[u8]) -> Self {
        Self { incoming: bytes.iter().cloned().collect(), ..Default::default() }
    }

    pub fn is_drained(&self) -> bool { self.incoming.is_empty() }
}

impl serial::Read<u8> for ScriptedSerial {
    type Error = FakeError;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let byte = self.incoming.pop_front().ok_or(nb::Error::Other(FakeError))?;
        if self.corrupt_at == Some(self.read_count) {
            self.fault.get_or_insert(FakeError);
        }
        self.read_count += 1;
        Ok(byte)
    }
}

impl serial::Write<u8> for ScriptedSerial {
    type Error = FakeError;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.outgoing.push(word);
        Ok(())
    }
}

impl serial::LineStatus for ScriptedSerial {
    type Fault = FakeError;

    fn take_fault(&mut self) -> Option<Self::Fault> { self.fault.take() }
}
