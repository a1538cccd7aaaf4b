//! In-memory stand-ins for the serial device and the readiness
//! multiplexer.
use crate::{
    bridge::{Multiplexer, Readiness},
    cancel::Cancellation,
};
use std::{
    cell::RefCell,
    cmp::min,
    collections::VecDeque,
    io::{self, Read, Write},
    rc::Rc,
};

#[derive(Default)]
struct Wire {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
    write_chunk: Option<usize>,
    hiccups: usize,
    cancel_after: Option<(usize, Cancellation)>,
}

impl Wire {
    fn hiccup(&mut self) -> io::Result<()> {
        if self.hiccups > 0 {
            self.hiccups -= 1;
            return Err(io::ErrorKind::Interrupted.into());
        }
        Ok(())
    }

    fn count_call(&mut self) {
        if let Some((calls, cancel)) = self.cancel_after.as_mut() {
            *calls = calls.saturating_sub(1);
            if *calls == 0 {
                cancel.cancel();
            }
        }
    }
}

/// Serial port backed by memory. Clones share the same wire, so a
/// test can keep a handle on a port it gave away. Reads past the
/// scripted input report end of file.
#[derive(Clone, Default)]
pub struct MemoryPort {
    wire: Rc<RefCell<Wire>>,
}

impl MemoryPort {
    pub fn with_input(bytes: &[u8]) -> Self {
        let port = Self::default();
        port.wire.borrow_mut().incoming.extend(bytes.iter().copied());
        port
    }

    /// Accepts at most `chunk` bytes per write.
    pub fn write_chunk(self, chunk: usize) -> Self {
        self.wire.borrow_mut().write_chunk = Some(chunk);
        self
    }

    /// Fails the next `count` reads or writes as interrupted.
    pub fn hiccups(self, count: usize) -> Self {
        self.wire.borrow_mut().hiccups = count;
        self
    }

    /// Raises `cancel` once `calls` reads and writes have completed.
    pub fn cancel_after(self, calls: usize, cancel: Cancellation) -> Self {
        self.wire.borrow_mut().cancel_after = Some((calls, cancel));
        self
    }

    pub fn sent(&self) -> Vec<u8> { self.wire.borrow().outgoing.clone() }
}

impl Read for MemoryPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        wire.hiccup()?;
        let count = min(buf.len(), wire.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(wire.incoming.drain(..count)) {
            *slot = byte;
        }
        wire.count_call();
        Ok(count)
    }
}

impl Write for MemoryPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        wire.hiccup()?;
        let count = min(buf.len(), wire.write_chunk.unwrap_or(buf.len()));
        wire.outgoing.extend_from_slice(&buf[..count]);
        wire.count_call();
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Reports a scripted sequence of readiness sets, then `fallback`
/// forever.
pub struct ScriptedMultiplexer {
    script: VecDeque<Readiness>,
    fallback: Readiness,
}

impl ScriptedMultiplexer {
    pub fn new<I: IntoIterator<Item = Readiness>>(script: I, fallback: Readiness) -> Self {
        Self { script: script.into_iter().collect(), fallback }
    }

    pub fn always(readiness: Readiness) -> Self { Self::new([], readiness) }
}

impl Multiplexer for ScriptedMultiplexer {
    fn wait(&mut self) -> io::Result<Readiness> {
        Ok(self.script.pop_front().unwrap_or(self.fallback))
    }
}
