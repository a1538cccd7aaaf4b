//! Reconnect loop around the bridge.
use crate::{
    bridge::{FdPoller, Multiplexer, Session, SessionEnd},
    cancel::Cancellation,
    device::{self, SystemPort},
    error::Error,
};
use std::{
    cmp::min,
    io::{Read, Write},
    os::unix::io::{AsRawFd, RawFd},
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Longest uninterrupted sleep while waiting for the device.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Source of device connections.
pub trait Connector {
    type Port: Read + Write;
    type Multiplexer: Multiplexer;

    /// Opens the device, returning it with a multiplexer watching it
    /// alongside the local input.
    fn connect(&mut self) -> Result<(Self::Port, Self::Multiplexer), Error>;

    /// Name shown in status lines.
    fn name(&self) -> String;
}

/// Connects to a serial device node.
pub struct SerialConnector {
    path: PathBuf,
    baud: usize,
    local: RawFd,
}

impl SerialConnector {
    pub fn new<P: Into<PathBuf>>(path: P, baud: usize, local: RawFd) -> Self {
        Self { path: path.into(), baud, local }
    }
}

impl Connector for SerialConnector {
    type Port = SystemPort;
    type Multiplexer = FdPoller;

    fn connect(&mut self) -> Result<(SystemPort, FdPoller), Error> {
        let port = device::connect(&self.path, self.baud)?;
        let poller = FdPoller::new(self.local, port.as_raw_fd());
        Ok((port, poller))
    }

    fn name(&self) -> String { self.path.display().to_string() }
}

/// How the uploader stopped, when it did so cleanly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Shutdown {
    LocalClosed,
    Cancelled,
}

pub struct Uploader<C: Connector> {
    connector: C,
    kernel: PathBuf,
    cancel: Cancellation,
    retry_delay: Duration,
}

impl<C: Connector> Uploader<C> {
    pub fn new<P: Into<PathBuf>>(connector: C, kernel: P, cancel: Cancellation) -> Self {
        Self { connector, kernel: kernel.into(), cancel, retry_delay: DEFAULT_RETRY_DELAY }
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Keeps the device bridged to `input` and `output`, reconnecting
    /// whenever it goes away, until local input closes or the run is
    /// cancelled.
    pub fn run<I, O>(&mut self, input: &mut I, output: &mut O) -> Result<Shutdown, Error>
    where
        I: Read + ?Sized,
        O: Write + ?Sized,
    {
        let name = self.connector.name();
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Shutdown::Cancelled);
            }

            let (mut port, multiplexer) = match self.connector.connect() {
                Ok(connection) => connection,
                Err(e) if e.is_transient() => {
                    eprint!("\r### Waiting for {}...\r", name);
                    self.pause();
                    continue;
                }
                Err(e) => return Err(e),
            };
            eprintln!("### Listening on {}     ", name);

            // Each connection starts with a fresh detector.
            let session = Session::new(
                multiplexer,
                &mut port,
                &mut *input,
                &mut *output,
                &self.kernel,
                self.cancel,
            );
            match session.run()? {
                SessionEnd::LocalClosed => return Ok(Shutdown::LocalClosed),
                SessionEnd::Cancelled => return Ok(Shutdown::Cancelled),
                end => log::info!("lost {} ({:?}), reconnecting", name, end),
            }
        }
    }

    fn pause(&self) {
        let deadline = Instant::now() + self.retry_delay;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(min(SLEEP_SLICE, deadline - now));
        }
    }
}
