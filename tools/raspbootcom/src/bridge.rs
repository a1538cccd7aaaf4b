//! Terminal to device bridge.
//!
//! One session covers one connection: keystrokes go to the device,
//! device output goes through the break detector to the terminal,
//! and a trigger hands the line to the uploader until the kernel is
//! out.
use crate::{
    cancel::Cancellation,
    detector::{Detector, Event},
    error::Error,
    transfer::{self, is_retryable, Transfer},
};
use std::{
    io::{self, Read, Write},
    os::unix::io::RawFd,
    path::Path,
};

/// Which ends of the bridge need attention.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub local: bool,
    pub local_fault: bool,
    pub device: bool,
    pub device_fault: bool,
}

impl Readiness {
    pub const NONE: Self =
        Self { local: false, local_fault: false, device: false, device_fault: false };
    pub const LOCAL: Self = Self { local: true, ..Self::NONE };
    pub const DEVICE: Self = Self { device: true, ..Self::NONE };
}

/// Blocks until either end of the bridge is ready.
pub trait Multiplexer {
    /// An empty readiness set means the wait was interrupted, most
    /// likely by a signal.
    fn wait(&mut self) -> io::Result<Readiness>;
}

/// `poll(2)` over the local input and the device.
pub struct FdPoller {
    local: RawFd,
    device: RawFd,
}

impl FdPoller {
    pub fn new(local: RawFd, device: RawFd) -> Self { Self { local, device } }
}

impl Multiplexer for FdPoller {
    fn wait(&mut self) -> io::Result<Readiness> {
        let mut fds = [
            libc::pollfd { fd: self.local, events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: self.device, events: libc::POLLIN, revents: 0 },
        ];
        // NOTE(Safety) The descriptor array outlives the call and its
        // length is passed alongside.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ready < 0 {
            let error = io::Error::last_os_error();
            return match error.kind() {
                io::ErrorKind::Interrupted => Ok(Readiness::NONE),
                _ => Err(error),
            };
        }

        let (local, device) = (fds[0].revents, fds[1].revents);
        Ok(Readiness {
            // A hung up terminal reads as end of file.
            local: local & (libc::POLLIN | libc::POLLHUP) != 0,
            local_fault: local & (libc::POLLERR | libc::POLLNVAL) != 0,
            device: device & libc::POLLIN != 0,
            device_fault: device & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
        })
    }
}

/// Why a session ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local input reached end of file.
    LocalClosed,
    /// The device stopped talking; reconnect.
    DeviceClosed,
    /// The device reported an error condition; reconnect.
    DeviceFault,
    Cancelled,
}

pub struct Session<'a, M, P, I, O>
where
    P: Read + Write + ?Sized,
    I: Read + ?Sized,
    O: Write + ?Sized,
{
    multiplexer: M,
    port: &'a mut P,
    input: &'a mut I,
    output: &'a mut O,
    kernel: &'a Path,
    cancel: Cancellation,
    detector: Detector,
}

impl<'a, M, P, I, O> Session<'a, M, P, I, O>
where
    M: Multiplexer,
    P: Read + Write + ?Sized,
    I: Read + ?Sized,
    O: Write + ?Sized,
{
    pub fn new(
        multiplexer: M,
        port: &'a mut P,
        input: &'a mut I,
        output: &'a mut O,
        kernel: &'a Path,
        cancel: Cancellation,
    ) -> Self {
        Self { multiplexer, port, input, output, kernel, cancel, detector: Detector::new() }
    }

    /// Bridges until the connection or the local input goes away.
    /// Errors are fatal to the whole program.
    pub fn run(mut self) -> Result<SessionEnd, Error> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionEnd::Cancelled);
            }
            let ready = self.multiplexer.wait().map_err(Error::Poll)?;

            if ready.device {
                if let Some(end) = self.pump_device()? {
                    return Ok(end);
                }
            } else if ready.device_fault {
                log::warn!("error on device");
                return Ok(SessionEnd::DeviceFault);
            }

            if ready.local {
                if let Some(end) = self.pump_local()? {
                    return Ok(end);
                }
            } else if ready.local_fault {
                return Err(Error::LocalFault);
            }
        }
    }

    fn pump_device(&mut self) -> Result<Option<SessionEnd>, Error> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(Some(SessionEnd::DeviceClosed)),
            Ok(_) => self.forward(byte[0]),
            Err(e) if is_retryable(&e) => Ok(None),
            Err(e) => {
                log::warn!("device read failed: {}", e);
                Ok(Some(SessionEnd::DeviceFault))
            }
        }
    }

    fn forward(&mut self, byte: u8) -> Result<Option<SessionEnd>, Error> {
        match self.detector.feed(byte) {
            Event::Trigger => {
                self.output.flush().map_err(Error::Local)?;
                self.upload()
            }
            event => {
                event.write_to(&mut *self.output).map_err(Error::Local)?;
                self.output.flush().map_err(Error::Local)?;
                Ok(None)
            }
        }
    }

    fn upload(&mut self) -> Result<Option<SessionEnd>, Error> {
        match transfer::send_kernel(&mut *self.port, self.kernel, &self.cancel)? {
            Transfer::Sent(size) => {
                log::info!("sent {} byte kernel", size);
                Ok(None)
            }
            Transfer::Rejected(_) => Ok(None),
            Transfer::Cancelled => Ok(Some(SessionEnd::Cancelled)),
        }
    }

    fn pump_local(&mut self) -> Result<Option<SessionEnd>, Error> {
        let mut byte = [0u8; 1];
        match self.input.read(&mut byte) {
            Ok(0) => Ok(Some(SessionEnd::LocalClosed)),
            Ok(_) => match transfer::write_all(&mut *self.port, &byte, &self.cancel) {
                Ok(()) => Ok(None),
                Err(Error::Cancelled) => Ok(Some(SessionEnd::Cancelled)),
                Err(Error::Device(e)) => {
                    log::warn!("device write failed: {}", e);
                    Ok(Some(SessionEnd::DeviceFault))
                }
                Err(e) => Err(e),
            },
            Err(e) if is_retryable(&e) => Ok(None),
            Err(e) => Err(Error::Local(e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doubles::{MemoryPort, ScriptedMultiplexer};
    use raspbootin_lib::protocol::ETX;
    use std::sync::atomic::AtomicBool;
    use tempfile::NamedTempFile;

    static NEVER: AtomicBool = AtomicBool::new(false);

    fn kernel(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn device_output_reaches_the_terminal() {
        // Given
        let file = kernel(b"");
        let mut port = MemoryPort::with_input(b"hello\r\n");
        let (mut input, mut output) = (io::empty(), Vec::new());
        let multiplexer = ScriptedMultiplexer::always(Readiness::DEVICE);

        // When
        let end = Session::new(
            multiplexer,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run()
        .unwrap();

        // Then
        assert_eq!(SessionEnd::DeviceClosed, end);
        assert_eq!(b"hello\r\n", &output[..]);
    }

    #[test]
    fn trigger_uploads_the_kernel_then_bridging_resumes() {
        // Given a device asking for a ten byte kernel, accepting it and
        // then printing
        let file = kernel(b"0123456789");
        let mut port = MemoryPort::with_input(&[ETX, ETX, ETX, b'O', b'K', b'h', b'i']);
        let (mut input, mut output) = (io::empty(), Vec::new());
        let multiplexer = ScriptedMultiplexer::always(Readiness::DEVICE);

        // When
        let end = Session::new(
            multiplexer,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run()
        .unwrap();

        // Then
        assert_eq!(SessionEnd::DeviceClosed, end);
        assert_eq!(b"\x0a\x00\x00\x000123456789", &port.sent()[..]);
        assert_eq!(b"hi", &output[..]);
    }

    #[test]
    fn rejected_size_returns_to_listening() {
        let file = kernel(b"0123456789");
        let mut port = MemoryPort::with_input(&[ETX, ETX, ETX, b'S', b'E']);
        let (mut input, mut output) = (io::empty(), Vec::new());
        let multiplexer = ScriptedMultiplexer::always(Readiness::DEVICE);

        let end = Session::new(
            multiplexer,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run()
        .unwrap();

        assert_eq!(SessionEnd::DeviceClosed, end);
        assert_eq!(&[0x0a, 0, 0, 0], &port.sent()[..]);
        assert!(output.is_empty());
    }

    #[test]
    fn keystrokes_are_forwarded_until_local_input_closes() {
        let file = kernel(b"");
        let mut port = MemoryPort::default();
        let (mut input, mut output) = (&b"ls\n"[..], Vec::new());
        let multiplexer = ScriptedMultiplexer::always(Readiness::LOCAL);

        let end = Session::new(
            multiplexer,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run()
        .unwrap();

        assert_eq!(SessionEnd::LocalClosed, end);
        assert_eq!(b"ls\n", &port.sent()[..]);
    }

    #[test]
    fn device_fault_ends_the_session_but_local_fault_is_fatal() {
        let file = kernel(b"");
        let mut port = MemoryPort::default();
        let (mut input, mut output) = (io::empty(), Vec::new());

        let faulty_device = ScriptedMultiplexer::always(Readiness {
            device_fault: true,
            ..Readiness::NONE
        });
        let end = Session::new(
            faulty_device,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run()
        .unwrap();
        assert_eq!(SessionEnd::DeviceFault, end);

        let faulty_terminal = ScriptedMultiplexer::always(Readiness {
            local_fault: true,
            ..Readiness::NONE
        });
        let result = Session::new(
            faulty_terminal,
            &mut port,
            &mut input,
            &mut output,
            file.path(),
            Cancellation::new(&NEVER),
        )
        .run();
        assert!(matches!(result, Err(Error::LocalFault)));
    }

    #[test]
    fn cancellation_ends_the_session() {
        // Given a wait that keeps getting interrupted by a signal
        static FLAG: AtomicBool = AtomicBool::new(false);
        let cancel = Cancellation::new(&FLAG);
        let file = kernel(b"");
        let mut port = MemoryPort::default();
        let (mut input, mut output) = (io::empty(), Vec::new());
        let multiplexer = ScriptedMultiplexer::new([Readiness::NONE; 3], Readiness::NONE);
        cancel.cancel();

        // When
        let end = Session::new(multiplexer, &mut port, &mut input, &mut output, file.path(), cancel)
            .run()
            .unwrap();

        // Then
        assert_eq!(SessionEnd::Cancelled, end);
    }

    #[test]
    fn poller_reports_readable_input() {
        // Given a pipe with a byte in it standing in for both ends
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(0, unsafe { libc::pipe(fds.as_mut_ptr()) });
        assert_eq!(1, unsafe { libc::write(fds[1], b"x".as_ptr().cast(), 1) });

        // When
        let ready = FdPoller::new(fds[0], fds[0]).wait().unwrap();

        // Then
        assert!(ready.local && ready.device);
        assert!(!ready.local_fault && !ready.device_fault);
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
