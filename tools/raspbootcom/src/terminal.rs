//! Local terminal handling.
use std::{
    io::{self, Read},
    mem,
    os::unix::io::RawFd,
};

/// Puts a terminal in non canonical, non echoing mode for as long as
/// the guard lives. Does nothing when the descriptor is not a tty.
pub struct RawMode {
    fd: RawFd,
    saved: Option<libc::termios>,
}

impl RawMode {
    pub fn enable(fd: RawFd) -> io::Result<Self> {
        // NOTE(Safety) isatty accepts any descriptor value
        if unsafe { libc::isatty(fd) } != 1 {
            return Ok(Self { fd, saved: None });
        }

        // NOTE(Safety) termios is plain data, filled in by tcgetattr
        let mut saved: libc::termios = unsafe { mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } == -1 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, saved: Some(saved) })
    }

    pub fn is_active(&self) -> bool { self.saved.is_some() }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.as_ref() {
            // Nothing sensible is left to do if restoring fails.
            unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, saved) };
        }
    }
}

/// Unbuffered reader over a raw descriptor.
///
/// `std::io::Stdin` buffers internally, which would hide pending input
/// from `poll`.
pub struct LocalInput {
    fd: RawFd,
}

impl LocalInput {
    pub fn stdin() -> Self { Self { fd: libc::STDIN_FILENO } }

    pub fn fd(&self) -> RawFd { self.fd }
}

impl Read for LocalInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // NOTE(Safety) The buffer is valid for writes of its length
        let read = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(read as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{
        io::{Seek, SeekFrom, Write},
        os::unix::io::AsRawFd,
    };

    #[test]
    fn raw_mode_leaves_non_terminals_alone() {
        let file = tempfile::tempfile().unwrap();
        let guard = RawMode::enable(file.as_raw_fd()).unwrap();
        assert!(!guard.is_active());
    }

    #[test]
    fn local_input_reads_straight_from_the_descriptor() {
        // Given
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"ab").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut input = LocalInput { fd: file.as_raw_fd() };
        let mut byte = [0u8; 1];

        // When / Then
        assert_eq!(1, input.read(&mut byte).unwrap());
        assert_eq!(b'a', byte[0]);
        assert_eq!(1, input.read(&mut byte).unwrap());
        assert_eq!(b'b', byte[0]);
        assert_eq!(0, input.read(&mut byte).unwrap());
    }
}
