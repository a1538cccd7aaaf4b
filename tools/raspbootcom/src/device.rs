//! Serial device access.
use crate::error::Error;
use serial::prelude::*;
use std::{
    fs::OpenOptions,
    io,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::Path,
    time::Duration,
};

pub use serial::SystemPort;

/// How long a single read or write on the device may block, bounding
/// how stale a cancellation request can get.
pub const IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens `path` as a raw 8N1 line without flow control.
pub fn connect(path: &Path, baud: usize) -> Result<SystemPort, Error> {
    let name = path.display().to_string();
    let mut port = SystemPort::open(path).map_err(|source| classify(path, source))?;
    if !is_tty(port.as_raw_fd()) {
        return Err(Error::NotATty { path: name });
    }

    port.reconfigure(&|settings| {
        settings.set_baud_rate(serial::BaudRate::from_speed(baud))?;
        settings.set_char_size(serial::Bits8);
        settings.set_parity(serial::ParityNone);
        settings.set_stop_bits(serial::Stop1);
        settings.set_flow_control(serial::FlowNone);
        Ok(())
    })
    .map_err(|source| Error::Configure { path: name.clone(), source })?;
    port.set_timeout(IO_TIMEOUT).map_err(|source| Error::Configure { path: name, source })?;

    log::debug!("opened {} at {} baud", path.display(), baud);
    Ok(port)
}

/// Sorts failed opens into the ones worth retrying (the node is not
/// there yet, or udev has not handed it over yet) and the rest.
fn classify(path: &Path, source: serial::Error) -> Error {
    let name = path.display().to_string();
    if probe_tty(path) == Some(false) {
        return Error::NotATty { path: name };
    }
    match source.kind() {
        serial::ErrorKind::NoDevice | serial::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            Error::DeviceNotReady { path: name }
        }
        _ => Error::Open { path: name, source },
    }
}

/// Whether `path` is a terminal, if it can be opened at all.
fn probe_tty(path: &Path) -> Option<bool> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
        .ok()
        .map(|file| is_tty(file.as_raw_fd()))
}

fn is_tty(fd: libc::c_int) -> bool {
    // NOTE(Safety) isatty accepts any descriptor value
    unsafe { libc::isatty(fd) == 1 }
}
