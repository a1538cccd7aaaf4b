//! Kernel upload.
//!
//! Runs once the device has sent its trigger: announce the size,
//! wait for the verdict and, if accepted, stream the image. Every
//! retry loop looks at the cancellation flag first.
use crate::{cancel::Cancellation, error::Error};
use raspbootin_lib::protocol::{self, Acknowledgement, ACK_LEN};
use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

/// Largest image the uploader will offer.
pub const MAX_KERNEL_SIZE: u32 = 0x20_0000;

const CHUNK_SIZE: usize = 64 * 1024;

/// How an upload ended, short of an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// The whole image went out.
    Sent(u32),
    /// The device answered something other than "OK". Nothing was
    /// streamed.
    Rejected([u8; ACK_LEN]),
    Cancelled,
}

/// Uploads the kernel at `path`.
///
/// Images over `MAX_KERNEL_SIZE` fail before anything is written to
/// the device.
pub fn send_kernel<P>(port: &mut P, path: &Path, cancel: &Cancellation) -> Result<Transfer, Error>
where
    P: Read + Write + ?Sized,
{
    match upload(port, path, cancel) {
        Err(Error::Cancelled) => {
            log::info!("upload of {} cancelled", path.display());
            Ok(Transfer::Cancelled)
        }
        result => result,
    }
}

fn upload<P>(port: &mut P, path: &Path, cancel: &Cancellation) -> Result<Transfer, Error>
where
    P: Read + Write + ?Sized,
{
    let kernel_error = |source: io::Error| Error::Kernel { path: path.to_owned(), source };
    let file = File::open(path).map_err(kernel_error)?;
    let size = checked_size(file.metadata().map_err(kernel_error)?.len())?;

    eprintln!("### sending kernel {} [{} byte]", path.display(), size);
    write_all(port, &protocol::encode_size(size), cancel)?;

    let mut acknowledgement = [0u8; ACK_LEN];
    read_exact(port, &mut acknowledgement, cancel)?;
    if Acknowledgement::from_bytes(&acknowledgement) != Some(Acknowledgement::Ok) {
        eprintln!("### error after sending size");
        log::debug!("device answered {:?}", acknowledgement);
        return Ok(Transfer::Rejected(acknowledgement));
    }

    // Never stream more than was announced, even if the file grows.
    let mut image = file.take(u64::from(size));
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let read = match image.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(kernel_error(e)),
        };
        write_all(port, &buffer[..read], cancel)?;
        sent += read as u64;
    }

    if sent != u64::from(size) {
        log::warn!("{} shrank while sending: {} of {} bytes", path.display(), sent, size);
    }
    eprintln!("### finished sending");
    Ok(Transfer::Sent(size))
}

fn checked_size(size: u64) -> Result<u32, Error> {
    match u32::try_from(size) {
        Ok(size) if size <= MAX_KERNEL_SIZE => Ok(size),
        _ => Err(Error::KernelTooLarge { size, limit: MAX_KERNEL_SIZE }),
    }
}

/// Errors after which the same call is simply repeated.
pub(crate) fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Writes all of `bytes`, re-issuing partial writes.
pub fn write_all<P: Write + ?Sized>(
    port: &mut P,
    mut bytes: &[u8],
    cancel: &Cancellation,
) -> Result<(), Error> {
    while !bytes.is_empty() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match port.write(bytes) {
            Ok(0) => return Err(Error::Device(io::ErrorKind::WriteZero.into())),
            Ok(written) => bytes = &bytes[written..],
            Err(e) if is_retryable(&e) => {}
            Err(e) => return Err(Error::Device(e)),
        }
    }
    Ok(())
}

/// Fills `buffer`, retrying short and empty reads.
pub fn read_exact<P: Read + ?Sized>(
    port: &mut P,
    buffer: &mut [u8],
    cancel: &Cancellation,
) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buffer.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match port.read(&mut buffer[filled..]) {
            Ok(read) => filled += read,
            Err(e) if is_retryable(&e) => {}
            Err(e) => return Err(Error::Device(e)),
        }
    }
    Ok(())
}
