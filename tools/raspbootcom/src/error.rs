use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The device node is missing or its permissions are still
    /// being settled after a hot plug.
    #[error("{path}: device not ready")]
    DeviceNotReady { path: String },
    #[error("{path} is not a tty")]
    NotATty { path: String },
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serial::Error,
    },
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: String,
        #[source]
        source: serial::Error,
    },
    #[error("{}: {source}", path.display())]
    Kernel {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("kernel too big: {size} bytes, at most {limit} accepted")]
    KernelTooLarge { size: u64, limit: u32 },
    #[error("device I/O failed: {0}")]
    Device(#[source] io::Error),
    #[error("terminal I/O failed: {0}")]
    Local(#[source] io::Error),
    #[error("error on stdin")]
    LocalFault,
    #[error("waiting for input failed: {0}")]
    Poll(#[source] io::Error),
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the connect loop should simply try again later.
    pub fn is_transient(&self) -> bool { matches!(self, Error::DeviceNotReady { .. }) }
}
