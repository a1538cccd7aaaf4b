//! Host side of the raspbootin serial protocol.
//!
//! Bridges a serial device to the local terminal and, whenever the
//! device asks for one, uploads a kernel image.

pub mod bridge;
pub mod cancel;
pub mod detector;
pub mod device;
pub mod error;
pub mod terminal;
pub mod transfer;
pub mod uploader;

#[cfg(test)]
pub(crate) mod doubles;

pub use error::Error;
