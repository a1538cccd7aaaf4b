//! Upload protocol shared by the loader and the host uploader.
//!
//! The loader requests a kernel with three break characters, the
//! host answers with a little-endian size frame, the loader
//! acknowledges it and the raw image follows.

use byteorder::{ByteOrder, LittleEndian};
use static_assertions::const_assert;

/// Break character. Three of them in a row request an upload.
pub const ETX: u8 = 0x03;
pub const TRIGGER: [u8; 3] = [ETX; 3];

/// Address the received image is copied to and called at.
pub const LOAD_ADDR: usize = 0x8000;
/// Address the loader relocates itself to. Images may not reach it.
pub const LOADER_ADDR: usize = 0x200_0000;
/// Largest image the loader can hold without overwriting itself.
pub const MAX_IMAGE_SIZE: usize = LOADER_ADDR - LOAD_ADDR;

pub const SIZE_FRAME_LEN: usize = 4;
pub const ACK_LEN: usize = 2;
pub const ACK_OK: [u8; ACK_LEN] = *b"OK";
pub const ACK_SIZE_ERROR: [u8; ACK_LEN] = *b"SE";

const_assert!(LOAD_ADDR < LOADER_ADDR);
const_assert!(MAX_IMAGE_SIZE <= u32::MAX as usize);

pub type SizeFrame = [u8; SIZE_FRAME_LEN];

/// Loader response to a size frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// The image fits, the host may stream it.
    Ok,
    /// The image would overwrite the loader. No payload follows.
    SizeError,
}

impl Acknowledgement {
    pub fn as_bytes(&self) -> &'static [u8; ACK_LEN] {
        match self {
            Acknowledgement::Ok => &ACK_OK,
            Acknowledgement::SizeError => &ACK_SIZE_ERROR,
        }
    }

    /// Interprets a received acknowledgement. Anything other than the
    /// two known codes is garbage.
    pub fn from_bytes(bytes: &[u8; ACK_LEN]) -> Option<Self> {
        match *bytes {
            ACK_OK => Some(Acknowledgement::Ok),
            ACK_SIZE_ERROR => Some(Acknowledgement::SizeError),
            _ => None,
        }
    }
}

pub fn encode_size(size: u32) -> SizeFrame {
    let mut frame = [0u8; SIZE_FRAME_LEN];
    LittleEndian::write_u32(&mut frame, size);
    frame
}

pub fn decode_size(frame: &SizeFrame) -> u32 { LittleEndian::read_u32(frame) }

/// Decides whether an image of `size` bytes fits between the load
/// address and the loader.
pub fn validate_size(size: u32) -> Acknowledgement {
    match LOAD_ADDR.checked_add(size as usize) {
        Some(end) if end <= LOADER_ADDR => Acknowledgement::Ok,
        _ => Acknowledgement::SizeError,
    }
}
