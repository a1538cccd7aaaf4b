//! Modules with the loader's business logic, laid on top of the
//! abstract drivers. Devices are generic, while the hardware
//! specifics (register addresses, boot registers) are wired up by
//! the `raspbootin` binary.

pub mod atag;
pub mod board;
pub mod receiver;

/// General purpose traits that summarize requirements on devices.
pub mod traits {
    use crate::hal::serial;

    /// A supported serial must be able to read and write bytes, and
    /// to tell whether any of them were corrupted on the line.
    pub trait Serial: serial::Read<u8> + serial::Write<u8> + serial::LineStatus {}
    impl<T: serial::Read<u8> + serial::Write<u8> + serial::LineStatus> Serial for T {}
}
