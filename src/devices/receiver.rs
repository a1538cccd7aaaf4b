//! Kernel receiver.
//!
//! Drives the device half of the transfer protocol over any byte
//! serial: announce, request a kernel with the trigger pattern, read
//! and vet its size, then copy the payload into the load region.
//! Jumping into the image is left to the caller, since only the
//! binary knows where the region really lives.
use crate::{
    devices::{
        atag::Atags,
        board::Board,
        traits::Serial,
    },
    drivers::pl011::delay,
    error::Error,
    hal::serial::{Console, Hex, LineStatus, Read, Write},
    protocol::{self, Acknowledgement, SizeFrame},
    uprint, uprintln,
};
use nb::block;

const BANNER: &str = "\r\nRaspbootin V1.1";
const RULE: &str = "######################################################################";
const BOOTING: &[u8] = b"booting...";
const HALTING: &str = "\r\n*** system halting ***";
const RETURN_GRACE_CYCLES: u32 = 10_000_000;

/// Register values the firmware booted the loader with, handed
/// untouched to the loaded image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootArgs {
    pub r0: u32,
    pub r1: u32,
    /// Address of the boot tag list.
    pub atags: usize,
}

/// Signature of a loaded image's entry point.
pub type Entry = unsafe extern "C" fn(r0: u32, r1: u32, atags: usize);

pub struct Receiver<S: Serial> {
    serial: S,
}

impl<S> Receiver<S>
where
    S: Serial,
    Error: From<<S as Read<u8>>::Error>
        + From<<S as Write<u8>>::Error>
        + From<<S as LineStatus>::Fault>,
{
    pub fn new(serial: S) -> Self { Self { serial } }

    pub fn serial(&mut self) -> &mut S { &mut self.serial }

    /// Prints the banner and diagnostic header.
    pub fn announce(&mut self, args: &BootArgs, board: &Board, atags: Atags) -> Result<(), Error> {
        uprintln!(self.serial, "{}", BANNER)?;
        uprintln!(self.serial, "{}", RULE)?;
        uprintln!(
            self.serial,
            "R0 = {}, R1 = {}, ATAGs @ {}",
            Hex(args.r0),
            Hex(args.r1),
            Hex(args.atags as u32)
        )?;
        for (address, atag) in atags {
            uprint!(self.serial, "[{}] ", Hex(address as u32))?;
            atag.report(&mut self.serial)?;
        }
        uprintln!(self.serial, "Detected '{}'", board.model)?;
        uprintln!(self.serial, "{}", RULE)?;
        Ok(())
    }

    /// Asks the host for a kernel.
    pub fn request(&mut self) -> Result<(), Error> { self.write_bytes(&protocol::TRIGGER) }

    pub fn receive_size(&mut self) -> Result<u32, Error> {
        let mut frame: SizeFrame = [0; protocol::SIZE_FRAME_LEN];
        for byte in frame.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(protocol::decode_size(&frame))
    }

    /// Answers a size offer. Besides the fixed ceiling, an image must
    /// also fit the region it is going to be copied into.
    pub fn acknowledge(&mut self, size: u32, capacity: usize) -> Result<Acknowledgement, Error> {
        let acknowledgement = match protocol::validate_size(size) {
            Acknowledgement::Ok if size as usize <= capacity => Acknowledgement::Ok,
            _ => Acknowledgement::SizeError,
        };
        self.write_bytes(acknowledgement.as_bytes())?;
        Ok(acknowledgement)
    }

    /// Requests kernels until one of acceptable size arrives, storing
    /// it at the start of `region`. Returns the image size.
    ///
    /// Corrupted bytes do not interrupt the transfer, so the payload is
    /// always read to its announced end. Use `check_line` afterwards.
    pub fn serve(&mut self, region: &mut [u8]) -> Result<usize, Error> {
        let size = loop {
            // Noise on an idle line says nothing about the next image
            let _ = self.serial.take_fault();
            self.request()?;
            let size = self.receive_size()?;
            if self.acknowledge(size, region.len())? == Acknowledgement::Ok {
                break size as usize;
            }
        };

        for slot in region[..size].iter_mut() {
            *slot = self.read_byte()?;
        }
        Ok(size)
    }

    /// Fails with the first line error seen since the last request.
    pub fn check_line(&mut self) -> Result<(), Error> {
        match self.serial.take_fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    pub fn halt_banner(&mut self) -> Result<(), Error> {
        uprintln!(self.serial, "{}", HALTING)?;
        Ok(())
    }

    /// Runs the loader to completion. `enter` is handed the boot
    /// arguments once an image is in place, and is expected not to
    /// return. If it does, the loader halts for good.
    pub fn run<F>(
        mut self,
        args: &BootArgs,
        board: &Board,
        atags: Atags,
        region: &mut [u8],
        enter: F,
    ) -> !
    where
        F: FnOnce(&BootArgs),
    {
        if let Err(error) = self.announce(args, board, atags) {
            error.report(&mut self.serial);
        }

        // A corrupted image is never entered. The host is still in step
        // after a full payload, so a fresh request makes it resend.
        loop {
            match self.serve(region).and_then(|_| self.check_line()) {
                Ok(()) => break,
                Err(error) => error.report(&mut self.serial),
            }
        }

        // The host is bridging the console by now, so this is the last
        // thing the user sees from the loader.
        let _ = self.write_bytes(BOOTING);
        enter(args);

        delay(RETURN_GRACE_CYCLES);
        let _ = self.halt_banner();
        Error::ImageReturned.report(&mut self.serial);
        loop {
            core::hint::spin_loop();
        }
    }

    fn read_byte(&mut self) -> Result<u8, Error> { Ok(block!(self.serial.read())?) }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        Ok(Console::new(&mut self.serial).write_bytes(bytes)?)
    }
}
