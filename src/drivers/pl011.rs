//! Driver for the PL011 UART of the BCM2835/BCM2836.
//!
//! The loader has no interrupts enabled, so this driver is purely
//! polled: reads and writes report `WouldBlock` until the FIFOs
//! allow progress. Line errors never fail a read; the corrupted
//! character is delivered and the first error is latched.
use crate::{error, hal::serial};
use core::{convert::Infallible, ptr};
use nb;

/// Offset of the GPIO block from the peripheral base.
pub const GPIO_OFFSET: usize = 0x20_0000;
/// Offset of UART0 from the GPIO block.
pub const UART0_OFFSET: usize = 0x1000;
/// Bytes spanned by the GPIO block plus UART0, from the GPIO base.
pub const WINDOW_SIZE: usize = UART0_OFFSET + 0x90;

// GPIO registers, relative to the GPIO base
const GPPUD: usize = 0x94;
const GPPUDCLK0: usize = 0x98;

// UART0 registers, relative to the UART0 base
const DR: usize = 0x00;
const FR: usize = 0x18;
const IBRD: usize = 0x24;
const FBRD: usize = 0x28;
const LCRH: usize = 0x2C;
const CR: usize = 0x30;
const IMSC: usize = 0x38;
const ICR: usize = 0x44;

const FR_RXFE: u32 = 1 << 4;
const FR_TXFF: u32 = 1 << 5;

const DR_FE: u32 = 1 << 8;
const DR_PE: u32 = 1 << 9;
const DR_BE: u32 = 1 << 10;
const DR_OE: u32 = 1 << 11;
const DR_DATA: u32 = 0xFF;

const LCRH_FEN: u32 = 1 << 4;
const LCRH_WLEN_8: u32 = 0b11 << 5;

const CR_UARTEN: u32 = 1 << 0;
const CR_TXE: u32 = 1 << 8;
const CR_RXE: u32 = 1 << 9;

/// Every interrupt source the PL011 implements.
const ALL_INTERRUPTS: u32 = 0x7F2;
const CLEAR_ALL_INTERRUPTS: u32 = 0x7FF;

const PINS_TXD_RXD: u32 = (1 << 14) | (1 << 15);
const PULL_SETTLE_CYCLES: u32 = 150;

/// Serial error
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Framing error
    Framing,
    /// Parity check error
    Parity,
    /// Break condition on the line
    Break,
    /// RX FIFO overrun
    Overrun,
}

impl From<Error> for error::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Framing => error::Error::LineError("Framing"),
            Error::Parity => error::Error::LineError("Parity"),
            Error::Break => error::Error::LineError("Break"),
            Error::Overrun => error::Error::LineError("Overrun"),
        }
    }
}

pub mod config {
    use crate::hal::time::{Bps, Hertz, U32Ext};

    pub struct Config {
        /// Reference clock feeding the UART.
        pub clock: Hertz,
        pub baudrate: Bps,
    }

    impl Config {
        pub fn baudrate(mut self, baudrate: Bps) -> Self {
            self.baudrate = baudrate;
            self
        }

        pub fn clock<F: Into<Hertz>>(mut self, clock: F) -> Self {
            self.clock = clock.into();
            self
        }

        /// Integer and fractional baud rate divisors.
        ///
        /// The divisor is `clock / (16 * baud)`, with the fraction
        /// expressed in 64ths and rounded to nearest.
        pub fn divisors(&self) -> Result<(u32, u32), InvalidConfig> {
            if self.baudrate.0 == 0 {
                return Err(InvalidConfig);
            }
            let baud = self.baudrate.0 as u64;
            let sixty_fourths = (4 * self.clock.0 as u64 + baud / 2) / baud;
            let (integer, fraction) = (sixty_fourths >> 6, sixty_fourths & 0x3F);
            if integer == 0 || integer > 0xFFFF {
                return Err(InvalidConfig);
            }
            Ok((integer as u32, fraction as u32))
        }
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct InvalidConfig;

    impl Default for Config {
        fn default() -> Config {
            Config { clock: 3.mhz().into(), baudrate: 115_200.bps() }
        }
    }
}

/// UART0, 8N1 with FIFOs enabled and every interrupt masked.
pub struct Pl011 {
    gpio: *mut u32,
    uart: *mut u32,
    line_error: Option<Error>,
}

impl Pl011 {
    /// Brings up UART0 and routes it to GPIO 14/15.
    ///
    /// # Safety
    ///
    /// `gpio_base` must be the address of the GPIO register block
    /// (or of a `WINDOW_SIZE` byte stand in for it), and nothing else
    /// may access those registers while the driver lives.
    pub unsafe fn new(gpio_base: usize, config: config::Config) -> Result<Self, config::InvalidConfig> {
        let (integer, fraction) = config.divisors()?;
        let uart = Pl011 {
            gpio: gpio_base as *mut u32,
            uart: (gpio_base + UART0_OFFSET) as *mut u32,
            line_error: None,
        };

        uart.write_uart(CR, 0);

        // Disable pull up/down on the TX/RX pins. The clock has to be
        // held for a while for the new control signal to latch.
        uart.write_gpio(GPPUD, 0);
        delay(PULL_SETTLE_CYCLES);
        uart.write_gpio(GPPUDCLK0, PINS_TXD_RXD);
        delay(PULL_SETTLE_CYCLES);
        uart.write_gpio(GPPUDCLK0, 0);

        uart.write_uart(ICR, CLEAR_ALL_INTERRUPTS);
        uart.write_uart(IBRD, integer);
        uart.write_uart(FBRD, fraction);
        uart.write_uart(LCRH, LCRH_FEN | LCRH_WLEN_8);
        uart.write_uart(IMSC, ALL_INTERRUPTS);
        uart.write_uart(CR, CR_UARTEN | CR_TXE | CR_RXE);
        Ok(uart)
    }

    fn read_uart(&self, offset: usize) -> u32 {
        // NOTE(Safety) offset lies within the register window handed to `new`
        unsafe { ptr::read_volatile(self.uart.add(offset / 4)) }
    }

    fn write_uart(&self, offset: usize, value: u32) {
        // NOTE(Safety) offset lies within the register window handed to `new`
        unsafe { ptr::write_volatile(self.uart.add(offset / 4), value) }
    }

    fn write_gpio(&self, offset: usize, value: u32) {
        // NOTE(Safety) offset lies within the register window handed to `new`
        unsafe { ptr::write_volatile(self.gpio.add(offset / 4), value) }
    }
}

fn line_error(data: u32) -> Option<Error> {
    if data & DR_OE != 0 {
        Some(Error::Overrun)
    } else if data & DR_BE != 0 {
        Some(Error::Break)
    } else if data & DR_PE != 0 {
        Some(Error::Parity)
    } else if data & DR_FE != 0 {
        Some(Error::Framing)
    } else {
        None
    }
}

impl serial::Read<u8> for Pl011 {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        if self.read_uart(FR) & FR_RXFE != 0 {
            return Err(nb::Error::WouldBlock);
        }

        // Line errors travel alongside the character they corrupted
        let data = self.read_uart(DR);
        if self.line_error.is_none() {
            self.line_error = line_error(data);
        }
        Ok((data & DR_DATA) as u8)
    }
}

impl serial::LineStatus for Pl011 {
    type Fault = Error;

    fn take_fault(&mut self) -> Option<Error> { self.line_error.take() }
}

impl serial::Write<u8> for Pl011 {
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        if self.read_uart(FR) & FR_TXFF != 0 {
            Err(nb::Error::WouldBlock)
        } else {
            self.write_uart(DR, byte as u32);
            Ok(())
        }
    }
}

/// Burns roughly `cycles` cycles without the compiler eliding the loop.
pub fn delay(cycles: u32) {
    for _ in 0..cycles {
        #[cfg(target_arch = "arm")]
        // NOTE(Safety) a single nop has no effects
        unsafe {
            core::arch::asm!("nop")
        };
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod test {
    use super::{config::*, *};
    use crate::hal::{
        serial::{LineStatus, Read, Write},
        time::U32Ext,
    };

    struct FakeRegisters {
        words: Vec<u32>,
    }

    impl FakeRegisters {
        fn new() -> Self { Self { words: vec![0u32; WINDOW_SIZE / 4] } }
        fn base(&mut self) -> usize { self.words.as_mut_ptr() as usize }
        fn uart(&self, offset: usize) -> u32 { self.words[(UART0_OFFSET + offset) / 4] }
        fn set_uart(&mut self, offset: usize, value: u32) {
            self.words[(UART0_OFFSET + offset) / 4] = value;
        }
        fn gpio(&self, offset: usize) -> u32 { self.words[offset / 4] }
    }

    #[test]
    fn default_divisors_match_115200_baud_from_3mhz() {
        assert_eq!(Ok((1, 40)), Config::default().divisors());
    }

    #[test]
    fn divisors_follow_the_clock() {
        let config = Config::default().clock(48.mhz()).baudrate(115_200.bps());
        assert_eq!(Ok((26, 3)), config.divisors());
        assert_eq!(Err(InvalidConfig), Config::default().baudrate(0.bps()).divisors());
        assert_eq!(Err(InvalidConfig), Config::default().baudrate(1_000_000.bps()).divisors());
    }

    #[test]
    fn initialisation_programs_frame_and_masks_interrupts() {
        // Given
        let mut registers = FakeRegisters::new();

        // When
        let _uart = unsafe { Pl011::new(registers.base(), Config::default()) }.unwrap();

        // Then
        assert_eq!(1, registers.uart(IBRD));
        assert_eq!(40, registers.uart(FBRD));
        assert_eq!(0x70, registers.uart(LCRH));
        assert_eq!(0x7F2, registers.uart(IMSC));
        assert_eq!(0x7FF, registers.uart(ICR));
        assert_eq!(0x301, registers.uart(CR));
        assert_eq!(0, registers.gpio(GPPUD));
        assert_eq!(0, registers.gpio(GPPUDCLK0));
    }

    #[test]
    fn reading_and_writing_follow_the_fifo_flags() {
        let mut registers = FakeRegisters::new();
        let mut uart = unsafe { Pl011::new(registers.base(), Config::default()) }.unwrap();

        registers.set_uart(FR, FR_RXFE | FR_TXFF);
        assert!(matches!(uart.read(), Err(nb::Error::WouldBlock)));
        assert!(matches!(uart.write(b'x'), Err(nb::Error::WouldBlock)));

        registers.set_uart(FR, 0);
        registers.set_uart(DR, b'A' as u32);
        assert!(matches!(uart.read(), Ok(b'A')));
        uart.write(b'z').unwrap();
        assert_eq!(b'z' as u32, registers.uart(DR));
    }

    #[test]
    fn overrun_on_a_payload_byte_keeps_the_stream_in_step() {
        // Given
        let mut registers = FakeRegisters::new();
        let mut uart = unsafe { Pl011::new(registers.base(), Config::default()) }.unwrap();
        registers.set_uart(FR, 0);

        // When a payload byte arrives flagged as overrun
        registers.set_uart(DR, DR_OE | 0xE3);
        let corrupted = uart.read();

        // Then the byte is still delivered and the error is latched
        assert!(matches!(corrupted, Ok(0xE3)));
        assert_eq!(Some(Error::Overrun), uart.take_fault());
        assert_eq!(None, uart.take_fault());
    }

    #[test]
    fn first_line_error_wins_until_taken() {
        let mut registers = FakeRegisters::new();
        let mut uart = unsafe { Pl011::new(registers.base(), Config::default()) }.unwrap();
        registers.set_uart(FR, 0);

        registers.set_uart(DR, DR_FE);
        assert!(matches!(uart.read(), Ok(0)));
        registers.set_uart(DR, DR_PE | b'B' as u32);
        assert!(matches!(uart.read(), Ok(b'B')));
        registers.set_uart(DR, b'C' as u32);
        assert!(matches!(uart.read(), Ok(b'C')));

        assert_eq!(Some(Error::Framing), uart.take_fault());
        assert_eq!(crate::error::Error::LineError("Framing"), Error::Framing.into());
    }
}
