//! Raspberry Pi models the loader knows how to drive.
//!
//! The firmware does not say which model it booted on, but it does
//! pass a kernel command line whose disk LED setting differs between
//! models.

/// Board descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub model: &'static str,
    /// Physical address of the peripheral window.
    pub peripherals_base: usize,
    pub disk_led_gpio: u8,
    pub disk_led_active_low: bool,
}

pub const RASPBERRY_PI: Board = Board {
    model: "Raspberry Pi b",
    peripherals_base: 0x2000_0000,
    disk_led_gpio: 16,
    disk_led_active_low: true,
};

pub const RASPBERRY_PI_PLUS: Board = Board {
    model: "Raspberry Pi b+",
    peripherals_base: 0x2000_0000,
    disk_led_gpio: 47,
    disk_led_active_low: false,
};

pub const RASPBERRY_PI_2: Board = Board {
    model: "Raspberry Pi b 2",
    peripherals_base: 0x3F00_0000,
    disk_led_gpio: 47,
    disk_led_active_low: false,
};

const PLUS_MARKER: &str = "bcm2708.disk_led_gpio=47";
const PI_2_MARKER: &str = "bcm2709.disk_led_gpio=47";

impl Board {
    /// Picks the board from the kernel command line, falling back to
    /// the first model.
    pub fn detect(cmdline: Option<&str>) -> &'static Board {
        match cmdline {
            Some(cmdline) if cmdline.contains(PI_2_MARKER) => &RASPBERRY_PI_2,
            Some(cmdline) if cmdline.contains(PLUS_MARKER) => &RASPBERRY_PI_PLUS,
            _ => &RASPBERRY_PI,
        }
    }

    /// Base of the GPIO block, which UART0 sits right after.
    pub fn gpio_base(&self) -> usize { self.peripherals_base + crate::drivers::pl011::GPIO_OFFSET }
}
