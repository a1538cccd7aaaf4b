//! # Raspbootin Library
//!
//! This crate contains all functionality of the serial kernel
//! loader in library form. The `raspbootin` binary only wires it
//! to the boot registers and the hardware.
#![cfg_attr(test, allow(unused_imports))]
#![cfg_attr(target_arch = "arm", no_std)]

extern crate static_assertions;

#[macro_use]
pub mod hal;
pub mod devices;
pub mod drivers;
pub mod error;
pub mod protocol;
