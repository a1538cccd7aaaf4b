//! Test doubles for the HAL interfaces. Only built for the
//! development host.
pub mod error;
pub mod serial;
