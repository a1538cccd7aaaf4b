//! Low level hardware drivers, implementing the interfaces in `hal`.

pub mod pl011;
