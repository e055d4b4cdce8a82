//! Platform-agnostic embedded-hal driver for the MAX1720x battery fuel gauges.
#![no_std]

#[cfg(test)]
extern crate std;

pub mod max1720x;

pub use crate::max1720x::{decode_signed, decode_unsigned, Error, Measurements, Status, MAX1720x};
