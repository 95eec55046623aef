//! Register word utilities
//!
//! Conversions between 16-bit holding-register words and the wider values
//! and byte strings the ENO one register map stores in them. Multi-register
//! values always use big-endian word order (first register = high word).

pub mod conversions;

pub use conversions::*;
