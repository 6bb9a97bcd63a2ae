#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Bit-exact arithmetic coding and rANS entropy coding against caller-supplied
//! cumulative distribution functions (CDFs).
//!
//! This crate does not model probabilities: callers own their own statistics
//! and hand this crate a quantized CDF (`cdf[0] == 0`, `cdf[K] == 1 <<
//! precision`, non-decreasing, `1 <= precision <= 16`) alongside each symbol.
//! Two independent codecs are provided, sharing the same CDF contract and
//! error taxonomy but with different wire formats and use cases:
//!
//! * [`ac`] — a Witten-Neal-Cleary binary arithmetic coder, writing a single
//!   MSB-first bitstream. Symbols must be decoded in the order they were
//!   encoded.
//! * [`rans`] — a rANS coder built on a single 32-bit state register.
//!   Symbols are decoded in the *reverse* of encode order, which also makes
//!   it usable interactively: encode a run, then decode it straight back
//!   without ever calling `flush`.
//!
//! Both codecs support single-symbol, `nx1` (one shared CDF reused across a
//! batch) and `nxn` (one CDF row per symbol) entry points; batch entry
//! points are defined to be bit-identical to looping the single-symbol call.

pub mod ac;
mod bitstream;
mod error;
pub mod rans;

pub use error::CodecError;
