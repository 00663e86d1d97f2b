//! Modbus framing and PDU codecs in pure Rust.
//!
//! `pollmod-core` provides zero-copy, `no_std`-compatible encoding and
//! decoding of Modbus Application Data Units for the RTU (CRC16), ASCII
//! (hex + LRC) and TCP (MBAP) wire formats, plus typed PDU builders and
//! parsers for the common function codes.
//!
//! Everything here is stateless and allocation-free: codecs read from and
//! write into caller-owned buffers, and decoded views borrow their input.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod encoding;
pub mod error;
pub mod frame;
pub mod pdu;

pub use error::{DecodeError, EncodeError};
pub use frame::AduView;
