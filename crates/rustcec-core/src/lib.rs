//! HDMI-CEC protocol types and frame coding in pure Rust.
//!
//! `rustcec-core` provides allocation-free encoding and decoding of CEC
//! frames together with the address, opcode, and operand types the rest of
//! the rustcec crate family builds on. It is `no_std`-compatible and can be
//! used standalone on embedded CEC controllers.
//!
//! # Feature flags
//!
//! - **`std`** (default): enables `std::error::Error` implementations.
//! - **`serde`**: derives `Serialize`/`Deserialize` on core types.
//! - **`defmt`**: derives `defmt::Format` for embedded logging.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

/// Zero-copy reader/writer over caller-owned frame buffers.
pub mod encoding;
/// Error types for encoding and decoding operations.
pub mod error;
/// CEC frames and the builders for the messages this crate family exchanges.
pub mod message;
/// Addresses, opcodes, and operand types.
pub mod types;

pub use error::{DecodeError, EncodeError};
pub use message::CecMessage;
