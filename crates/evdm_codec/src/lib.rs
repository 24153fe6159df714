//! # evdm codec
//!
//! CBOR encoding for the evdm block format.
//!
//! The event data model itself is format agnostic: payload buffers,
//! reference sequences and parameters are plain serde types. This crate is
//! the one place where they are turned into bytes, so every backend built
//! on top of it agrees on the encoding.
//!
//! ## Rules
//!
//! - One value per buffer: trailing bytes after the value are an error
//! - Definite lengths only (what `ciborium` emits for serde types)
//! - Floats are allowed, including NaN, as detector data needs them
//!
//! ## Usage
//!
//! ```
//! use evdm_codec::{from_cbor, to_cbor};
//!
//! let energies = vec![1.0_f32, 2.5, 3.25];
//! let bytes = to_cbor(&energies).unwrap();
//! let decoded: Vec<f32> = from_cbor(&bytes).unwrap();
//! assert_eq!(energies, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::{from_cbor, Decode};
pub use encoder::{to_cbor, Encode};
pub use error::{CodecError, CodecResult};
