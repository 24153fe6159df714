//! # evdm testkit
//!
//! Test utilities for evdm.
//!
//! This crate provides:
//! - An example datamodel exercising relations, self references, cycles
//!   and vector members
//! - Frame fixtures and in-memory or file round trips
//! - Property-based test generators using proptest
//! - Cross-crate integration test helpers
//!
//! ## Usage
//!
//! ```rust
//! use evdm_testkit::prelude::*;
//!
//! let mut frame = scenarios::calorimeter_frame(2, 3);
//! let mut read_back = roundtrip(&mut frame);
//! checks::check_calorimeter_links(&mut read_back);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod datamodel;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::datamodel::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
