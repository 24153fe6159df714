//! Library and file versions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The version of this library as a string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A `major.minor.patch` version triple.
///
/// Versions order lexicographically by their components and pack into a
/// single `u64` for storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    /// Major component.
    pub major: u16,
    /// Minor component.
    pub minor: u16,
    /// Patch component.
    pub patch: u16,
}

/// How strictly two versions must agree to be considered compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Any version not newer than the reference.
    AnyNewer,
    /// Same major version.
    SameMajor,
    /// Same major and minor version.
    SameMinor,
    /// Identical versions.
    Exact,
}

impl Version {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Packs the version as `major << 32 | minor << 16 | patch`.
    #[must_use]
    pub const fn encode(self) -> u64 {
        ((self.major as u64) << 32) | ((self.minor as u64) << 16) | self.patch as u64
    }

    /// Unpacks a version produced by [`encode`](Self::encode). Bits above
    /// the major component are ignored.
    #[must_use]
    pub const fn decode(value: u64) -> Self {
        Self {
            major: (value >> 32) as u16,
            minor: (value >> 16) as u16,
            patch: value as u16,
        }
    }

    /// Returns `true` if data written by `other` can be handled by a
    /// program at version `self` under `policy`.
    ///
    /// `AnyNewer` accepts every `other` that is not newer than `self`.
    #[must_use]
    pub fn compatible(self, other: Self, policy: Compatibility) -> bool {
        match policy {
            Compatibility::AnyNewer => other <= self,
            Compatibility::SameMajor => other.major == self.major,
            Compatibility::SameMinor => other.major == self.major && other.minor == self.minor,
            Compatibility::Exact => other == self,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

const fn parse_component(text: &str) -> u16 {
    let bytes = text.as_bytes();
    let mut value: u16 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            break;
        }
        value = value * 10 + (digit - b'0') as u16;
        i += 1;
    }
    value
}

/// The version this library was built as.
pub const BUILD_VERSION: Version = Version::new(
    parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
    parse_component(env!("CARGO_PKG_VERSION_MINOR")),
    parse_component(env!("CARGO_PKG_VERSION_PATCH")),
);

/// Returns [`BUILD_VERSION`].
#[must_use]
pub const fn build_version() -> Version {
    BUILD_VERSION
}
