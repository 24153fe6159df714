//! Core identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Version of a datamodel type's layout, starting at 1.
pub type SchemaVersion = u32;

/// Identifier of a named collection within a frame.
///
/// Ids are derived from the collection name, so the same name maps to the
/// same id in every frame and every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Reserved id carried by records and references outside any named collection.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a collection id from its raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Derives the id of a collection name.
    ///
    /// The 64-bit xxh3 hash is truncated to its low 32 bits. The result may
    /// be [`CollectionId::INVALID`], which callers must reject.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()) as u32)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `false` for the reserved invalid id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{:08x}", self.0)
    }
}

/// Stable reference to one record: its collection and position.
///
/// A record that has not been added to a collection carries
/// [`ObjectId::UNTRACKED_INDEX`]; a reference to nothing is
/// [`ObjectId::NULL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Collection holding the record.
    pub collection_id: CollectionId,
    /// Position of the record within its collection.
    pub index: i32,
}

impl ObjectId {
    /// Index of a record not owned by any collection.
    pub const UNTRACKED_INDEX: i32 = -1;
    /// Index of the null reference.
    pub const INVALID_INDEX: i32 = -2;

    /// The null reference.
    pub const NULL: Self = Self {
        collection_id: CollectionId::INVALID,
        index: Self::INVALID_INDEX,
    };

    /// Id of a freshly created record.
    pub const UNTRACKED: Self = Self {
        collection_id: CollectionId::INVALID,
        index: Self::UNTRACKED_INDEX,
    };

    /// Creates a reference to `index` in `collection_id`.
    #[must_use]
    pub const fn new(collection_id: CollectionId, index: i32) -> Self {
        Self {
            collection_id,
            index,
        }
    }

    /// Returns `true` for the null reference.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == Self::INVALID_INDEX
    }

    /// Returns `true` if the record has not been added to a collection.
    #[must_use]
    pub const fn is_untracked(self) -> bool {
        self.index == Self::UNTRACKED_INDEX
    }

    /// Returns `true` if this id names a record in a registered collection.
    #[must_use]
    pub const fn is_persistable(self) -> bool {
        self.collection_id.is_valid() && self.index >= 0
    }

    /// Returns the index as a position, if it is one.
    #[must_use]
    pub fn position(self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::UNTRACKED
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.collection_id, self.index)
    }
}
