//! Error types for evdm core.

use crate::types::{CollectionId, ObjectId, SchemaVersion};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in evdm core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] evdm_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] evdm_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No name is known for a collection id.
    #[error("no collection name for id {id}")]
    CollectionIdNotFound {
        /// The id that was looked up.
        id: CollectionId,
    },

    /// No id is known for a collection name.
    #[error("no collection id for name '{name}'")]
    CollectionNameNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A collection is neither registered nor available from the backend.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A collection with the same name is already registered.
    #[error("collection '{name}' is already registered")]
    CollectionExists {
        /// Name of the collection.
        name: String,
    },

    /// Two different names hash to the same collection id.
    #[error("collection name '{name}' collides with '{existing}'")]
    CollectionIdCollision {
        /// The name being added.
        name: String,
        /// The name already owning the id.
        existing: String,
    },

    /// A parameter key is absent for the requested value type.
    #[error("no {type_name} parameter '{key}'")]
    ParameterNotFound {
        /// The key that was looked up.
        key: String,
        /// The value type that was requested.
        type_name: &'static str,
    },

    /// A record or collection has a different type than requested.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The requested type.
        expected: String,
        /// The type actually present.
        actual: String,
    },

    /// Buffers or references do not fit together.
    #[error("structural inconsistency: {message}")]
    StructuralInconsistency {
        /// Description of the inconsistency.
        message: String,
    },

    /// A reference has not been bound to its target record yet.
    #[error("unresolved reference to {id}")]
    UnresolvedReference {
        /// The unbound reference.
        id: ObjectId,
    },

    /// No collection factory is registered for a type and version.
    #[error("unknown collection type {type_name} (schema version {version})")]
    UnknownType {
        /// Collection type name.
        type_name: String,
        /// Requested schema version.
        version: SchemaVersion,
    },

    /// The frames written to a category do not share one collection list.
    #[error(
        "inconsistent collections for category '{category}': missing {missing:?}, extra {extra:?}"
    )]
    InconsistentCategory {
        /// The category being written.
        category: String,
        /// Collections of the first frame absent from this one.
        missing: Vec<String>,
        /// Collections of this frame absent from the first one.
        extra: Vec<String>,
    },

    /// Block checksum did not match.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Invalid file format or version.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Invalid operation for the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a structural inconsistency error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::StructuralInconsistency {
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
