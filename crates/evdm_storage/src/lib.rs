//! # evdm storage
//!
//! Byte-store backends underneath the evdm event file format.
//!
//! A backend is an **opaque, append-only byte store**. It knows nothing
//! about frames, collections or blocks: the block layout, checksums and
//! indexing all live in `evdm_core::io`. This keeps the persistence seam
//! of the event data model narrow enough that a backend can be a file, a
//! memory buffer or anything else that can append and read back bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - shared in-process buffer, mainly for tests
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use evdm_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"event block").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"event");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, OpenMode};
pub use memory::InMemoryBackend;
