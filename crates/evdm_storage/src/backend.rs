//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding one event file.
///
/// Writers append whole blocks and readers address them by the offset
/// returned from [`append`](StorageBackend::append). Nothing is ever
/// rewritten in place.
///
/// # Invariants
///
/// - `append` returns the offset of the first appended byte
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - `size` is the offset the next `append` will write to
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data and returns the offset where it was written.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or when the backend is read-only.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes down to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Returns `true` if [`append`](StorageBackend::append) is rejected.
    fn is_read_only(&self) -> bool {
        false
    }
}
