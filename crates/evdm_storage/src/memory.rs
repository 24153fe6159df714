//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory event file.
///
/// Cloning an `InMemoryBackend` yields a second handle onto the **same**
/// buffer, so a writer and a reader can operate on one "file" without
/// touching the file system:
///
/// ```rust
/// use evdm_storage::{InMemoryBackend, StorageBackend};
///
/// let mut writer = InMemoryBackend::new();
/// let reader = writer.read_only();
/// writer.append(b"frame").unwrap();
/// assert_eq!(reader.size().unwrap(), 5);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    read_only: bool,
}

impl InMemoryBackend {
    /// Creates a new empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding pre-existing bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            read_only: false,
        }
    }

    /// Returns a read-only handle onto the same buffer.
    #[must_use]
    pub fn read_only(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: true,
        }
    }

    /// Returns a copy of the buffer contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"head").unwrap(), 0);
        assert_eq!(backend.append(b"er").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 6);
        assert_eq!(backend.read_at(2, 3).unwrap(), b"ade");
    }

    #[test]
    fn clones_share_the_buffer() {
        let mut writer = InMemoryBackend::new();
        let copy = writer.clone();
        writer.append(b"abc").unwrap();
        assert_eq!(copy.data(), b"abc");
    }

    #[test]
    fn read_only_handle_rejects_append() {
        let writer = InMemoryBackend::with_data(b"xyz".to_vec());
        let mut reader = writer.read_only();
        assert!(reader.is_read_only());
        assert!(matches!(reader.append(b"!"), Err(StorageError::ReadOnly)));
        assert_eq!(reader.read_at(0, 3).unwrap(), b"xyz");
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::with_data(vec![0; 8]);
        assert!(matches!(
            backend.read_at(6, 4),
            Err(StorageError::ReadPastEnd { size: 8, .. })
        ));
        assert!(backend.read_at(8, 0).unwrap().is_empty());
    }
}
