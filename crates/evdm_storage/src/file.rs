//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a [`FileBackend`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the file, discarding any previous contents.
    Recreate,
    /// Open an existing file (or create it) and append to its end.
    Append,
    /// Open an existing file for reading only.
    ReadOnly,
}

/// A single event file on the local file system.
///
/// Writers normally use [`OpenMode::Recreate`], readers
/// [`OpenMode::ReadOnly`].
///
/// ```no_run
/// use evdm_storage::{FileBackend, OpenMode, StorageBackend};
/// use std::path::Path;
///
/// let mut file = FileBackend::open(Path::new("events.evdm"), OpenMode::Recreate).unwrap();
/// file.append(b"block").unwrap();
/// file.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    mode: OpenMode,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens the file at `path` in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::FileNotFound`] when a read-only open targets a
    /// missing file, and I/O errors otherwise.
    pub fn open(path: &Path, mode: OpenMode) -> StorageResult<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Recreate => options.read(true).write(true).create(true).truncate(true),
            OpenMode::Append => options.read(true).write(true).create(true).truncate(false),
            OpenMode::ReadOnly => options.read(true),
        };

        let file = options.open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => StorageError::Io(e),
        })?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            file: Mutex::new(file),
            size,
        })
    }

    /// Creates (or truncates) a file, creating parent directories first.
    pub fn create_with_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, OpenMode::Recreate)
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the mode the file was opened with.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StorageError::ReadOnly);
        }
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.get_mut().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.mode != OpenMode::ReadOnly {
            self.file.get_mut().sync_all()?;
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn recreate_discards_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.evdm");

        {
            let mut backend = FileBackend::open(&path, OpenMode::Recreate).unwrap();
            backend.append(b"first run").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, OpenMode::Recreate).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn append_mode_continues_after_existing_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.evdm");

        {
            let mut backend = FileBackend::open(&path, OpenMode::Recreate).unwrap();
            backend.append(b"abc").unwrap();
        }

        let mut backend = FileBackend::open(&path, OpenMode::Append).unwrap();
        assert_eq!(backend.append(b"def").unwrap(), 3);
        assert_eq!(backend.read_at(0, 6).unwrap(), b"abcdef");
    }

    #[test]
    fn read_only_sees_written_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.evdm");

        {
            let mut backend = FileBackend::open(&path, OpenMode::Recreate).unwrap();
            backend.append(b"persistent frame").unwrap();
            backend.sync().unwrap();
        }

        let mut backend = FileBackend::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(backend.is_read_only());
        assert_eq!(backend.read_at(11, 5).unwrap(), b"frame");
        assert!(matches!(backend.append(b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(
            backend.read_at(10, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn read_only_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let result = FileBackend::open(&dir.path().join("missing.evdm"), OpenMode::ReadOnly);
        assert!(matches!(result, Err(StorageError::FileNotFound { .. })));
    }

    #[test]
    fn create_with_dirs_builds_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run").join("0001").join("events.evdm");

        let backend = FileBackend::create_with_dirs(&path).unwrap();
        assert_eq!(backend.path(), path);
        assert_eq!(backend.mode(), OpenMode::Recreate);
        assert!(path.exists());
    }
}
