//! Frame file configuration.

/// Configuration shared by [`FrameWriter`](crate::io::FrameWriter) and
/// [`FrameReader`](crate::io::FrameReader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Whether to sync the backend after every written block.
    pub sync_on_write: bool,

    /// Whether the reader checks the CRC of every block it decodes.
    pub verify_checksums: bool,

    /// Largest block (header, tag and payload) accepted on write and read.
    pub max_block_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_write: false,
            verify_checksums: true,
            max_block_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every block.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to verify block checksums on read.
    #[must_use]
    pub const fn verify_checksums(mut self, value: bool) -> Self {
        self.verify_checksums = value;
        self
    }

    /// Sets the maximum block size.
    #[must_use]
    pub const fn max_block_size(mut self, size: u32) -> Self {
        self.max_block_size = size;
        self
    }
}
