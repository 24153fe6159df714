//! Block file backend for frames.
//!
//! A frame file is a sequence of blocks appended to a
//! [`StorageBackend`](evdm_storage::StorageBackend):
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | tag len (2) | payload len (4) | tag | payload | crc32 (4) |
//! ```
//!
//! Frame blocks are tagged with their category and carry the CBOR encoded
//! parameters and collection buffers of one frame. A single metadata block
//! at the end, written by [`FrameWriter::finish`], records the writer
//! version and the collections of each category.
//!
//! ## Failure policy
//!
//! - Bad magic, unknown block kinds, future format versions and truncated
//!   blocks fail the open with [`InvalidFormat`](crate::CoreError::InvalidFormat)
//! - CRC mismatches fail with [`ChecksumMismatch`](crate::CoreError::ChecksumMismatch)
//!   when the frame is read, unless checksum verification is disabled
//! - A missing metadata block (writer never finished) is only logged

mod format;
mod reader;
mod writer;

pub use format::{
    compute_crc32, BlockKind, CategoryMetadata, CollectionInfo, FrameBlock, MetadataBlock,
    RawCollection, BLOCK_MAGIC, FORMAT_VERSION,
};
pub use reader::{FrameData, FrameReader};
pub use writer::FrameWriter;
