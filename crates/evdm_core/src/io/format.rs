//! Block framing and block contents.

use crate::buffers::{RelationBuffer, VectorMemberBuffer};
use crate::error::{CoreError, CoreResult};
use crate::parameters::GenericParameters;
use crate::types::{CollectionId, SchemaVersion};
use crate::version::Version;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Magic bytes opening every block.
pub const BLOCK_MAGIC: [u8; 4] = *b"EVDM";

/// Current block format version.
pub const FORMAT_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + tag length (2) + payload length (4)
pub(crate) const HEADER_SIZE: usize = 13;

pub(crate) const CRC_SIZE: usize = 4;

/// What a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    /// One frame of a category; the tag is the category name.
    Frame = 1,
    /// File metadata written on finish; the tag is empty.
    Metadata = 2,
}

impl BlockKind {
    /// Converts a byte to a block kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Frame),
            2 => Some(Self::Metadata),
            _ => None,
        }
    }

    /// Converts the block kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Describes one collection of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Collection id.
    pub id: CollectionId,
    /// Collection type name, e.g. `HitCollection`.
    pub type_name: String,
    /// Whether the collection only references records of other collections.
    pub subset: bool,
    /// Schema version the buffers were written with.
    pub schema_version: SchemaVersion,
}

/// One collection as stored in a frame block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCollection {
    /// Identity and type of the collection.
    pub info: CollectionInfo,
    /// Encoded payload; absent for subset collections.
    pub payload: Option<Bytes>,
    /// Reference columns.
    pub references: Vec<RelationBuffer>,
    /// Vector member columns.
    pub vector_members: Vec<VectorMemberBuffer>,
}

/// Contents of a frame block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameBlock {
    /// Frame parameters.
    pub parameters: GenericParameters,
    /// Collections, sorted by name.
    pub collections: Vec<RawCollection>,
}

/// Per-category part of the metadata block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetadata {
    /// Collections every frame of the category carries.
    pub collections: Vec<CollectionInfo>,
    /// Number of frames written.
    pub entries: u64,
}

/// Contents of the metadata block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBlock {
    /// Library version of the writer.
    pub writer_version: Version,
    /// Categories by name.
    pub categories: BTreeMap<String, CategoryMetadata>,
}

/// Parsed fixed-size part of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub kind: BlockKind,
    pub tag_len: usize,
    pub payload_len: usize,
}

impl BlockHeader {
    /// Parses and validates a header found at `offset`.
    pub(crate) fn parse(bytes: &[u8], offset: u64) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "truncated block header at offset {offset}"
            )));
        }
        if bytes[0..4] != BLOCK_MAGIC {
            return Err(CoreError::invalid_format(format!(
                "invalid magic at offset {offset}"
            )));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported format version {version} at offset {offset}"
            )));
        }

        let kind = BlockKind::from_byte(bytes[6]).ok_or_else(|| {
            CoreError::invalid_format(format!(
                "unknown block kind {} at offset {offset}",
                bytes[6]
            ))
        })?;
        let tag_len = u16::from_le_bytes([bytes[7], bytes[8]]) as usize;
        let payload_len = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;

        Ok(Self {
            kind,
            tag_len,
            payload_len,
        })
    }

    /// Length of the whole block including the checksum.
    pub(crate) fn total_len(&self) -> usize {
        HEADER_SIZE + self.tag_len + self.payload_len + CRC_SIZE
    }
}

/// Frames `payload` as a block of `kind` tagged with `tag`.
pub(crate) fn encode_block(
    kind: BlockKind,
    tag: &str,
    payload: &[u8],
    max_block_size: u32,
) -> CoreResult<Vec<u8>> {
    let tag_len = u16::try_from(tag.len())
        .map_err(|_| CoreError::invalid_operation(format!("block tag '{tag}' too long")))?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("block payload too large"))?;
    let total = HEADER_SIZE + tag.len() + payload.len() + CRC_SIZE;
    if total > max_block_size as usize {
        return Err(CoreError::invalid_operation(format!(
            "block of {total} bytes exceeds the limit of {max_block_size}"
        )));
    }

    let mut data = Vec::with_capacity(total);
    data.extend_from_slice(&BLOCK_MAGIC);
    data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    data.push(kind.as_byte());
    data.extend_from_slice(&tag_len.to_le_bytes());
    data.extend_from_slice(&payload_len.to_le_bytes());
    data.extend_from_slice(tag.as_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Splits a complete block into its tag and payload, checking the CRC if
/// `verify` is set.
pub(crate) fn split_block<'a>(
    header: &BlockHeader,
    block: &'a [u8],
    verify: bool,
) -> CoreResult<(&'a str, &'a [u8])> {
    if block.len() != header.total_len() {
        return Err(CoreError::invalid_format(format!(
            "block has {} bytes, header announces {}",
            block.len(),
            header.total_len()
        )));
    }

    let body_end = block.len() - CRC_SIZE;
    if verify {
        let stored = u32::from_le_bytes([
            block[body_end],
            block[body_end + 1],
            block[body_end + 2],
            block[body_end + 3],
        ]);
        let computed = compute_crc32(&block[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }
    }

    let tag_end = HEADER_SIZE + header.tag_len;
    let tag = std::str::from_utf8(&block[HEADER_SIZE..tag_end])
        .map_err(|_| CoreError::invalid_format("block tag is not UTF-8"))?;
    Ok((tag, &block[tag_end..body_end]))
}

/// CRC32 used for block checksums.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
