//! Writing frames into a block file.

use super::format::{
    encode_block, BlockKind, CategoryMetadata, CollectionInfo, FrameBlock, MetadataBlock,
    RawCollection,
};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::version::BUILD_VERSION;
use bytes::Bytes;
use evdm_storage::{FileBackend, OpenMode, StorageBackend};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Writes frames, grouped into categories, to a storage backend.
///
/// The first frame written to a category fixes the collections of that
/// category. Every later frame of the category must carry the same
/// collections. [`finish`](Self::finish) appends a metadata block
/// describing all categories; dropping an unfinished writer finishes it.
///
/// ```
/// use evdm_core::{Frame, FrameWriter};
/// use evdm_storage::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// let mut writer = FrameWriter::new(Box::new(backend.clone()), Default::default()).unwrap();
/// let mut frame = Frame::new();
/// frame.parameters_mut().set_value("run", 7_i32);
/// writer.write_frame(&mut frame, "events").unwrap();
/// writer.finish().unwrap();
/// assert!(!backend.data().is_empty());
/// ```
pub struct FrameWriter {
    backend: Box<dyn StorageBackend>,
    config: Config,
    categories: BTreeMap<String, CategoryMetadata>,
    finished: bool,
}

impl FrameWriter {
    /// Creates a writer appending to `backend`.
    ///
    /// # Errors
    ///
    /// Fails if the backend is read-only.
    pub fn new(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        if backend.is_read_only() {
            return Err(CoreError::invalid_operation(
                "cannot write frames to a read-only backend",
            ));
        }
        Ok(Self {
            backend,
            config,
            categories: BTreeMap::new(),
            finished: false,
        })
    }

    /// Creates a writer for a new file at `path`, replacing any existing
    /// file.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from creating the file.
    pub fn create(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        info!("Creating frame file {:?}", path);
        let backend = FileBackend::open(path, OpenMode::Recreate)?;
        Self::new(Box::new(backend), Config::default())
    }

    /// Writes every collection of `frame`, including the ones its source
    /// has not handed out yet.
    ///
    /// # Errors
    ///
    /// See [`write_frame_collections`](Self::write_frame_collections).
    pub fn write_frame(&mut self, frame: &mut Frame, category: &str) -> CoreResult<()> {
        let names = frame.available_collections();
        self.write_frame_collections(frame, category, &names)
    }

    /// Writes the named collections of `frame` and its parameters as one
    /// entry of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InconsistentCategory`] if the names differ from
    /// those of the first frame of the category, and collection lookup,
    /// encoding and I/O errors otherwise.
    pub fn write_frame_collections(
        &mut self,
        frame: &mut Frame,
        category: &str,
        names: &[String],
    ) -> CoreResult<()> {
        if self.finished {
            return Err(CoreError::invalid_operation("writer is already finished"));
        }

        let mut names = names.to_vec();
        names.sort();
        names.dedup();

        if self.categories.contains_key(category) {
            let (missing, extra) = self.check_consistency(&names, category);
            if !missing.is_empty() || !extra.is_empty() {
                return Err(CoreError::InconsistentCategory {
                    category: category.to_string(),
                    missing,
                    extra,
                });
            }
        }

        let mut collections = Vec::with_capacity(names.len());
        for name in &names {
            collections.push(raw_collection(frame, name)?);
        }

        let block = FrameBlock {
            parameters: frame.parameters().clone(),
            collections,
        };
        let payload = evdm_codec::to_cbor(&block)?;
        let data = encode_block(
            BlockKind::Frame,
            category,
            &payload,
            self.config.max_block_size,
        )?;
        let offset = self.backend.append(&data)?;
        if self.config.sync_on_write {
            self.backend.sync()?;
        }

        let metadata = self
            .categories
            .entry(category.to_string())
            .or_insert_with(|| {
                info!(
                    "Initialising category '{}' with {} collections",
                    category,
                    block.collections.len()
                );
                CategoryMetadata {
                    collections: block.collections.iter().map(|c| c.info.clone()).collect(),
                    entries: 0,
                }
            });
        metadata.entries += 1;
        debug!(
            "Wrote entry {} of '{}' at offset {}",
            metadata.entries - 1,
            category,
            offset
        );
        Ok(())
    }

    /// Compares `names` with the collections of the first frame of
    /// `category`.
    ///
    /// Returns the names missing from `names` and the names not present in
    /// the category, both sorted. Both are empty for a category nothing
    /// has been written to yet.
    #[must_use]
    pub fn check_consistency(&self, names: &[String], category: &str) -> (Vec<String>, Vec<String>) {
        let Some(metadata) = self.categories.get(category) else {
            return (Vec::new(), Vec::new());
        };

        let mut missing: Vec<String> = metadata
            .collections
            .iter()
            .filter(|info| !names.contains(&info.name))
            .map(|info| info.name.clone())
            .collect();
        let mut extra: Vec<String> = names
            .iter()
            .filter(|name| !metadata.collections.iter().any(|info| &info.name == *name))
            .cloned()
            .collect();
        missing.sort();
        extra.sort();
        extra.dedup();
        (missing, extra)
    }

    /// Returns the number of entries written to `category`.
    #[must_use]
    pub fn entries(&self, category: &str) -> u64 {
        self.categories.get(category).map_or(0, |m| m.entries)
    }

    /// Writes the metadata block and syncs the backend. Later calls do
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns encoding and I/O errors.
    pub fn finish(&mut self) -> CoreResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let metadata = MetadataBlock {
            writer_version: BUILD_VERSION,
            categories: self.categories.clone(),
        };
        let payload = evdm_codec::to_cbor(&metadata)?;
        let data = encode_block(BlockKind::Metadata, "", &payload, self.config.max_block_size)?;
        self.backend.append(&data)?;
        self.backend.sync()?;
        debug!("Finished frame file with {} categories", self.categories.len());
        Ok(())
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!("Failed to finish frame file: {}", err);
        }
    }
}

fn raw_collection(frame: &mut Frame, name: &str) -> CoreResult<RawCollection> {
    let collection = frame.collection_for_write(name)?;
    let buffers = collection
        .buffers()
        .ok_or_else(|| CoreError::invalid_operation(format!("'{name}' has no buffers")))?;

    let payload = buffers
        .data
        .as_ref()
        .map(|data| data.encode().map(Bytes::from))
        .transpose()?;

    Ok(RawCollection {
        info: CollectionInfo {
            name: name.to_string(),
            id: collection.id(),
            type_name: collection.type_name(),
            subset: collection.is_subset_collection(),
            schema_version: collection.schema_version(),
        },
        payload,
        references: buffers.references.clone(),
        vector_members: buffers.vector_members.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RecordCollection;
    use crate::io::format::BlockHeader;
    use crate::testing::{Particle, ParticleData};
    use evdm_storage::InMemoryBackend;

    fn particle_frame(names: &[&str]) -> Frame {
        let mut frame = Frame::new();
        for name in names {
            let mut particles = RecordCollection::<Particle>::new();
            particles
                .create_with(ParticleData { energy: 1.0, pdg: 22 })
                .unwrap();
            frame.put(name, particles).unwrap();
        }
        frame
    }

    #[test]
    fn read_only_backends_are_rejected() {
        let backend = InMemoryBackend::new().read_only();
        assert!(matches!(
            FrameWriter::new(Box::new(backend), Config::default()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn first_frame_fixes_the_category() {
        let mut writer = FrameWriter::new(Box::new(InMemoryBackend::new()), Config::default()).unwrap();
        writer
            .write_frame(&mut particle_frame(&["muons", "electrons"]), "events")
            .unwrap();

        let names = vec!["electrons".to_string(), "photons".to_string()];
        let (missing, extra) = writer.check_consistency(&names, "events");
        assert_eq!(missing, vec!["muons"]);
        assert_eq!(extra, vec!["photons"]);
        assert_eq!(writer.check_consistency(&names, "runs"), (vec![], vec![]));

        let result = writer.write_frame(&mut particle_frame(&["electrons", "photons"]), "events");
        assert!(matches!(result, Err(CoreError::InconsistentCategory { .. })));

        writer
            .write_frame(&mut particle_frame(&["electrons", "muons"]), "events")
            .unwrap();
        assert_eq!(writer.entries("events"), 2);
    }

    #[test]
    fn unknown_collection_names_fail() {
        let mut writer = FrameWriter::new(Box::new(InMemoryBackend::new()), Config::default()).unwrap();
        let mut frame = particle_frame(&["muons"]);
        let result = writer.write_frame_collections(&mut frame, "events", &["taus".to_string()]);
        assert!(matches!(result, Err(CoreError::CollectionNotFound { .. })));
        assert_eq!(writer.entries("events"), 0);
    }

    #[test]
    fn finish_is_idempotent_and_closes_the_writer() {
        let backend = InMemoryBackend::new();
        let mut writer = FrameWriter::new(Box::new(backend.clone()), Config::default()).unwrap();
        writer.finish().unwrap();
        let size = backend.data().len();
        writer.finish().unwrap();
        drop(writer);
        assert_eq!(backend.data().len(), size);
    }

    #[test]
    fn dropping_an_unfinished_writer_finishes_it() {
        let backend = InMemoryBackend::new();
        {
            let mut writer =
                FrameWriter::new(Box::new(backend.clone()), Config::default().sync_on_write(true))
                    .unwrap();
            writer
                .write_frame(&mut particle_frame(&["muons"]), "events")
                .unwrap();
        }
        let data = backend.data();
        let kind_of_last = {
            let mut offset = 0;
            let mut kind = None;
            while offset < data.len() {
                let header = BlockHeader::parse(&data[offset..], offset as u64).unwrap();
                kind = Some(header.kind);
                offset += header.total_len();
            }
            kind
        };
        assert_eq!(kind_of_last, Some(BlockKind::Metadata));
    }
}
