//! Reading frames back from a block file.

use super::format::{
    split_block, BlockHeader, BlockKind, CollectionInfo, FrameBlock, MetadataBlock, RawCollection,
    HEADER_SIZE,
};
use crate::collection::Collection;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::id_table::CollectionIdTable;
use crate::parameters::GenericParameters;
use crate::registry::DatamodelRegistry;
use crate::source::FrameSource;
use crate::version::{Compatibility, Version, BUILD_VERSION};
use evdm_storage::{FileBackend, OpenMode, StorageBackend};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads frames written by [`FrameWriter`](super::FrameWriter).
///
/// Opening a reader scans the block headers once to index the entries of
/// every category; frame blocks are decoded only when an entry is read.
pub struct FrameReader {
    backend: Box<dyn StorageBackend>,
    registry: Arc<DatamodelRegistry>,
    config: Config,
    /// Block offsets per category, in entry order.
    index: BTreeMap<String, Vec<u64>>,
    /// Next entry handed out by `read_next_entry`, per category.
    cursors: HashMap<String, usize>,
    metadata: Option<MetadataBlock>,
}

impl FrameReader {
    /// Creates a reader over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] for malformed or truncated
    /// blocks, and checksum or I/O errors from the metadata block.
    pub fn new(
        backend: Box<dyn StorageBackend>,
        registry: Arc<DatamodelRegistry>,
        config: Config,
    ) -> CoreResult<Self> {
        let mut reader = Self {
            backend,
            registry,
            config,
            index: BTreeMap::new(),
            cursors: HashMap::new(),
            metadata: None,
        };
        reader.scan()?;
        Ok(reader)
    }

    /// Opens the file at `path` with the default configuration.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), plus file open errors.
    pub fn open(path: impl AsRef<Path>, registry: Arc<DatamodelRegistry>) -> CoreResult<Self> {
        let path = path.as_ref();
        info!("Opening frame file {:?}", path);
        let backend = FileBackend::open(path, OpenMode::ReadOnly)?;
        Self::new(Box::new(backend), registry, Config::default())
    }

    /// Returns the categories with at least one entry, sorted.
    #[must_use]
    pub fn available_categories(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Returns the number of entries of `category`.
    #[must_use]
    pub fn entries(&self, category: &str) -> usize {
        self.index.get(category).map_or(0, Vec::len)
    }

    /// Returns the writer version, if the file was finished.
    #[must_use]
    pub fn file_version(&self) -> Option<Version> {
        self.metadata.as_ref().map(|m| m.writer_version)
    }

    /// Returns the collections of `category` as recorded on finish.
    #[must_use]
    pub fn collection_infos(&self, category: &str) -> Option<&[CollectionInfo]> {
        self.metadata
            .as_ref()?
            .categories
            .get(category)
            .map(|m| m.collections.as_slice())
    }

    /// Reads entry `entry` of `category`. The next
    /// [`read_next_entry`](Self::read_next_entry) continues after it.
    ///
    /// Returns `Ok(None)` if the category has no such entry.
    ///
    /// # Errors
    ///
    /// Returns format, checksum, decoding and I/O errors.
    pub fn read_entry(&mut self, category: &str, entry: usize) -> CoreResult<Option<FrameData>> {
        let Some(&offset) = self.index.get(category).and_then(|offsets| offsets.get(entry)) else {
            return Ok(None);
        };
        let block = self.read_frame_block(offset)?;
        self.cursors.insert(category.to_string(), entry + 1);
        debug!("Read entry {} of '{}'", entry, category);
        FrameData::new(block, Arc::clone(&self.registry)).map(Some)
    }

    /// Reads the entry after the last one read from `category`.
    ///
    /// Returns `Ok(None)` once the category is exhausted.
    ///
    /// # Errors
    ///
    /// Same as [`read_entry`](Self::read_entry).
    pub fn read_next_entry(&mut self, category: &str) -> CoreResult<Option<FrameData>> {
        let entry = self.cursors.get(category).copied().unwrap_or(0);
        self.read_entry(category, entry)
    }

    fn scan(&mut self) -> CoreResult<()> {
        let size = self.backend.size()?;
        let mut offset = 0_u64;

        while offset < size {
            let available = size - offset;
            if available < HEADER_SIZE as u64 {
                return Err(CoreError::invalid_format(format!(
                    "truncated block header at offset {offset}"
                )));
            }
            let header_bytes = self.backend.read_at(offset, HEADER_SIZE)?;
            let header = BlockHeader::parse(&header_bytes, offset)?;
            let total = header.total_len();
            if total > self.config.max_block_size as usize {
                return Err(CoreError::invalid_format(format!(
                    "block of {total} bytes at offset {offset} exceeds the limit"
                )));
            }
            if (total as u64) > available {
                return Err(CoreError::invalid_format(format!(
                    "truncated block at offset {offset}"
                )));
            }

            match header.kind {
                BlockKind::Frame => {
                    let tag = self.backend.read_at(offset + HEADER_SIZE as u64, header.tag_len)?;
                    let category = String::from_utf8(tag)
                        .map_err(|_| CoreError::invalid_format("block tag is not UTF-8"))?;
                    self.index.entry(category).or_default().push(offset);
                }
                BlockKind::Metadata => {
                    let block = self.backend.read_at(offset, total)?;
                    let (_, payload) = split_block(&header, &block, self.config.verify_checksums)?;
                    self.metadata = Some(evdm_codec::from_cbor(payload)?);
                }
            }
            offset += total as u64;
        }

        match &self.metadata {
            Some(metadata) => {
                if !BUILD_VERSION.compatible(metadata.writer_version, Compatibility::SameMajor) {
                    warn!(
                        "File written by version {}, this is version {}",
                        metadata.writer_version, BUILD_VERSION
                    );
                }
            }
            None => warn!("Frame file has no metadata block; it was not finished"),
        }
        debug!(
            "Indexed {} categories up to offset {}",
            self.index.len(),
            offset
        );
        Ok(())
    }

    fn read_frame_block(&self, offset: u64) -> CoreResult<FrameBlock> {
        let header_bytes = self.backend.read_at(offset, HEADER_SIZE)?;
        let header = BlockHeader::parse(&header_bytes, offset)?;
        let block = self.backend.read_at(offset, header.total_len())?;
        let (_, payload) = split_block(&header, &block, self.config.verify_checksums)?;
        Ok(evdm_codec::from_cbor(payload)?)
    }
}

/// The persisted contents of one entry.
///
/// Implements [`FrameSource`]: collections are built from their raw parts
/// only when a frame asks for them.
pub struct FrameData {
    table: Arc<CollectionIdTable>,
    parameters: GenericParameters,
    registry: Arc<DatamodelRegistry>,
    pending: HashMap<String, RawCollection>,
}

impl FrameData {
    fn new(block: FrameBlock, registry: Arc<DatamodelRegistry>) -> CoreResult<Self> {
        let (ids, names) = block
            .collections
            .iter()
            .map(|raw| (raw.info.id, raw.info.name.clone()))
            .unzip();
        let table = Arc::new(CollectionIdTable::from_parts(ids, names)?);
        let pending = block
            .collections
            .into_iter()
            .map(|raw| (raw.info.name.clone(), raw))
            .collect();
        Ok(Self {
            table,
            parameters: block.parameters,
            registry,
            pending,
        })
    }

    /// Returns the stored parameters.
    #[must_use]
    pub fn parameters(&self) -> &GenericParameters {
        &self.parameters
    }

    /// Wraps the data into a frame that reads collections on demand.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        Frame::from_source(Box::new(self))
    }
}

impl FrameSource for FrameData {
    fn read_collection(&mut self, name: &str) -> CoreResult<Option<Box<dyn Collection>>> {
        let Some(raw) = self.pending.remove(name) else {
            return Ok(None);
        };
        let mut collection = self.registry.create_from_raw(
            &raw.info.type_name,
            raw.info.schema_version,
            raw.info.subset,
            raw.payload.as_deref(),
            raw.references,
            raw.vector_members,
        )?;
        collection.set_id(raw.info.id)?;
        Ok(Some(collection))
    }

    fn collection_id_table(&self) -> Arc<CollectionIdTable> {
        Arc::clone(&self.table)
    }

    fn run_parameters(&self) -> &GenericParameters {
        &self.parameters
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn available_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pending.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RecordCollection;
    use crate::io::FrameWriter;
    use crate::testing::{self, Node, NodeData, Particle, ParticleData, Vertex, PARTICLES, WEIGHTS};
    use evdm_storage::InMemoryBackend;

    fn reader_for(backend: &InMemoryBackend) -> FrameReader {
        FrameReader::new(
            Box::new(backend.read_only()),
            Arc::new(testing::registry()),
            Config::default(),
        )
        .unwrap()
    }

    fn write_events(backend: &InMemoryBackend, count: i32) {
        let mut writer = FrameWriter::new(Box::new(backend.clone()), Config::default()).unwrap();
        for event in 0..count {
            let mut frame = Frame::new();
            let mut particles = RecordCollection::<Particle>::new();
            let mut vertices = RecordCollection::<Vertex>::new();
            let photon = particles
                .create_with(ParticleData {
                    energy: f64::from(event) + 0.5,
                    pdg: 22,
                })
                .unwrap();
            let vertex = vertices.create().unwrap();
            vertex.add_related(PARTICLES, &photon).unwrap();
            vertex.push_vector_member(WEIGHTS, 0.25_f32).unwrap();
            frame.put("particles", particles).unwrap();
            frame.put("vertices", vertices).unwrap();
            frame.parameters_mut().set_value("event", event);
            writer.write_frame(&mut frame, "events").unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn entries_round_trip_with_references() {
        let backend = InMemoryBackend::new();
        write_events(&backend, 3);

        let mut reader = reader_for(&backend);
        assert_eq!(reader.available_categories(), vec!["events"]);
        assert_eq!(reader.entries("events"), 3);
        assert_eq!(reader.file_version(), Some(BUILD_VERSION));

        let data = reader.read_entry("events", 2).unwrap().unwrap();
        assert_eq!(data.parameters().get_value::<i32>("event").unwrap(), 2);
        let mut frame = data.into_frame();

        let vertices = frame.get_as::<Vertex>("vertices").unwrap();
        let vertex = vertices.get(0).unwrap();
        let particles = vertex.related::<Particle>(PARTICLES).unwrap();
        assert_eq!(particles.len(), 1);
        assert_eq!(particles[0].data().energy, 2.5);
        assert_eq!(vertex.vector_member::<f32>(WEIGHTS).unwrap(), vec![0.25]);
    }

    #[test]
    fn read_next_entry_walks_the_category() {
        let backend = InMemoryBackend::new();
        write_events(&backend, 2);
        let mut reader = reader_for(&backend);

        let first = reader.read_next_entry("events").unwrap().unwrap();
        assert_eq!(first.parameters().get_value::<i32>("event").unwrap(), 0);
        let second = reader.read_next_entry("events").unwrap().unwrap();
        assert_eq!(second.parameters().get_value::<i32>("event").unwrap(), 1);
        assert!(reader.read_next_entry("events").unwrap().is_none());
        assert!(reader.read_next_entry("runs").unwrap().is_none());

        reader.read_entry("events", 0).unwrap().unwrap();
        assert!(reader.read_next_entry("events").unwrap().is_some());
    }

    #[test]
    fn metadata_describes_categories() {
        let backend = InMemoryBackend::new();
        write_events(&backend, 1);
        let reader = reader_for(&backend);

        let infos = reader.collection_infos("events").unwrap();
        let names: Vec<&str> = infos.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["particles", "vertices"]);
        assert_eq!(infos[1].type_name, "VertexCollection");
        assert_eq!(infos[1].schema_version, 1);
        assert!(!infos[1].subset);
        assert!(reader.collection_infos("runs").is_none());
    }

    #[test]
    fn self_references_survive_the_file() {
        let backend = InMemoryBackend::new();
        {
            let mut writer = FrameWriter::new(Box::new(backend.clone()), Config::default()).unwrap();
            let mut frame = Frame::new();
            let mut nodes = RecordCollection::<Node>::new();
            let first = nodes.create_with(NodeData { value: 1 }).unwrap();
            let second = nodes.create_with(NodeData { value: 2 }).unwrap();
            first.set_related(crate::testing::NEXT, &second).unwrap();
            frame.put("nodes", nodes).unwrap();
            writer.write_frame(&mut frame, "events").unwrap();
        }

        let mut reader = reader_for(&backend);
        let mut frame = reader.read_entry("events", 0).unwrap().unwrap().into_frame();
        let nodes = frame.get_as::<Node>("nodes").unwrap();
        let next = nodes
            .get(0)
            .unwrap()
            .related_one::<Node>(crate::testing::NEXT)
            .unwrap()
            .unwrap();
        assert_eq!(next.data().value, 2);
        assert!(next.ptr_eq(&nodes.get(1).unwrap()));
    }

    #[test]
    fn unfinished_files_are_readable() {
        let backend = InMemoryBackend::new();
        let mut writer = FrameWriter::new(Box::new(backend.clone()), Config::default()).unwrap();
        let mut frame = Frame::new();
        writer.write_frame(&mut frame, "events").unwrap();

        let reader = reader_for(&backend);
        assert_eq!(reader.entries("events"), 1);
        assert!(reader.file_version().is_none());
        drop(writer);
    }

    #[test]
    fn corruption_is_detected() {
        let backend = InMemoryBackend::new();
        write_events(&backend, 1);
        let mut data = backend.data();

        let mut flipped = data.clone();
        flipped[HEADER_SIZE + 10] ^= 0xff;
        let mut reader = FrameReader::new(
            Box::new(InMemoryBackend::with_data(flipped)),
            Arc::new(testing::registry()),
            Config::default(),
        )
        .unwrap();
        assert!(matches!(
            reader.read_entry("events", 0),
            Err(CoreError::ChecksumMismatch { .. })
        ));

        data.truncate(data.len() - 3);
        assert!(matches!(
            FrameReader::new(
                Box::new(InMemoryBackend::with_data(data)),
                Arc::new(testing::registry()),
                Config::default(),
            ),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn unregistered_types_fail_on_access() {
        let backend = InMemoryBackend::new();
        write_events(&backend, 1);
        let mut reader = FrameReader::new(
            Box::new(backend.read_only()),
            Arc::new(DatamodelRegistry::new()),
            Config::default(),
        )
        .unwrap();

        let mut frame = reader.read_entry("events", 0).unwrap().unwrap().into_frame();
        assert!(matches!(
            frame.get_by_name("particles"),
            Err(CoreError::UnknownType { .. })
        ));
    }
}
