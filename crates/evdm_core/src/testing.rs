//! Small datamodel and an in-memory frame source for unit tests.

use crate::buffers::{CollectionBuffers, ScalarKind};
use crate::error::CoreResult;
use crate::frame::Frame;
use crate::id_table::CollectionIdTable;
use crate::parameters::GenericParameters;
use crate::record::{Record, RelationDecl, VectorMemberDecl};
use crate::registry::DatamodelRegistry;
use crate::source::FrameSource;
use crate::types::{CollectionId, SchemaVersion};
use crate::Collection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ParticleData {
    pub energy: f64,
    pub pdg: i32,
}

pub(crate) struct Particle;

impl Record for Particle {
    type Data = ParticleData;
    const TYPE_NAME: &'static str = "Particle";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct VertexData {
    pub position: [f32; 3],
}

pub(crate) struct Vertex;

pub(crate) const PARTICLES: usize = 0;
pub(crate) const WEIGHTS: usize = 0;

impl Record for Vertex {
    type Data = VertexData;
    const TYPE_NAME: &'static str = "Vertex";
    const RELATIONS: &'static [RelationDecl] =
        &[RelationDecl::one_to_many("particles", "Particle")];
    const VECTOR_MEMBERS: &'static [VectorMemberDecl] =
        &[VectorMemberDecl::new("weights", ScalarKind::Float32)];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeData {
    pub value: i32,
}

pub(crate) struct Node;

pub(crate) const NEXT: usize = 0;

impl Record for Node {
    type Data = NodeData;
    const TYPE_NAME: &'static str = "Node";
    const RELATIONS: &'static [RelationDecl] = &[RelationDecl::one_to_one("next", "Node")];
}

pub(crate) fn registry() -> DatamodelRegistry {
    let mut registry = DatamodelRegistry::new();
    registry
        .register::<Particle>()
        .and_then(|r| r.register::<Vertex>())
        .and_then(|r| r.register::<Node>())
        .unwrap();
    registry
}

struct Stored {
    type_name: String,
    version: SchemaVersion,
    subset: bool,
    id: CollectionId,
    buffers: CollectionBuffers,
}

/// Frame source serving buffers captured from another frame, without any
/// encoding in between.
pub(crate) struct MemorySource {
    table: Arc<CollectionIdTable>,
    parameters: GenericParameters,
    registry: DatamodelRegistry,
    pending: HashMap<String, Stored>,
}

/// Prepares every collection of `frame` and keeps copies of the buffers.
pub(crate) fn capture(frame: &mut Frame) -> MemorySource {
    let names: Vec<String> = frame
        .collection_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let table = Arc::new(CollectionIdTable::new());
    let mut pending = HashMap::new();

    for name in names {
        let collection = frame.collection_for_write(&name).unwrap();
        let stored = Stored {
            type_name: collection.type_name(),
            version: collection.schema_version(),
            subset: collection.is_subset_collection(),
            id: collection.id(),
            buffers: collection.buffers().unwrap().clone(),
        };
        table.add(&name).unwrap();
        pending.insert(name, stored);
    }

    MemorySource {
        table,
        parameters: frame.parameters().clone(),
        registry: registry(),
        pending,
    }
}

impl FrameSource for MemorySource {
    fn read_collection(&mut self, name: &str) -> CoreResult<Option<Box<dyn Collection>>> {
        let Some(stored) = self.pending.remove(name) else {
            return Ok(None);
        };
        let mut collection =
            self.registry
                .create_collection(&stored.type_name, stored.version, stored.subset)?;
        collection.set_id(stored.id)?;
        collection.set_buffers(stored.buffers)?;
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
