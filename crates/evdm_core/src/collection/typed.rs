//! Typed collection implementation.

use super::{Collection, CollectionProvider, CollectionState, Lookup, ReferenceState};
use crate::buffers::{
    count_ranges, to_count, CollectionBuffers, PayloadBuffer, RelationBuffer, VectorMemberBuffer,
    SUBSET_REFERENCES,
};
use crate::error::{CoreError, CoreResult};
use crate::record::{AsObject, ErasedObject, Link, MutableObject, ObjPtr, Object, Record, RecordObj};
use crate::types::{CollectionId, ObjectId, SchemaVersion};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// A collection of records of type `R`.
///
/// A regular collection owns its records; a subset collection only refers
/// to records owned elsewhere. Records keep their position as index for as
/// long as the collection lives.
///
/// ```
/// use evdm_core::{RecordCollection, Record};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # pub struct HitData { pub energy: f32 }
/// # pub struct Hit;
/// # impl Record for Hit { type Data = HitData; const TYPE_NAME: &'static str = "Hit"; }
/// let mut hits = RecordCollection::<Hit>::new();
/// let hit = hits.create().unwrap();
/// hit.data_mut().energy = 4.5;
///
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits.get(0).unwrap().data().energy, 4.5);
/// ```
pub struct RecordCollection<R: Record> {
    id: CollectionId,
    entries: Vec<ObjPtr<R>>,
    subset: bool,
    state: CollectionState,
    buffers: Option<CollectionBuffers>,
    /// Targets of a subset collection read from buffers, until resolved.
    pending_subset: Vec<ObjectId>,
}

fn object_id_at(collection_id: CollectionId, position: usize) -> ObjectId {
    ObjectId::new(
        collection_id,
        i32::try_from(position).unwrap_or(ObjectId::INVALID_INDEX),
    )
}

fn missing_index(id: ObjectId) -> CoreError {
    CoreError::structural(format!("referenced record {id} does not exist"))
}

/// Id to persist for a link; targets outside any registered collection
/// are written as null.
fn persisted_id(link: &Link) -> ObjectId {
    let id = link.id();
    if id.is_null() || id.is_persistable() {
        id
    } else {
        warn!(target_id = %id, "relation target is not in a registered collection, writing null");
        ObjectId::NULL
    }
}

/// Releases a record still held by someone else.
fn detach_shared<R: Record>(entry: &ObjPtr<R>) {
    if Arc::strong_count(entry) > 1 {
        if let Some(mut obj) = entry.try_write() {
            obj.detach();
        }
    }
}

impl<R: Record> RecordCollection<R> {
    /// Creates an empty regular collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_subset(false)
    }

    /// Creates an empty subset collection.
    #[must_use]
    pub fn new_subset() -> Self {
        Self::with_subset(true)
    }

    pub(crate) fn with_subset(subset: bool) -> Self {
        Self {
            id: CollectionId::INVALID,
            entries: Vec::new(),
            subset,
            state: CollectionState::Mutable,
            buffers: None,
            pending_subset: Vec::new(),
        }
    }

    fn ensure_growable(&self) -> CoreResult<()> {
        if self.state == CollectionState::Mutable {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "{}Collection {} can no longer grow ({:?})",
                R::TYPE_NAME,
                self.id,
                self.state
            )))
        }
    }

    fn next_index(&self) -> CoreResult<i32> {
        i32::try_from(self.entries.len())
            .map_err(|_| CoreError::structural("collection exceeds the addressable record count"))
    }

    /// Creates a record with default data at the end of the collection.
    ///
    /// # Errors
    ///
    /// Fails for subset collections and collections that can no longer grow.
    pub fn create(&mut self) -> CoreResult<MutableObject<R>> {
        self.create_with(R::Data::default())
    }

    /// Creates a record with the given data at the end of the collection.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_with(&mut self, data: R::Data) -> CoreResult<MutableObject<R>> {
        self.ensure_growable()?;
        if self.subset {
            return Err(CoreError::invalid_operation(
                "records cannot be created in a subset collection",
            ));
        }
        let mut obj = RecordObj::<R>::new(data);
        obj.id = ObjectId::new(self.id, self.next_index()?);
        let ptr = obj.into_ptr();
        self.entries.push(Arc::clone(&ptr));
        Ok(MutableObject::from_ptr(ptr))
    }

    /// Appends a record.
    ///
    /// A regular collection takes ownership of an untracked record. A subset
    /// collection refers to a record already owned by another collection.
    ///
    /// # Errors
    ///
    /// Fails if the collection can no longer grow or the record has the
    /// wrong ownership state for this kind of collection.
    pub fn push(&mut self, obj: &impl AsObject<R>) -> CoreResult<()> {
        self.ensure_growable()?;
        let obj = obj.as_object();
        if self.subset {
            if obj.object_id().is_untracked() {
                return Err(CoreError::invalid_operation(
                    "subset collections only refer to records owned by a collection",
                ));
            }
        } else {
            let index = self.next_index()?;
            let mut inner = obj.ptr.write();
            if !inner.id.is_untracked() {
                return Err(CoreError::invalid_operation(format!(
                    "record {} already belongs to a collection",
                    inner.id
                )));
            }
            inner.id = ObjectId::new(self.id, index);
        }
        self.entries.push(obj.ptr);
        Ok(())
    }

    /// Returns the number of records, counting subset entries that are
    /// not bound yet.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.entries.is_empty() {
            self.pending_subset.len()
        } else {
            self.entries.len()
        }
    }

    /// Returns `true` if the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Object<R>> {
        self.entries
            .get(index)
            .map(|ptr| Object::from_ptr(Arc::clone(ptr)))
    }

    /// Returns a mutable handle onto the record at `index`.
    ///
    /// # Errors
    ///
    /// Fails for immutable collections and out-of-range indices.
    pub fn get_mut(&self, index: usize) -> CoreResult<MutableObject<R>> {
        if self.state == CollectionState::Immutable {
            return Err(CoreError::invalid_operation(format!(
                "{}Collection {} is read-only",
                R::TYPE_NAME,
                self.id
            )));
        }
        self.entries
            .get(index)
            .map(|ptr| MutableObject::from_ptr(Arc::clone(ptr)))
            .ok_or_else(|| {
                CoreError::invalid_operation(format!(
                    "index {index} out of range for {} records",
                    self.entries.len()
                ))
            })
    }

    /// Iterates over the records in order.
    pub fn iter(&self) -> impl Iterator<Item = Object<R>> + '_ {
        self.entries
            .iter()
            .map(|ptr| Object::from_ptr(Arc::clone(ptr)))
    }

    fn record_buffers(&self) -> CoreResult<CollectionBuffers> {
        let mut buffers = self.create_buffers();
        let mut payload = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let obj = entry.read();
            payload.push(obj.data.clone());
            for (links, column) in obj.relations.iter().zip(buffers.references.iter_mut()) {
                column.counts.push(to_count(links.len())?);
                column.refs.extend(links.iter().map(persisted_id));
            }
            for (values, column) in obj
                .vector_members
                .iter()
                .zip(buffers.vector_members.iter_mut())
            {
                column.counts.push(to_count(values.len())?);
                column.values.extend_from(values)?;
            }
        }

        buffers.data = Some(Box::new(payload));
        Ok(buffers)
    }

    fn subset_buffers(&self) -> CoreResult<CollectionBuffers> {
        let mut column = RelationBuffer::new(SUBSET_REFERENCES);
        if self.entries.is_empty() {
            column.refs.clone_from(&self.pending_subset);
        } else {
            column.refs = self
                .entries
                .iter()
                .map(|entry| {
                    let id = entry.read().id;
                    if id.is_persistable() {
                        Ok(id)
                    } else {
                        Err(CoreError::invalid_operation(format!(
                            "subset entry {id} is not in a registered collection"
                        )))
                    }
                })
                .collect::<CoreResult<_>>()?;
        }
        Ok(CollectionBuffers {
            data: None,
            references: vec![column],
            vector_members: Vec::new(),
        })
    }

    fn check_columns(&self, buffers: &CollectionBuffers) -> CoreResult<()> {
        let relations: Vec<&str> = buffers.references.iter().map(|r| r.name.as_str()).collect();
        let declared: Vec<&str> = R::RELATIONS.iter().map(|r| r.name).collect();
        if relations != declared {
            return Err(CoreError::structural(format!(
                "{} expects relations {declared:?}, buffers carry {relations:?}",
                R::TYPE_NAME
            )));
        }

        let members: Vec<_> = buffers
            .vector_members
            .iter()
            .map(|m| (m.name.as_str(), m.values.kind()))
            .collect();
        let declared: Vec<_> = R::VECTOR_MEMBERS.iter().map(|m| (m.name, m.kind)).collect();
        if members != declared {
            return Err(CoreError::structural(format!(
                "{} expects vector members {declared:?}, buffers carry {members:?}",
                R::TYPE_NAME
            )));
        }
        Ok(())
    }

    fn resolve_subset(
        &mut self,
        provider: &mut dyn CollectionProvider,
    ) -> CoreResult<ReferenceState> {
        if self.pending_subset.is_empty() {
            return Ok(ReferenceState::Resolved);
        }

        let mut resolved = Vec::with_capacity(self.pending_subset.len());
        for &id in &self.pending_subset {
            let index = id
                .position()
                .filter(|_| id.is_persistable())
                .ok_or_else(|| CoreError::structural(format!("subset entry {id} is not a record")))?;
            match provider.lookup(id.collection_id)? {
                Lookup::Found(collection) => {
                    let target = collection
                        .object_at(index)
                        .ok_or_else(|| missing_index(id))?;
                    let type_name = target.type_name();
                    let ptr = target
                        .downcast::<R>()
                        .ok_or_else(|| CoreError::type_mismatch(R::TYPE_NAME, type_name))?;
                    resolved.push(ptr);
                }
                // Nothing is bound until every target is available.
                Lookup::Deferred => return Ok(ReferenceState::Deferred),
                Lookup::Missing => {
                    warn!(collection = %self.id, missing = %id.collection_id, "subset target collection is not available");
                    return Err(CoreError::UnresolvedReference { id });
                }
            }
        }

        self.entries = resolved;
        self.pending_subset.clear();
        Ok(ReferenceState::Resolved)
    }
}

impl<R: Record> Default for RecordCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> fmt::Debug for RecordCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCollection")
            .field("type", &R::TYPE_NAME)
            .field("id", &self.id)
            .field("len", &self.len())
            .field("subset", &self.subset)
            .field("state", &self.state)
            .finish()
    }
}

impl<R: Record> Drop for RecordCollection<R> {
    fn drop(&mut self) {
        if !self.subset {
            self.entries.iter().for_each(detach_shared);
        }
    }
}

impl<R: Record> Collection for RecordCollection<R> {
    fn id(&self) -> CollectionId {
        self.id
    }

    fn set_id(&mut self, id: CollectionId) -> CoreResult<()> {
        if self.id.is_valid() && self.id != id {
            return Err(CoreError::invalid_operation(format!(
                "collection already has id {}, cannot change it to {id}",
                self.id
            )));
        }
        self.id = id;
        if !self.subset {
            for (position, entry) in self.entries.iter().enumerate() {
                entry.write().id = object_id_at(id, position);
            }
        }
        Ok(())
    }

    fn value_type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn schema_version(&self) -> SchemaVersion {
        R::SCHEMA_VERSION
    }

    fn is_subset_collection(&self) -> bool {
        self.subset
    }

    fn set_subset_collection(&mut self, subset: bool) -> CoreResult<()> {
        if self.subset != subset && (self.state != CollectionState::Mutable || self.len() > 0) {
            return Err(CoreError::invalid_operation(
                "subset mode can only change on an empty mutable collection",
            ));
        }
        self.subset = subset;
        Ok(())
    }

    fn len(&self) -> usize {
        RecordCollection::<R>::len(self)
    }

    fn state(&self) -> CollectionState {
        self.state
    }

    fn create_buffers(&self) -> CollectionBuffers {
        if self.subset {
            return CollectionBuffers {
                data: None,
                references: vec![RelationBuffer::new(SUBSET_REFERENCES)],
                vector_members: Vec::new(),
            };
        }
        CollectionBuffers {
            data: Some(Box::new(Vec::<R::Data>::new())),
            references: R::RELATIONS
                .iter()
                .map(|relation| RelationBuffer::new(relation.name))
                .collect(),
            vector_members: R::VECTOR_MEMBERS
                .iter()
                .map(|member| VectorMemberBuffer::new(member.name, member.kind))
                .collect(),
        }
    }

    fn decode_payload(&self, bytes: &[u8]) -> CoreResult<Box<dyn PayloadBuffer>> {
        let records: Vec<R::Data> = evdm_codec::from_cbor(bytes)?;
        Ok(Box::new(records))
    }

    fn set_buffers(&mut self, buffers: CollectionBuffers) -> CoreResult<()> {
        if self.state != CollectionState::Mutable || self.len() > 0 {
            return Err(CoreError::invalid_operation(
                "buffers can only be set on an empty mutable collection",
            ));
        }
        buffers.check_consistency(self.subset)?;

        if self.subset {
            self.pending_subset = buffers
                .references
                .into_iter()
                .next()
                .map(|column| column.refs)
                .unwrap_or_default();
            self.state = CollectionState::Immutable;
            return Ok(());
        }

        self.check_columns(&buffers)?;
        let CollectionBuffers {
            data,
            references,
            vector_members,
        } = buffers;
        let records = data
            .ok_or_else(|| CoreError::structural("collection has no payload"))?
            .downcast::<R::Data>()
            .map_err(|_| {
                CoreError::type_mismatch(format!("{}Data", R::TYPE_NAME), "foreign payload")
            })?;

        let relation_ranges: Vec<_> = references.iter().map(|r| count_ranges(&r.counts)).collect();
        let member_ranges: Vec<_> = vector_members
            .iter()
            .map(|m| count_ranges(&m.counts))
            .collect();

        let mut entries = Vec::with_capacity(records.len());
        for (position, data) in records.into_iter().enumerate() {
            let mut obj = RecordObj::<R>::new(data);
            obj.id = object_id_at(self.id, position);
            for (r, column) in references.iter().enumerate() {
                let refs = column
                    .refs
                    .get(relation_ranges[r][position].clone())
                    .ok_or_else(|| CoreError::structural(format!("column '{}' is short", column.name)))?;
                obj.relations[r] = refs.iter().copied().map(Link::unbound).collect();
            }
            for (m, column) in vector_members.iter().enumerate() {
                obj.vector_members[m] = column
                    .values
                    .slice(member_ranges[m][position].clone())
                    .ok_or_else(|| CoreError::structural(format!("column '{}' is short", column.name)))?;
            }
            entries.push(obj.into_ptr());
        }

        self.entries = entries;
        self.state = CollectionState::Immutable;
        Ok(())
    }

    fn prepare_for_write(&mut self) -> CoreResult<&CollectionBuffers> {
        if self.buffers.is_none() {
            let buffers = if self.subset {
                self.subset_buffers()?
            } else {
                self.record_buffers()?
            };
            self.buffers = Some(buffers);
            if self.state == CollectionState::Mutable {
                self.state = CollectionState::PreparedForWrite;
            }
        }
        self.buffers
            .as_ref()
            .ok_or_else(|| CoreError::invalid_operation("buffers were not built"))
    }

    fn buffers(&self) -> Option<&CollectionBuffers> {
        self.buffers.as_ref()
    }

    fn set_references(
        &mut self,
        provider: &mut dyn CollectionProvider,
    ) -> CoreResult<ReferenceState> {
        if self.subset {
            return self.resolve_subset(provider);
        }

        let own = self.id;
        let mut state = ReferenceState::Resolved;
        for entry in &self.entries {
            let mut obj = entry.write();
            for link in obj.relations.iter_mut().flatten() {
                if link.is_bound() {
                    continue;
                }
                let id = link.id();
                if id.is_null() {
                    continue;
                }
                let index = id
                    .position()
                    .ok_or_else(|| CoreError::structural(format!("reference {id} has no index")))?;

                if id.collection_id == own {
                    let target = self.entries.get(index).ok_or_else(|| missing_index(id))?;
                    link.bind(&ErasedObject::new(Arc::clone(target)));
                    continue;
                }

                match provider.lookup(id.collection_id)? {
                    Lookup::Found(collection) => {
                        let target = collection
                            .object_at(index)
                            .ok_or_else(|| missing_index(id))?;
                        link.bind(&target);
                    }
                    Lookup::Deferred => state = ReferenceState::Deferred,
                    Lookup::Missing => {
                        trace!(reference = %id, "target collection not available, reference stays unbound");
                    }
                }
            }
        }
        Ok(state)
    }

    fn object_at(&self, index: usize) -> Option<ErasedObject> {
        self.entries
            .get(index)
            .map(|ptr| ErasedObject::new(Arc::clone(ptr)))
    }

    fn clear(&mut self) {
        if !self.subset {
            self.entries.iter().for_each(detach_shared);
        }
        self.entries.clear();
        self.pending_subset.clear();
        self.buffers = None;
        self.state = CollectionState::Mutable;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::ScalarVec;
    use crate::testing::{Node, Particle, ParticleData, Vertex, NEXT, PARTICLES, WEIGHTS};

    struct Deferring;

    impl CollectionProvider for Deferring {
        fn lookup(&mut self, _id: CollectionId) -> CoreResult<Lookup<'_>> {
            Ok(Lookup::Deferred)
        }
    }

    fn particles(id: u32, n: i32) -> RecordCollection<Particle> {
        let mut collection = RecordCollection::<Particle>::new();
        collection.set_id(CollectionId::new(id)).unwrap();
        for pdg in 0..n {
            collection
                .create_with(ParticleData {
                    energy: f64::from(pdg) * 10.0,
                    pdg,
                })
                .unwrap();
        }
        collection
    }

    /// Rebuilds a collection the way a reader would.
    fn reread<R: Record>(source: &mut RecordCollection<R>) -> RecordCollection<R> {
        let buffers = source.prepare_for_write().unwrap().clone();
        let mut copy = RecordCollection::<R>::with_subset(source.is_subset_collection());
        copy.set_id(source.id()).unwrap();
        copy.set_buffers(buffers).unwrap();
        copy
    }

    #[test]
    fn create_assigns_positions() {
        let collection = particles(5, 3);
        for (position, particle) in collection.iter().enumerate() {
            assert_eq!(
                particle.object_id(),
                ObjectId::new(CollectionId::new(5), position as i32)
            );
        }
        assert_eq!(collection.type_name(), "ParticleCollection");
        assert_eq!(collection.data_type_name(), "ParticleData");
    }

    #[test]
    fn set_id_propagates_and_sticks() {
        let mut collection = RecordCollection::<Particle>::new();
        let particle = collection.create().unwrap();
        assert_eq!(particle.object_id().collection_id, CollectionId::INVALID);

        collection.set_id(CollectionId::new(9)).unwrap();
        assert_eq!(
            particle.object_id(),
            ObjectId::new(CollectionId::new(9), 0)
        );
        collection.set_id(CollectionId::new(9)).unwrap();
        assert!(collection.set_id(CollectionId::new(10)).is_err());
    }

    #[test]
    fn push_takes_ownership_once() {
        let mut first = RecordCollection::<Particle>::new();
        let mut second = RecordCollection::<Particle>::new();
        let particle = MutableObject::<Particle>::new();

        first.push(&particle).unwrap();
        assert_eq!(particle.object_id().index, 0);
        assert!(second.push(&particle).is_err());
        assert!(second.is_empty());
    }

    #[test]
    fn prepare_freezes_and_is_idempotent() {
        let mut collection = particles(1, 2);
        let first = collection.prepare_for_write().unwrap() as *const CollectionBuffers;
        let second = collection.prepare_for_write().unwrap() as *const CollectionBuffers;
        assert_eq!(first, second);
        assert_eq!(collection.state(), CollectionState::PreparedForWrite);
        assert!(collection.create().is_err());
        assert!(collection.push(&MutableObject::<Particle>::new()).is_err());
    }

    #[test]
    fn buffers_flatten_relations_and_members() {
        let hits = particles(1, 3);
        let mut vertices = RecordCollection::<Vertex>::new();
        vertices.set_id(CollectionId::new(2)).unwrap();

        let empty = vertices.create().unwrap();
        empty.push_vector_member(WEIGHTS, 1.0_f32).unwrap();
        let full = vertices.create().unwrap();
        for particle in hits.iter() {
            full.add_related(PARTICLES, &particle).unwrap();
        }

        let buffers = vertices.prepare_for_write().unwrap();
        buffers.check_consistency(false).unwrap();
        assert_eq!(buffers.references[0].name, "particles");
        assert_eq!(buffers.references[0].counts, vec![0, 3]);
        assert_eq!(
            buffers.references[0].refs,
            (0..3)
                .map(|i| ObjectId::new(CollectionId::new(1), i))
                .collect::<Vec<_>>()
        );
        assert_eq!(buffers.vector_members[0].counts, vec![1, 0]);
        assert_eq!(buffers.vector_members[0].values, ScalarVec::Float32(vec![1.0]));
    }

    #[test]
    fn unregistered_targets_are_written_as_null() {
        let mut vertices = RecordCollection::<Vertex>::new();
        vertices.set_id(CollectionId::new(2)).unwrap();
        let loose = MutableObject::<Particle>::new();
        vertices
            .create()
            .unwrap()
            .add_related(PARTICLES, &loose)
            .unwrap();

        let buffers = vertices.prepare_for_write().unwrap();
        assert_eq!(buffers.references[0].refs, vec![ObjectId::NULL]);
    }

    #[test]
    fn references_bind_across_collections() {
        let mut hits = particles(1, 2);
        let mut vertices = RecordCollection::<Vertex>::new();
        vertices.set_id(CollectionId::new(2)).unwrap();
        let vertex = vertices.create().unwrap();
        vertex.add_related(PARTICLES, &hits.get(1).unwrap()).unwrap();

        let hits_read = reread(&mut hits);
        let mut vertices_read = reread(&mut vertices);
        assert_eq!(vertices_read.state(), CollectionState::Immutable);

        let read_vertex = vertices_read.get(0).unwrap();
        assert!(matches!(
            read_vertex.related::<Particle>(PARTICLES),
            Err(CoreError::UnresolvedReference { .. })
        ));

        let mut provider: Vec<&dyn Collection> = vec![&hits_read];
        assert_eq!(
            vertices_read.set_references(&mut provider).unwrap(),
            ReferenceState::Resolved
        );
        let related = read_vertex.related::<Particle>(PARTICLES).unwrap();
        assert_eq!(related[0].data().pdg, 1);
        assert!(related[0].ptr_eq(&hits_read.get(1).unwrap()));
    }

    #[test]
    fn missing_index_is_structural() {
        let mut vertices = RecordCollection::<Vertex>::new();
        vertices.set_id(CollectionId::new(2)).unwrap();
        let mut hits = particles(1, 3);
        vertices
            .create()
            .unwrap()
            .add_related(PARTICLES, &hits.get(2).unwrap())
            .unwrap();
        let mut vertices_read = reread(&mut vertices);

        hits.clear();
        let short = particles(1, 1);
        drop(hits);
        let mut provider: Vec<&dyn Collection> = vec![&short];
        assert!(matches!(
            vertices_read.set_references(&mut provider),
            Err(CoreError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    fn self_references_bind_without_provider() {
        let mut nodes = RecordCollection::<Node>::new();
        nodes.set_id(CollectionId::new(3)).unwrap();
        let a = nodes.create().unwrap();
        let b = nodes.create().unwrap();
        a.set_related(NEXT, &b).unwrap();
        b.set_related(NEXT, &a).unwrap();

        let mut read = reread(&mut nodes);
        let mut provider: Vec<&dyn Collection> = Vec::new();
        assert_eq!(
            read.set_references(&mut provider).unwrap(),
            ReferenceState::Resolved
        );

        let first = read.get(0).unwrap();
        let second = first.related_one::<Node>(NEXT).unwrap().unwrap();
        let back = second.related_one::<Node>(NEXT).unwrap().unwrap();
        assert!(back.ptr_eq(&first));
    }

    #[test]
    fn deferred_targets_are_reported() {
        let mut vertices = RecordCollection::<Vertex>::new();
        vertices.set_id(CollectionId::new(2)).unwrap();
        let hits = particles(1, 1);
        vertices
            .create()
            .unwrap()
            .add_related(PARTICLES, &hits.get(0).unwrap())
            .unwrap();
        let mut read = reread(&mut vertices);

        assert_eq!(
            read.set_references(&mut Deferring).unwrap(),
            ReferenceState::Deferred
        );
    }

    #[test]
    fn subset_refers_without_owning() {
        let hits = particles(1, 3);
        let mut selected = RecordCollection::<Particle>::new_subset();
        assert!(selected.push(&MutableObject::<Particle>::new()).is_err());
        assert!(selected.create().is_err());

        selected.push(&hits.get(2).unwrap()).unwrap();
        selected.push(&hits.get(0).unwrap()).unwrap();
        assert_eq!(hits.get(2).unwrap().object_id().index, 2);

        let buffers = selected.prepare_for_write().unwrap();
        buffers.check_consistency(true).unwrap();
        assert!(buffers.data.is_none());
        assert_eq!(
            buffers.references[0].refs,
            vec![
                ObjectId::new(CollectionId::new(1), 2),
                ObjectId::new(CollectionId::new(1), 0)
            ]
        );
    }

    #[test]
    fn subset_resolution_is_all_or_nothing() {
        let hits = particles(1, 3);
        let mut selected = RecordCollection::<Particle>::new_subset();
        selected.set_id(CollectionId::new(4)).unwrap();
        selected.push(&hits.get(1).unwrap()).unwrap();
        let mut read = reread(&mut selected);
        assert_eq!(read.len(), 1);
        assert!(read.get(0).is_none());

        assert_eq!(
            read.set_references(&mut Deferring).unwrap(),
            ReferenceState::Deferred
        );
        assert!(read.get(0).is_none());

        let mut provider: Vec<&dyn Collection> = vec![&hits];
        read.set_references(&mut provider).unwrap();
        assert!(read.get(0).unwrap().ptr_eq(&hits.get(1).unwrap()));
    }

    #[test]
    fn subset_of_unregistered_records_is_not_written() {
        let mut loose = RecordCollection::<Particle>::new();
        loose.create().unwrap();
        let mut selected = RecordCollection::<Particle>::new_subset();
        selected.push(&loose.get(0).unwrap()).unwrap();

        assert!(matches!(
            selected.prepare_for_write(),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(selected.buffers().is_none());

        loose.set_id(CollectionId::new(9)).unwrap();
        let buffers = selected.prepare_for_write().unwrap();
        assert_eq!(
            buffers.references[0].refs,
            vec![ObjectId::new(CollectionId::new(9), 0)]
        );
    }

    #[test]
    fn subset_with_missing_target_fails() {
        let hits = particles(1, 2);
        let mut selected = RecordCollection::<Particle>::new_subset();
        selected.push(&hits.get(0).unwrap()).unwrap();
        let mut read = reread(&mut selected);

        let mut provider: Vec<&dyn Collection> = Vec::new();
        assert!(matches!(
            read.set_references(&mut provider),
            Err(CoreError::UnresolvedReference { id }) if id == ObjectId::new(CollectionId::new(1), 0)
        ));
        assert!(read.iter().next().is_none());
    }

    #[test]
    fn subset_mode_only_changes_when_empty() {
        let mut collection = particles(1, 1);
        assert!(collection.set_subset_collection(true).is_err());
        collection.clear();
        collection.set_subset_collection(true).unwrap();
        assert!(collection.is_subset_collection());
    }

    #[test]
    fn read_collections_are_read_only() {
        let mut source = particles(1, 1);
        let read = reread(&mut source);
        assert!(read.get_mut(0).is_err());
        assert_eq!(read.get(0).unwrap().data().pdg, 0);
        assert!(source.get_mut(0).is_ok());
        assert!(source.get_mut(4).is_err());
    }

    #[test]
    fn wrong_columns_are_rejected() {
        let mut source = particles(1, 1);
        let buffers = source.prepare_for_write().unwrap().clone();
        let mut vertices = RecordCollection::<Vertex>::new();
        assert!(vertices.set_buffers(buffers).is_err());
    }

    #[test]
    fn clear_detaches_outstanding_handles() {
        let mut collection = particles(1, 2);
        let kept = collection.get(1).unwrap();
        collection.clear();

        assert!(collection.is_empty());
        assert_eq!(collection.state(), CollectionState::Mutable);
        assert!(kept.object_id().is_untracked());
        assert_eq!(kept.ref_count(), 1);
    }

    #[test]
    fn drop_detaches_outstanding_handles() {
        let collection = particles(1, 1);
        let kept = collection.get(0).unwrap();
        drop(collection);
        assert!(kept.object_id().is_untracked());
    }
}
