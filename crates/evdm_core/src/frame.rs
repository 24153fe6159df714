//! The per-event container of named collections.
//!
//! A [`Frame`] holds collections registered by the user and collections
//! read on demand from a [`FrameSource`]. Reading a collection binds its
//! references, which may in turn read the collections they point to.
//!
//! # Reference cycles
//!
//! Collections may reference each other in a cycle. Each top-level
//! [`get`](Frame::get) carries the set of collections currently being
//! loaded. A lookup of a collection already in that set is answered with
//! "deferred" instead of being loaded again, so the recursion always
//! terminates. The collection that hit the deferral is registered with the
//! affected references unbound and remembered; the next `get` of it binds
//! them against the now registered targets.

use crate::collection::{Collection, CollectionProvider, Lookup, RecordCollection, ReferenceState};
use crate::error::{CoreError, CoreResult};
use crate::id_table::CollectionIdTable;
use crate::parameters::GenericParameters;
use crate::record::{Object, Record};
use crate::source::FrameSource;
use crate::types::{CollectionId, ObjectId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct Slot {
    name: String,
    /// Taken out while the collection rebinds its own references.
    collection: Option<Box<dyn Collection>>,
}

enum Retrieval {
    Available(usize),
    InProgress,
    Missing,
}

/// Named collections of one event plus its parameters.
///
/// ```
/// use evdm_core::{Frame, RecordCollection, Record};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # pub struct HitData { pub energy: f32 }
/// # pub struct Hit;
/// # impl Record for Hit { type Data = HitData; const TYPE_NAME: &'static str = "Hit"; }
/// let mut hits = RecordCollection::<Hit>::new();
/// hits.create().unwrap().data_mut().energy = 3.0;
///
/// let mut frame = Frame::new();
/// frame.put("hits", hits).unwrap();
///
/// let hits = frame.get_as::<Hit>("hits").unwrap();
/// assert_eq!(hits.get(0).unwrap().data().energy, 3.0);
/// ```
pub struct Frame {
    slots: Vec<Slot>,
    index: HashMap<CollectionId, usize>,
    id_table: Arc<CollectionIdTable>,
    parameters: GenericParameters,
    source: Option<Box<dyn FrameSource>>,
    /// Registered collections with references left unbound by a cycle.
    deferred: BTreeSet<CollectionId>,
}

impl Frame {
    /// Creates an empty frame with its own id table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_table(Arc::new(CollectionIdTable::new()))
    }

    /// Creates an empty frame sharing `id_table`.
    #[must_use]
    pub fn with_id_table(id_table: Arc<CollectionIdTable>) -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            id_table,
            parameters: GenericParameters::new(),
            source: None,
            deferred: BTreeSet::new(),
        }
    }

    /// Creates a frame whose collections are read from `source` on demand.
    #[must_use]
    pub fn from_source(source: Box<dyn FrameSource>) -> Self {
        let mut frame = Self::new();
        frame.set_source(source);
        frame
    }

    /// Attaches a source, adopting its id table and parameters.
    ///
    /// Collections registered earlier stay registered.
    pub fn set_source(&mut self, source: Box<dyn FrameSource>) {
        let table = source.collection_id_table();
        if self.slots.is_empty() {
            self.id_table = table;
        } else {
            for name in table.names() {
                if let Err(err) = self.id_table.add(&name) {
                    debug!("not adopting collection '{}' from source: {}", name, err);
                }
            }
        }
        self.parameters = source.run_parameters().clone();
        self.source = Some(source);
    }

    /// Returns `true` unless an attached source reports a broken frame.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.source.as_ref().map_or(true, |source| source.is_valid())
    }

    /// Returns the shared name/id table.
    #[must_use]
    pub fn id_table(&self) -> &Arc<CollectionIdTable> {
        &self.id_table
    }

    /// Returns the frame parameters.
    #[must_use]
    pub fn parameters(&self) -> &GenericParameters {
        &self.parameters
    }

    /// Returns the frame parameters mutably.
    pub fn parameters_mut(&mut self) -> &mut GenericParameters {
        &mut self.parameters
    }

    /// Registers a collection under `name` and assigns its id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionExists`] if the name is taken, and
    /// id table or id assignment errors otherwise.
    pub fn register_collection(
        &mut self,
        name: &str,
        mut collection: Box<dyn Collection>,
    ) -> CoreResult<CollectionId> {
        if self.slots.iter().any(|slot| slot.name == name) {
            return Err(CoreError::CollectionExists {
                name: name.to_string(),
            });
        }
        let id = self.id_table.add(name)?;
        if self.index.contains_key(&id) {
            return Err(CoreError::CollectionExists {
                name: name.to_string(),
            });
        }
        collection.set_id(id)?;
        debug!("registered {} '{}' as {}", collection.type_name(), name, id);
        self.push_slot(name.to_string(), collection, id);
        Ok(id)
    }

    /// Registers a typed collection and returns it.
    ///
    /// # Errors
    ///
    /// Same as [`register_collection`](Self::register_collection).
    pub fn put<R: Record>(
        &mut self,
        name: &str,
        collection: RecordCollection<R>,
    ) -> CoreResult<&RecordCollection<R>> {
        let id = self.register_collection(name, Box::new(collection))?;
        let position = self.index[&id];
        self.slots[position]
            .collection
            .as_deref()
            .and_then(|collection| collection.downcast_ref::<R>())
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Returns the collection with `id`, reading it from the source if it
    /// is not registered yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionIdNotFound`] if no such collection
    /// exists, and read or resolution errors from the source.
    pub fn get(&mut self, id: CollectionId) -> CoreResult<&dyn Collection> {
        let position = self.retrieve_top(id)?;
        self.slots[position]
            .collection
            .as_deref()
            .ok_or(CoreError::CollectionIdNotFound { id })
    }

    /// Returns the collection called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNotFound`] if no such collection
    /// exists.
    pub fn get_by_name(&mut self, name: &str) -> CoreResult<&dyn Collection> {
        let id = self
            .id_table
            .collection_id(name)
            .map_err(|_| CoreError::collection_not_found(name))?;
        self.get(id).map_err(|err| match err {
            CoreError::CollectionIdNotFound { .. } => CoreError::collection_not_found(name),
            other => other,
        })
    }

    /// Returns the collection called `name` as a typed collection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if it holds records of another
    /// type.
    pub fn get_as<R: Record>(&mut self, name: &str) -> CoreResult<&RecordCollection<R>> {
        let collection = self.get_by_name(name)?;
        let actual = collection.type_name();
        collection
            .downcast_ref::<R>()
            .ok_or_else(|| CoreError::type_mismatch(format!("{}Collection", R::TYPE_NAME), actual))
    }

    /// Returns the record a reference points to, or `None` for the null
    /// reference.
    ///
    /// # Errors
    ///
    /// Fails if the collection does not exist, lacks the index, or holds
    /// another record type.
    pub fn resolve<R: Record>(&mut self, id: ObjectId) -> CoreResult<Option<Object<R>>> {
        if id.is_null() {
            return Ok(None);
        }
        let position = id
            .position()
            .ok_or_else(|| CoreError::structural(format!("{id} does not name a record")))?;
        let collection = self.get(id.collection_id)?;
        let target = collection
            .object_at(position)
            .ok_or_else(|| CoreError::structural(format!("referenced record {id} does not exist")))?;
        let type_name = target.type_name();
        target
            .downcast::<R>()
            .map(|ptr| Some(Object::from_ptr(ptr)))
            .ok_or_else(|| CoreError::type_mismatch(R::TYPE_NAME, type_name))
    }

    /// Returns the collection called `name` prepared for writing.
    ///
    /// # Errors
    ///
    /// Same as [`get_by_name`](Self::get_by_name), plus buffer building
    /// errors.
    pub fn collection_for_write(&mut self, name: &str) -> CoreResult<&dyn Collection> {
        let id = self
            .id_table
            .collection_id(name)
            .map_err(|_| CoreError::collection_not_found(name))?;
        let position = self.retrieve_top(id).map_err(|err| match err {
            CoreError::CollectionIdNotFound { .. } => CoreError::collection_not_found(name),
            other => other,
        })?;
        let collection = self.slots[position]
            .collection
            .as_deref_mut()
            .ok_or_else(|| CoreError::collection_not_found(name))?;
        collection.prepare_for_write()?;
        Ok(collection)
    }

    /// Returns the names of registered collections in registration order.
    #[must_use]
    pub fn collection_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    /// Returns the names of registered collections followed by those the
    /// source can still provide.
    #[must_use]
    pub fn available_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.name.clone()).collect();
        if let Some(source) = &self.source {
            for name in source.available_collections() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Returns `true` if a collection called `name` is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name == name)
    }

    /// Returns the ids of registered collections with references still
    /// waiting for a cycle to complete.
    #[must_use]
    pub fn deferred_collections(&self) -> Vec<CollectionId> {
        self.deferred.iter().copied().collect()
    }

    /// Binds the references of every deferred collection.
    ///
    /// # Errors
    ///
    /// Propagates resolution errors.
    pub fn resolve_deferred(&mut self) -> CoreResult<()> {
        for id in self.deferred_collections() {
            self.rebind(id)?;
        }
        Ok(())
    }

    /// Empties every registered collection but keeps the registrations.
    pub fn clear_collections(&mut self) {
        for slot in &mut self.slots {
            if let Some(collection) = slot.collection.as_mut() {
                collection.clear();
            }
        }
        self.deferred.clear();
    }

    /// Drops every collection, the source and the parameters.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.deferred.clear();
        self.source = None;
        self.parameters.clear();
    }

    fn push_slot(
        &mut self,
        name: String,
        collection: Box<dyn Collection>,
        id: CollectionId,
    ) -> usize {
        let position = self.slots.len();
        self.slots.push(Slot {
            name,
            collection: Some(collection),
        });
        self.index.insert(id, position);
        position
    }

    /// Entry point of every public lookup: runs with a fresh in-progress
    /// set and finishes deferred bindings of the requested collection.
    fn retrieve_top(&mut self, id: CollectionId) -> CoreResult<usize> {
        if self.deferred.contains(&id) {
            self.rebind(id)?;
        }
        let mut visiting = HashSet::new();
        match self.retrieve(id, &mut visiting)? {
            Retrieval::Available(position) => Ok(position),
            Retrieval::InProgress | Retrieval::Missing => {
                Err(CoreError::CollectionIdNotFound { id })
            }
        }
    }

    fn retrieve(
        &mut self,
        id: CollectionId,
        visiting: &mut HashSet<CollectionId>,
    ) -> CoreResult<Retrieval> {
        if let Some(&position) = self.index.get(&id) {
            return Ok(if self.slots[position].collection.is_some() {
                Retrieval::Available(position)
            } else {
                Retrieval::InProgress
            });
        }
        if !visiting.insert(id) {
            trace!("{} is already being read, deferring", id);
            return Ok(Retrieval::InProgress);
        }

        let Some(mut collection) = self.read_from_source(id)? else {
            visiting.remove(&id);
            return Ok(Retrieval::Missing);
        };

        let name = self.id_table.name(id)?;
        collection.set_id(id)?;
        let state = collection.set_references(&mut Resolver {
            frame: self,
            visiting,
        })?;
        if state == ReferenceState::Deferred {
            debug!("'{}' has references into collections still being read", name);
            self.deferred.insert(id);
        }

        debug!("read {} '{}' from source", collection.type_name(), name);
        Ok(Retrieval::Available(self.push_slot(name, collection, id)))
    }

    fn read_from_source(&mut self, id: CollectionId) -> CoreResult<Option<Box<dyn Collection>>> {
        let Ok(name) = self.id_table.name(id) else {
            return Ok(None);
        };
        match self.source.as_mut() {
            Some(source) => source.read_collection(&name),
            None => Ok(None),
        }
    }

    /// Binds the remaining references of a registered collection. The
    /// collection is taken out of its slot meanwhile, so lookups of it see
    /// it as in progress.
    fn rebind(&mut self, id: CollectionId) -> CoreResult<()> {
        let Some(&position) = self.index.get(&id) else {
            self.deferred.remove(&id);
            return Ok(());
        };
        let Some(mut collection) = self.slots[position].collection.take() else {
            return Ok(());
        };

        let mut visiting = HashSet::from([id]);
        let result = collection.set_references(&mut Resolver {
            frame: self,
            visiting: &mut visiting,
        });
        self.slots[position].collection = Some(collection);

        if result? == ReferenceState::Resolved {
            trace!("all references of {} are bound", id);
            self.deferred.remove(&id);
        }
        Ok(())
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("collections", &self.collection_names())
            .field("deferred", &self.deferred)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Collection lookups made while one collection binds its references.
struct Resolver<'a> {
    frame: &'a mut Frame,
    visiting: &'a mut HashSet<CollectionId>,
}

impl CollectionProvider for Resolver<'_> {
    fn lookup(&mut self, id: CollectionId) -> CoreResult<Lookup<'_>> {
        Ok(match self.frame.retrieve(id, self.visiting)? {
            Retrieval::Available(position) => match self.frame.slots[position].collection.as_deref() {
                Some(collection) => Lookup::Found(collection),
                None => Lookup::Deferred,
            },
            Retrieval::InProgress => Lookup::Deferred,
            Retrieval::Missing => Lookup::Missing,
        })
    }
}
