//! Collections of records.
//!
//! [`Collection`] is the type-erased interface frames, registries and
//! backends work with. [`RecordCollection<R>`] is the one implementation,
//! generic over the datamodel type.
//!
//! A collection moves through three states:
//!
//! - *mutable*: records may be created and pushed
//! - *prepared for write*: buffers have been built, no more pushes
//! - *immutable*: filled from buffers, records are read-only
//!
//! A subset collection references records owned by other collections and
//! persists only their ids.

mod typed;

pub use typed::RecordCollection;

use crate::buffers::{CollectionBuffers, PayloadBuffer};
use crate::error::CoreResult;
use crate::record::ErasedObject;
use crate::types::{CollectionId, SchemaVersion};
use std::any::Any;
use std::fmt;

/// Lifecycle state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// Records may be added and modified.
    Mutable,
    /// Buffers were built for writing; the collection no longer grows.
    PreparedForWrite,
    /// Filled from buffers; records are read-only.
    Immutable,
}

/// Outcome of binding a collection's references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceState {
    /// Every reference that can be bound is bound.
    Resolved,
    /// Some targets were still being loaded; bind again later.
    Deferred,
}

/// Answer of a [`CollectionProvider`] for one collection id.
pub enum Lookup<'a> {
    /// The collection is available.
    Found(&'a dyn Collection),
    /// The collection exists but is still being loaded further up the
    /// call chain.
    Deferred,
    /// No collection with this id exists.
    Missing,
}

/// Supplies collections by id while references are bound.
pub trait CollectionProvider {
    /// Looks up the collection with `id`, loading it if necessary.
    fn lookup(&mut self, id: CollectionId) -> CoreResult<Lookup<'_>>;
}

impl<'c> CollectionProvider for Vec<&'c dyn Collection> {
    fn lookup(&mut self, id: CollectionId) -> CoreResult<Lookup<'_>> {
        Ok(self
            .iter()
            .find(|collection| collection.id() == id)
            .map_or(Lookup::Missing, |collection| Lookup::Found(*collection)))
    }
}

/// A type-erased collection of records.
pub trait Collection: Send + Sync + fmt::Debug {
    /// Returns the collection id; invalid until registered in a frame.
    fn id(&self) -> CollectionId;

    /// Assigns the collection id and propagates it to owned records.
    ///
    /// # Errors
    ///
    /// Fails if a different valid id was already assigned.
    fn set_id(&mut self, id: CollectionId) -> CoreResult<()>;

    /// Returns the value type name, e.g. `Hit`.
    fn value_type_name(&self) -> &'static str;

    /// Returns the collection type name, e.g. `HitCollection`.
    fn type_name(&self) -> String {
        format!("{}Collection", self.value_type_name())
    }

    /// Returns the payload record type name, e.g. `HitData`.
    fn data_type_name(&self) -> String {
        format!("{}Data", self.value_type_name())
    }

    /// Returns the schema version of the payload layout.
    fn schema_version(&self) -> SchemaVersion;

    /// Returns `true` for a subset collection.
    fn is_subset_collection(&self) -> bool;

    /// Switches subset mode on or off.
    ///
    /// # Errors
    ///
    /// Fails unless the collection is empty and mutable.
    fn set_subset_collection(&mut self, subset: bool) -> CoreResult<()>;

    /// Returns the number of records.
    fn len(&self) -> usize;

    /// Returns `true` if the collection holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the lifecycle state.
    fn state(&self) -> CollectionState;

    /// Returns empty buffers with the column names and kinds of this
    /// collection.
    fn create_buffers(&self) -> CollectionBuffers;

    /// Decodes a persisted payload column.
    fn decode_payload(&self, bytes: &[u8]) -> CoreResult<Box<dyn PayloadBuffer>>;

    /// Fills an empty collection from buffers, leaving it immutable with
    /// unbound references.
    ///
    /// # Errors
    ///
    /// Fails if the collection is not empty and mutable, or if the buffers
    /// are inconsistent or of the wrong type.
    fn set_buffers(&mut self, buffers: CollectionBuffers) -> CoreResult<()>;

    /// Builds the buffers for writing. Calling it again returns the same
    /// buffers.
    ///
    /// # Errors
    ///
    /// Fails for a subset collection referring to records outside any
    /// registered collection.
    fn prepare_for_write(&mut self) -> CoreResult<&CollectionBuffers>;

    /// Returns the buffers built by [`prepare_for_write`](Self::prepare_for_write).
    fn buffers(&self) -> Option<&CollectionBuffers>;

    /// Binds unbound references using `provider` to find target collections.
    ///
    /// Self references are bound against this collection. A target
    /// collection that is missing leaves its references unbound; one that
    /// is still being loaded makes the result [`ReferenceState::Deferred`].
    ///
    /// # Errors
    ///
    /// Returns a structural inconsistency if a target collection lacks the
    /// referenced index. A subset collection whose target collection is
    /// missing fails with [`CoreError::UnresolvedReference`](crate::CoreError::UnresolvedReference).
    fn set_references(
        &mut self,
        provider: &mut dyn CollectionProvider,
    ) -> CoreResult<ReferenceState>;

    /// Returns the record at `index`.
    fn object_at(&self, index: usize) -> Option<ErasedObject>;

    /// Removes all records and returns to the mutable state. Owned records
    /// that outlive the collection become untracked.
    fn clear(&mut self);

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;

    /// Downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn Collection + 'a {
    /// Returns the collection as a [`RecordCollection<R>`], if it is one.
    #[must_use]
    pub fn downcast_ref<R: crate::Record>(&self) -> Option<&RecordCollection<R>> {
        self.as_any().downcast_ref()
    }

    /// Returns the collection as a mutable [`RecordCollection<R>`], if it is one.
    pub fn downcast_mut<R: crate::Record>(&mut self) -> Option<&mut RecordCollection<R>> {
        self.as_any_mut().downcast_mut()
    }
}
