//! Type-erased record pointers used by relations.

use super::{ObjPtr, Record, RecordObj};
use crate::types::ObjectId;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// Record storage of any type.
pub(crate) trait AnyRecord: Any + Send + Sync {
    fn object_id(&self) -> ObjectId;
    fn type_name(&self) -> &'static str;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<R: Record> AnyRecord for RwLock<RecordObj<R>> {
    fn object_id(&self) -> ObjectId {
        // Recursive so that a record linking to itself can be inspected
        // while its own read guard is held.
        self.read_recursive().id
    }

    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A strong handle onto a record whose type is only known at runtime.
///
/// Collections hand these out while references are bound; users normally
/// see typed [`Object`](super::Object) handles instead.
#[derive(Clone)]
pub struct ErasedObject(Arc<dyn AnyRecord>);

impl ErasedObject {
    pub(crate) fn new<R: Record>(ptr: ObjPtr<R>) -> Self {
        Self(ptr)
    }

    /// Returns the current id of the record.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.0.object_id()
    }

    /// Returns the value type name of the record.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub(crate) fn downcast<R: Record>(self) -> Option<ObjPtr<R>> {
        self.0.into_any().downcast::<RwLock<RecordObj<R>>>().ok()
    }
}

impl fmt::Debug for ErasedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedObject")
            .field("type", &self.type_name())
            .field("id", &self.object_id())
            .finish()
    }
}

/// One entry of a relation.
///
/// The id is what gets persisted. The weak target is filled in once the
/// target record is known, either when the link is created in memory or
/// when references are resolved after reading.
#[derive(Clone)]
pub(crate) struct Link {
    id: ObjectId,
    target: Option<Weak<dyn AnyRecord>>,
}

impl Link {
    pub(crate) fn unbound(id: ObjectId) -> Self {
        Self { id, target: None }
    }

    pub(crate) fn bound(target: &ErasedObject) -> Self {
        Self {
            id: target.object_id(),
            target: Some(Arc::downgrade(&target.0)),
        }
    }

    pub(crate) fn bind(&mut self, target: &ErasedObject) {
        self.target = Some(Arc::downgrade(&target.0));
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    /// The id of the target, following the target if it is still alive so
    /// that ids assigned after linking are picked up.
    pub(crate) fn id(&self) -> ObjectId {
        self.target
            .as_ref()
            .and_then(Weak::upgrade)
            .map_or(self.id, |target| target.object_id())
    }

    pub(crate) fn target(&self) -> Option<ErasedObject> {
        self.target.as_ref().and_then(Weak::upgrade).map(ErasedObject)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id())
            .field("bound", &self.is_bound())
            .finish()
    }
}
