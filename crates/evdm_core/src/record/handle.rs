//! User-facing record handles.

use super::{ErasedObject, Link, ObjPtr, Record, RecordObj, RelationDecl, RelationKind};
use crate::buffers::Scalar;
use crate::error::{CoreError, CoreResult};
use crate::types::ObjectId;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Read-only handle onto a record.
///
/// Cloning a handle shares the record; the record is freed when its
/// collection and every handle are gone.
pub struct Object<R: Record> {
    pub(crate) ptr: ObjPtr<R>,
}

/// Handles that can be turned into an [`Object`].
pub trait AsObject<R: Record> {
    /// Returns a read-only handle onto the same record.
    fn as_object(&self) -> Object<R>;
}

fn relation_decl<R: Record>(relation: usize) -> CoreResult<&'static RelationDecl> {
    R::RELATIONS.get(relation).ok_or_else(|| {
        CoreError::invalid_operation(format!("{} has no relation {relation}", R::TYPE_NAME))
    })
}

fn check_target<R: Record, T: Record>(decl: &RelationDecl) -> CoreResult<()> {
    if decl.target == T::TYPE_NAME {
        Ok(())
    } else {
        Err(CoreError::type_mismatch(
            format!("{}.{} -> {}", R::TYPE_NAME, decl.name, decl.target),
            T::TYPE_NAME,
        ))
    }
}

fn resolve_link<T: Record>(link: &Link) -> CoreResult<Object<T>> {
    let target = link
        .target()
        .ok_or(CoreError::UnresolvedReference { id: link.id() })?;
    let type_name = target.type_name();
    target
        .downcast::<T>()
        .map(Object::from_ptr)
        .ok_or_else(|| CoreError::type_mismatch(T::TYPE_NAME, type_name))
}

impl<R: Record> Object<R> {
    pub(crate) fn from_ptr(ptr: ObjPtr<R>) -> Self {
        Self { ptr }
    }

    pub(crate) fn erased(&self) -> ErasedObject {
        ErasedObject::new(Arc::clone(&self.ptr))
    }

    /// Returns the record's current id.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.ptr.read().id
    }

    /// Borrows the record's data.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, R::Data> {
        RwLockReadGuard::map(self.ptr.read(), |obj| &obj.data)
    }

    /// Returns the number of strong owners: the owning collection plus every
    /// live handle.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.ptr)
    }

    /// Returns `true` if both handles point at the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ptr, &other.ptr)
    }

    /// Reinterprets the handle as a handle of type `U`, if the record is one.
    #[must_use]
    pub fn cast<U: Record>(&self) -> Option<Object<U>> {
        let any: Arc<dyn Any + Send + Sync> = self.ptr.clone();
        any.downcast::<RwLock<RecordObj<U>>>()
            .ok()
            .map(Object::from_ptr)
    }

    /// Returns the ids of the targets of `relation`, nulls included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an undeclared relation.
    pub fn links(&self, relation: usize) -> CoreResult<Vec<ObjectId>> {
        relation_decl::<R>(relation)?;
        let obj = self.ptr.read();
        Ok(obj.relations[relation].iter().map(Link::id).collect())
    }

    /// Returns the targets of `relation` in insertion order, skipping nulls.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnresolvedReference`] if a target has not been
    /// bound yet, and [`CoreError::TypeMismatch`] if `T` is not the declared
    /// target type.
    pub fn related<T: Record>(&self, relation: usize) -> CoreResult<Vec<Object<T>>> {
        let decl = relation_decl::<R>(relation)?;
        check_target::<R, T>(decl)?;
        let obj = self.ptr.read();
        obj.relations[relation]
            .iter()
            .filter(|link| !link.id().is_null())
            .map(resolve_link::<T>)
            .collect()
    }

    /// Returns the first target of `relation`, or `None` if it is empty or
    /// null.
    ///
    /// # Errors
    ///
    /// Same as [`related`](Self::related).
    pub fn related_one<T: Record>(&self, relation: usize) -> CoreResult<Option<Object<T>>> {
        let decl = relation_decl::<R>(relation)?;
        check_target::<R, T>(decl)?;
        let obj = self.ptr.read();
        match obj.relations[relation].first() {
            Some(link) if !link.id().is_null() => resolve_link::<T>(link).map(Some),
            _ => Ok(None),
        }
    }

    /// Returns the number of entries of `relation`.
    pub fn related_len(&self, relation: usize) -> CoreResult<usize> {
        relation_decl::<R>(relation)?;
        Ok(self.ptr.read().relations[relation].len())
    }

    /// Returns a copy of the values of vector member `member`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an undeclared member and
    /// [`CoreError::TypeMismatch`] if `T` is not its element type.
    pub fn vector_member<T: Scalar>(&self, member: usize) -> CoreResult<Vec<T>> {
        let decl = R::VECTOR_MEMBERS.get(member).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no vector member {member}", R::TYPE_NAME))
        })?;
        let obj = self.ptr.read();
        T::as_slice(&obj.vector_members[member])
            .map(<[T]>::to_vec)
            .ok_or_else(|| CoreError::type_mismatch(T::KIND.type_name(), decl.kind.type_name()))
    }
}

impl<R: Record> Clone for Object<R> {
    fn clone(&self) -> Self {
        Self::from_ptr(Arc::clone(&self.ptr))
    }
}

impl<R: Record> PartialEq for Object<R> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<R: Record> Eq for Object<R> {}

impl<R: Record> fmt::Debug for Object<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obj = self.ptr.read_recursive();
        f.debug_struct("Object")
            .field("type", &R::TYPE_NAME)
            .field("id", &obj.id)
            .field("data", &obj.data)
            .finish()
    }
}

impl<R: Record> AsObject<R> for Object<R> {
    fn as_object(&self) -> Object<R> {
        self.clone()
    }
}

/// Mutable handle onto a record.
///
/// Dereferences to [`Object`] for read access. Relations are set through
/// the handle; a relation only stores a non-owning link to its target.
///
/// ```
/// use evdm_core::{MutableObject, Record, RelationDecl};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # pub struct Energy { pub value: f32 }
/// # pub struct Hit;
/// # impl Record for Hit { type Data = Energy; const TYPE_NAME: &'static str = "Hit"; }
/// # pub struct Cluster;
/// # impl Record for Cluster {
/// #     type Data = Energy;
/// #     const TYPE_NAME: &'static str = "Cluster";
/// #     const RELATIONS: &'static [RelationDecl] = &[RelationDecl::one_to_many("hits", "Hit")];
/// # }
/// let hit = MutableObject::<Hit>::with_data(Energy { value: 2.0 });
/// let cluster = MutableObject::<Cluster>::new();
/// cluster.add_related(0, &hit).unwrap();
///
/// let hits = cluster.related::<Hit>(0).unwrap();
/// assert_eq!(hits[0].data().value, 2.0);
/// ```
pub struct MutableObject<R: Record> {
    inner: Object<R>,
}

impl<R: Record> MutableObject<R> {
    /// Creates a record with default data, not yet owned by a collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_data(R::Data::default())
    }

    /// Creates a record with the given data, not yet owned by a collection.
    #[must_use]
    pub fn with_data(data: R::Data) -> Self {
        Self::from_ptr(RecordObj::<R>::new(data).into_ptr())
    }

    pub(crate) fn from_ptr(ptr: ObjPtr<R>) -> Self {
        Self {
            inner: Object::from_ptr(ptr),
        }
    }

    /// Borrows the record's data mutably.
    pub fn data_mut(&self) -> MappedRwLockWriteGuard<'_, R::Data> {
        RwLockWriteGuard::map(self.inner.ptr.write(), |obj| &mut obj.data)
    }

    /// Replaces the record's data.
    pub fn set_data(&self, data: R::Data) {
        self.inner.ptr.write().data = data;
    }

    /// Sets the single target of a one-to-one relation.
    ///
    /// # Errors
    ///
    /// Fails for undeclared or one-to-many relations and for a target of the
    /// wrong type.
    pub fn set_related<T: Record>(
        &self,
        relation: usize,
        target: &impl AsObject<T>,
    ) -> CoreResult<()> {
        let decl = relation_decl::<R>(relation)?;
        check_target::<R, T>(decl)?;
        if decl.kind != RelationKind::OneToOne {
            return Err(CoreError::invalid_operation(format!(
                "{}.{} is one-to-many; use add_related",
                R::TYPE_NAME,
                decl.name
            )));
        }
        // Built before locking: reading the target id locks the target,
        // which may be this record.
        let link = Link::bound(&target.as_object().erased());
        self.inner.ptr.write().relations[relation] = vec![link];
        Ok(())
    }

    /// Appends a target to a one-to-many relation.
    ///
    /// # Errors
    ///
    /// Fails for undeclared or one-to-one relations and for a target of the
    /// wrong type.
    pub fn add_related<T: Record>(
        &self,
        relation: usize,
        target: &impl AsObject<T>,
    ) -> CoreResult<()> {
        let decl = relation_decl::<R>(relation)?;
        check_target::<R, T>(decl)?;
        if decl.kind != RelationKind::OneToMany {
            return Err(CoreError::invalid_operation(format!(
                "{}.{} is one-to-one; use set_related",
                R::TYPE_NAME,
                decl.name
            )));
        }
        let link = Link::bound(&target.as_object().erased());
        self.inner.ptr.write().relations[relation].push(link);
        Ok(())
    }

    /// Empties a relation.
    pub fn clear_related(&self, relation: usize) -> CoreResult<()> {
        relation_decl::<R>(relation)?;
        self.inner.ptr.write().relations[relation].clear();
        Ok(())
    }

    /// Appends a value to vector member `member`.
    ///
    /// # Errors
    ///
    /// Fails for an undeclared member or a value of the wrong type.
    pub fn push_vector_member<T: Scalar>(&self, member: usize, value: T) -> CoreResult<()> {
        let decl = R::VECTOR_MEMBERS.get(member).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no vector member {member}", R::TYPE_NAME))
        })?;
        let mut obj = self.inner.ptr.write();
        if T::push_into(&mut obj.vector_members[member], value) {
            Ok(())
        } else {
            Err(CoreError::type_mismatch(
                decl.kind.type_name(),
                T::KIND.type_name(),
            ))
        }
    }

    /// Returns a read-only handle onto the same record.
    #[must_use]
    pub fn as_object(&self) -> Object<R> {
        self.inner.clone()
    }

    /// Gives up write access.
    #[must_use]
    pub fn freeze(self) -> Object<R> {
        self.inner
    }
}

impl<R: Record> Default for MutableObject<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Deref for MutableObject<R> {
    type Target = Object<R>;

    fn deref(&self) -> &Object<R> {
        &self.inner
    }
}

impl<R: Record> Clone for MutableObject<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Record> PartialEq for MutableObject<R> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<R: Record> fmt::Debug for MutableObject<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<R: Record> AsObject<R> for MutableObject<R> {
    fn as_object(&self) -> Object<R> {
        self.inner.clone()
    }
}

impl<R: Record> From<MutableObject<R>> for Object<R> {
    fn from(obj: MutableObject<R>) -> Self {
        obj.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Node, Particle, Vertex, NEXT, PARTICLES, WEIGHTS};

    #[test]
    fn fresh_record_is_untracked() {
        let particle = MutableObject::<Particle>::new();
        assert!(particle.object_id().is_untracked());
        assert_eq!(particle.data().pdg, 0);
    }

    #[test]
    fn clone_and_drop_track_owners() {
        let particle = MutableObject::<Particle>::new();
        assert_eq!(particle.ref_count(), 1);

        let view = particle.as_object();
        let copy = view.clone();
        assert_eq!(particle.ref_count(), 3);

        drop(view);
        drop(copy);
        assert_eq!(particle.ref_count(), 1);
    }

    #[test]
    fn writes_are_visible_through_every_handle() {
        let particle = MutableObject::<Particle>::new();
        let view = particle.as_object();
        particle.data_mut().energy = 12.5;

        assert_eq!(view.data().energy, 12.5);
        assert_eq!(view, particle.as_object());
    }

    #[test]
    fn relations_keep_insertion_order() {
        let vertex = MutableObject::<Vertex>::new();
        let particles: Vec<_> = (0..3)
            .map(|pdg| {
                let p = MutableObject::<Particle>::new();
                p.data_mut().pdg = pdg;
                vertex.add_related(PARTICLES, &p).unwrap();
                p
            })
            .collect();

        let related = vertex.related::<Particle>(PARTICLES).unwrap();
        assert_eq!(related.len(), 3);
        for (expected, actual) in particles.iter().zip(&related) {
            assert!(actual.ptr_eq(&expected.as_object()));
        }
        assert_eq!(vertex.related_len(PARTICLES).unwrap(), 3);
    }

    #[test]
    fn relations_do_not_own_targets() {
        let vertex = MutableObject::<Vertex>::new();
        let particle = MutableObject::<Particle>::new();
        vertex.add_related(PARTICLES, &particle).unwrap();
        assert_eq!(particle.ref_count(), 1);

        drop(particle);
        assert!(matches!(
            vertex.related::<Particle>(PARTICLES),
            Err(CoreError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn wrong_target_type_is_rejected() {
        let vertex = MutableObject::<Vertex>::new();
        let other = MutableObject::<Vertex>::new();
        assert!(matches!(
            vertex.add_related(PARTICLES, &other),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            vertex.related::<Vertex>(PARTICLES),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(vertex.links(5).is_err());
    }

    #[test]
    fn one_to_one_replaces() {
        let a = MutableObject::<Node>::new();
        let b = MutableObject::<Node>::new();
        let c = MutableObject::<Node>::new();

        a.set_related(NEXT, &b).unwrap();
        a.set_related(NEXT, &c).unwrap();
        let next = a.related_one::<Node>(NEXT).unwrap().unwrap();
        assert!(next.ptr_eq(&c.as_object()));

        a.clear_related(NEXT).unwrap();
        assert!(a.related_one::<Node>(NEXT).unwrap().is_none());
        assert!(a.add_related(NEXT, &b).is_err());
    }

    #[test]
    fn self_link_does_not_deadlock_or_leak() {
        let node = MutableObject::<Node>::new();
        let weak = Arc::downgrade(&node.ptr);
        node.set_related(NEXT, &node).unwrap();

        let next = node.related_one::<Node>(NEXT).unwrap().unwrap();
        assert!(next.ptr_eq(&node.as_object()));
        assert_eq!(node.links(NEXT).unwrap(), vec![ObjectId::UNTRACKED]);

        drop(next);
        drop(node);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn vector_members() {
        let vertex = MutableObject::<Vertex>::new();
        vertex.push_vector_member(WEIGHTS, 0.5_f32).unwrap();
        vertex.push_vector_member(WEIGHTS, 0.25_f32).unwrap();

        assert_eq!(vertex.vector_member::<f32>(WEIGHTS).unwrap(), vec![0.5, 0.25]);
        assert!(vertex.push_vector_member(WEIGHTS, 1_i32).is_err());
        assert!(vertex.vector_member::<f64>(WEIGHTS).is_err());
        assert!(vertex.vector_member::<f32>(3).is_err());
    }

    #[test]
    fn cast_checks_the_record_type() {
        let particle = MutableObject::<Particle>::new().freeze();
        assert!(particle.cast::<Particle>().is_some());
        assert!(particle.cast::<Vertex>().is_none());
    }
}
