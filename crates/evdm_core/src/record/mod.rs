//! Datamodel records and the handles users hold onto them.
//!
//! A datamodel type implements [`Record`]: it names its plain data payload,
//! its relations to other records and its variable-length vector members.
//! Records live in shared storage; users see them only through
//! [`Object`] (read-only) and [`MutableObject`] handles. Cloning a handle
//! shares the record and dropping the last handle frees it.
//!
//! Relations are non-owning. A relation keeps the [`ObjectId`] of its target
//! and, once bound, a weak pointer to the target's storage, so reference
//! cycles between records never keep each other alive.
//!
//! [`ObjectId`]: crate::ObjectId

mod handle;
mod link;
mod obj;
mod wrapper;

pub use handle::{AsObject, MutableObject, Object};
pub use link::ErasedObject;

pub(crate) use link::Link;
pub(crate) use obj::{ObjPtr, RecordObj};

use crate::buffers::ScalarKind;
use crate::types::SchemaVersion;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// At most one target.
    OneToOne,
    /// Any number of targets, in insertion order.
    OneToMany,
}

/// Declaration of one relation of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDecl {
    /// Relation name, used for its reference buffer.
    pub name: &'static str,
    /// `TYPE_NAME` of the target record type.
    pub target: &'static str,
    /// Cardinality.
    pub kind: RelationKind,
}

impl RelationDecl {
    /// Declares a single-valued relation.
    #[must_use]
    pub const fn one_to_one(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::OneToOne,
        }
    }

    /// Declares a multi-valued relation.
    #[must_use]
    pub const fn one_to_many(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            target,
            kind: RelationKind::OneToMany,
        }
    }
}

/// Declaration of one variable-length member of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorMemberDecl {
    /// Member name, used for its buffer.
    pub name: &'static str,
    /// Element type.
    pub kind: ScalarKind,
}

impl VectorMemberDecl {
    /// Declares a vector member.
    #[must_use]
    pub const fn new(name: &'static str, kind: ScalarKind) -> Self {
        Self { name, kind }
    }
}

/// A datamodel type.
///
/// ```
/// use evdm_core::{Record, RelationDecl};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// pub struct HitData {
///     pub energy: f32,
/// }
///
/// pub struct Hit;
///
/// impl Record for Hit {
///     type Data = HitData;
///     const TYPE_NAME: &'static str = "Hit";
/// }
///
/// pub struct Cluster;
///
/// impl Record for Cluster {
///     type Data = HitData;
///     const TYPE_NAME: &'static str = "Cluster";
///     const RELATIONS: &'static [RelationDecl] = &[RelationDecl::one_to_many("hits", "Hit")];
/// }
/// ```
pub trait Record: Send + Sync + 'static {
    /// Plain fixed-layout payload of one record.
    type Data: Clone + Default + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Value type name; collections are named `{TYPE_NAME}Collection`.
    const TYPE_NAME: &'static str;

    /// Current schema version of the payload layout.
    const SCHEMA_VERSION: SchemaVersion = 1;

    /// Relations, addressed by position.
    const RELATIONS: &'static [RelationDecl] = &[];

    /// Vector members, addressed by position.
    const VECTOR_MEMBERS: &'static [VectorMemberDecl] = &[];
}

/// Returns the collection type name of `R`.
#[must_use]
pub fn collection_type_name<R: Record>() -> String {
    format!("{}Collection", R::TYPE_NAME)
}
