//! # evdm core
//!
//! An event data model for detector data: typed records living in
//! columnar collections, references between records across collections,
//! and per-event frames that load collections lazily from persisted
//! buffers.
//!
//! This crate provides:
//! - Record handles with shared ownership ([`Object`], [`MutableObject`])
//! - Typed collections and their columnar buffers ([`RecordCollection`],
//!   [`CollectionBuffers`])
//! - A name/id table shared between frames ([`CollectionIdTable`])
//! - Typed key/value metadata ([`GenericParameters`])
//! - Frames that bind references on demand, including reference cycles
//!   between collections ([`Frame`])
//! - A registry turning persisted type names into collections
//!   ([`DatamodelRegistry`])
//! - A block file backend ([`FrameWriter`], [`FrameReader`])
//!
//! ## Example
//!
//! ```
//! use evdm_core::{Frame, Record, RecordCollection};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! # pub struct HitData { pub energy: f32 }
//! # pub struct Hit;
//! # impl Record for Hit { type Data = HitData; const TYPE_NAME: &'static str = "Hit"; }
//!
//! let mut hits = RecordCollection::<Hit>::new();
//! hits.create_with(HitData { energy: 1.5 }).unwrap();
//!
//! let mut frame = Frame::new();
//! frame.put("hits", hits).unwrap();
//! let hits = frame.get_as::<Hit>("hits").unwrap();
//! assert_eq!(hits.get(0).unwrap().data().energy, 1.5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffers;
mod collection;
mod config;
mod error;
mod frame;
mod id_table;
pub mod io;
mod parameters;
mod record;
mod registry;
mod source;
mod types;
mod version;

#[cfg(test)]
mod testing;

pub use buffers::{
    count_ranges, CollectionBuffers, PayloadBuffer, RelationBuffer, Scalar, ScalarKind, ScalarVec,
    VectorMemberBuffer, SUBSET_REFERENCES,
};
pub use collection::{
    Collection, CollectionProvider, CollectionState, Lookup, RecordCollection, ReferenceState,
};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use frame::Frame;
pub use id_table::CollectionIdTable;
pub use io::{FrameData, FrameReader, FrameWriter};
pub use parameters::{GenericParameters, ParameterValue};
pub use record::{
    collection_type_name, AsObject, ErasedObject, MutableObject, Object, Record, RelationDecl,
    RelationKind, VectorMemberDecl,
};
pub use registry::{CreationFn, DatamodelRegistry, RelationNames, MAX_SCHEMA_VERSION};
pub use source::FrameSource;
pub use types::{CollectionId, ObjectId, SchemaVersion};
pub use version::{build_version, Compatibility, Version, BUILD_VERSION, VERSION};
