//! Columnar buffers exchanged between collections and backends.
//!
//! A collection in its persisted form is a [`CollectionBuffers`]: one
//! payload column with a data record per object, one reference column per
//! relation and one value column per vector member. Reference and value
//! columns are flattened; the per-record `counts` say how many consecutive
//! entries belong to each record.

use crate::error::{CoreError, CoreResult};
use crate::types::ObjectId;
use evdm_codec::CodecResult;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::ops::Range;

/// Element type of a vector member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// `i32`
    Int32,
    /// `u32`
    UInt32,
    /// `i64`
    Int64,
    /// `u64`
    UInt64,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
}

impl ScalarKind {
    /// Returns the datamodel spelling of the type.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Int32 => "int",
            Self::UInt32 => "unsigned int",
            Self::Int64 => "long",
            Self::UInt64 => "unsigned long",
            Self::Float32 => "float",
            Self::Float64 => "double",
        }
    }
}

/// A homogeneous column of scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarVec {
    /// `i32` values.
    Int32(Vec<i32>),
    /// `u32` values.
    UInt32(Vec<u32>),
    /// `i64` values.
    Int64(Vec<i64>),
    /// `u64` values.
    UInt64(Vec<u64>),
    /// `f32` values.
    Float32(Vec<f32>),
    /// `f64` values.
    Float64(Vec<f64>),
}

macro_rules! each_scalar_vec {
    ($value:expr, $values:ident => $body:expr) => {
        match $value {
            ScalarVec::Int32($values) => $body,
            ScalarVec::UInt32($values) => $body,
            ScalarVec::Int64($values) => $body,
            ScalarVec::UInt64($values) => $body,
            ScalarVec::Float32($values) => $body,
            ScalarVec::Float64($values) => $body,
        }
    };
}

impl ScalarVec {
    /// Creates an empty column of the given kind.
    #[must_use]
    pub fn new(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Int32 => Self::Int32(Vec::new()),
            ScalarKind::UInt32 => Self::UInt32(Vec::new()),
            ScalarKind::Int64 => Self::Int64(Vec::new()),
            ScalarKind::UInt64 => Self::UInt64(Vec::new()),
            ScalarKind::Float32 => Self::Float32(Vec::new()),
            ScalarKind::Float64 => Self::Float64(Vec::new()),
        }
    }

    /// Returns the element kind.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Int32(_) => ScalarKind::Int32,
            Self::UInt32(_) => ScalarKind::UInt32,
            Self::Int64(_) => ScalarKind::Int64,
            Self::UInt64(_) => ScalarKind::UInt64,
            Self::Float32(_) => ScalarKind::Float32,
            Self::Float64(_) => ScalarKind::Float64,
        }
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        each_scalar_vec!(self, values => values.len())
    }

    /// Returns `true` if the column holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `range` into a new column of the same kind.
    ///
    /// Returns `None` if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Option<Self> {
        Some(match self {
            Self::Int32(v) => Self::Int32(v.get(range)?.to_vec()),
            Self::UInt32(v) => Self::UInt32(v.get(range)?.to_vec()),
            Self::Int64(v) => Self::Int64(v.get(range)?.to_vec()),
            Self::UInt64(v) => Self::UInt64(v.get(range)?.to_vec()),
            Self::Float32(v) => Self::Float32(v.get(range)?.to_vec()),
            Self::Float64(v) => Self::Float64(v.get(range)?.to_vec()),
        })
    }

    /// Appends all values of `other`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the kinds differ.
    pub fn extend_from(&mut self, other: &Self) -> CoreResult<()> {
        match (self, other) {
            (Self::Int32(a), Self::Int32(b)) => a.extend_from_slice(b),
            (Self::UInt32(a), Self::UInt32(b)) => a.extend_from_slice(b),
            (Self::Int64(a), Self::Int64(b)) => a.extend_from_slice(b),
            (Self::UInt64(a), Self::UInt64(b)) => a.extend_from_slice(b),
            (Self::Float32(a), Self::Float32(b)) => a.extend_from_slice(b),
            (Self::Float64(a), Self::Float64(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(CoreError::type_mismatch(
                    this.kind().type_name(),
                    other.kind().type_name(),
                ))
            }
        }
        Ok(())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust scalar type usable as a vector member element.
pub trait Scalar: sealed::Sealed + Copy + Send + Sync + 'static {
    /// The matching column kind.
    const KIND: ScalarKind;

    /// Views a column as a slice of this type, if the kinds match.
    fn as_slice(values: &ScalarVec) -> Option<&[Self]>;

    /// Appends a value, returning `false` if the kinds differ.
    fn push_into(values: &mut ScalarVec, value: Self) -> bool;
}

macro_rules! scalar {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl Scalar for $ty {
            const KIND: ScalarKind = ScalarKind::$variant;

            fn as_slice(values: &ScalarVec) -> Option<&[Self]> {
                match values {
                    ScalarVec::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn push_into(values: &mut ScalarVec, value: Self) -> bool {
                match values {
                    ScalarVec::$variant(v) => {
                        v.push(value);
                        true
                    }
                    _ => false,
                }
            }
        }
    };
}

scalar!(i32, Int32);
scalar!(u32, UInt32);
scalar!(i64, Int64);
scalar!(u64, UInt64);
scalar!(f32, Float32);
scalar!(f64, Float64);

/// The payload column of a collection: a vector of data records.
///
/// Implemented for every `Vec<D>` whose records can be encoded. The concrete
/// vector is recovered with [`downcast_ref`](dyn PayloadBuffer::downcast_ref).
pub trait PayloadBuffer: Any + Send + Sync + fmt::Debug {
    /// Number of data records.
    fn len(&self) -> usize;

    /// Returns `true` if there are no data records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the records as one CBOR array.
    fn encode(&self) -> CodecResult<Vec<u8>>;

    /// Copies the buffer.
    fn clone_box(&self) -> Box<dyn PayloadBuffer>;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;

    #[doc(hidden)]
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<D> PayloadBuffer for Vec<D>
where
    D: Serialize + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn encode(&self) -> CodecResult<Vec<u8>> {
        evdm_codec::to_cbor(self)
    }

    fn clone_box(&self) -> Box<dyn PayloadBuffer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl dyn PayloadBuffer {
    /// Returns the payload as a vector of `D`, if that is its type.
    #[must_use]
    pub fn downcast_ref<D: 'static>(&self) -> Option<&Vec<D>> {
        self.as_any().downcast_ref::<Vec<D>>()
    }

    /// Takes the payload as a vector of `D`, handing the box back on a
    /// type mismatch.
    pub fn downcast<D: 'static>(self: Box<Self>) -> Result<Vec<D>, Box<dyn Any>> {
        self.into_any().downcast::<Vec<D>>().map(|values| *values)
    }
}

/// Flattened references of one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationBuffer {
    /// Relation name.
    pub name: String,
    /// Targets of all records, concatenated.
    pub refs: Vec<ObjectId>,
    /// Number of targets per record. Empty for subset collections.
    pub counts: Vec<u32>,
}

impl RelationBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Flattened values of one vector member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMemberBuffer {
    /// Member name.
    pub name: String,
    /// Values of all records, concatenated.
    pub values: ScalarVec,
    /// Number of values per record.
    pub counts: Vec<u32>,
}

impl VectorMemberBuffer {
    /// Creates an empty buffer of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            values: ScalarVec::new(kind),
            counts: Vec::new(),
        }
    }

    /// Returns the element type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.values.kind().type_name()
    }
}

/// Name of the single reference column of a subset collection.
pub const SUBSET_REFERENCES: &str = "objIdx";

/// The columnar form of one collection.
///
/// # Invariants
///
/// For a regular collection with `n` data records, every reference and
/// vector member column has `n` counts and the counts sum to the column
/// length. A subset collection has no payload, exactly one reference column
/// without counts, and no vector members. [`check_consistency`] verifies
/// both shapes.
///
/// [`check_consistency`]: CollectionBuffers::check_consistency
#[derive(Debug, Default)]
pub struct CollectionBuffers {
    /// Payload column; `None` for subset collections.
    pub data: Option<Box<dyn PayloadBuffer>>,
    /// One column per relation, in declaration order.
    pub references: Vec<RelationBuffer>,
    /// One column per vector member, in declaration order.
    pub vector_members: Vec<VectorMemberBuffer>,
}

impl CollectionBuffers {
    /// Returns the number of records described by these buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            Some(data) => data.len(),
            None => self.references.first().map_or(0, |r| r.refs.len()),
        }
    }

    /// Returns `true` if the buffers describe no record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the payload as a vector of `D`.
    #[must_use]
    pub fn data_as_vec<D: 'static>(&self) -> Option<&Vec<D>> {
        self.data.as_deref().and_then(|data| data.downcast_ref::<D>())
    }

    /// Verifies the column shapes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StructuralInconsistency`] describing the first
    /// column that does not fit.
    pub fn check_consistency(&self, subset: bool) -> CoreResult<()> {
        if subset {
            if self.data.is_some() {
                return Err(CoreError::structural("subset collection carries a payload"));
            }
            if self.references.len() != 1 || !self.references[0].counts.is_empty() {
                return Err(CoreError::structural(
                    "subset collection needs exactly one reference column without counts",
                ));
            }
            if !self.vector_members.is_empty() {
                return Err(CoreError::structural(
                    "subset collection carries vector members",
                ));
            }
            return Ok(());
        }

        let records = self
            .data
            .as_ref()
            .map(|data| data.len())
            .ok_or_else(|| CoreError::structural("collection has no payload"))?;

        for relation in &self.references {
            check_counts(&relation.name, &relation.counts, relation.refs.len(), records)?;
        }
        for member in &self.vector_members {
            check_counts(&member.name, &member.counts, member.values.len(), records)?;
        }
        Ok(())
    }
}

impl Clone for CollectionBuffers {
    fn clone(&self) -> Self {
        Self {
            data: self.data.as_ref().map(|data| data.clone_box()),
            references: self.references.clone(),
            vector_members: self.vector_members.clone(),
        }
    }
}

fn check_counts(name: &str, counts: &[u32], column_len: usize, records: usize) -> CoreResult<()> {
    if counts.len() != records {
        return Err(CoreError::structural(format!(
            "column '{name}' has {} counts for {records} records",
            counts.len()
        )));
    }
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if total != column_len as u64 {
        return Err(CoreError::structural(format!(
            "column '{name}' counts sum to {total} but holds {column_len} entries"
        )));
    }
    Ok(())
}

/// Turns per-record counts into the ranges each record owns.
#[must_use]
pub fn count_ranges(counts: &[u32]) -> Vec<Range<usize>> {
    let mut start = 0usize;
    counts
        .iter()
        .map(|&count| {
            let end = start + count as usize;
            let range = start..end;
            start = end;
            range
        })
        .collect()
}

/// Encodes a count the way buffers store it.
pub(crate) fn to_count(len: usize) -> CoreResult<u32> {
    u32::try_from(len).map_err(|_| CoreError::structural(format!("{len} entries exceed a count")))
}
