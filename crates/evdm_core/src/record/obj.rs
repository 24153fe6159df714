//! Shared record storage.

use super::{Link, Record};
use crate::buffers::ScalarVec;
use crate::types::ObjectId;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Storage of one record, shared by its collection and all handles.
pub(crate) struct RecordObj<R: Record> {
    pub(crate) id: ObjectId,
    pub(crate) data: R::Data,
    /// One link list per declared relation.
    pub(crate) relations: Vec<Vec<Link>>,
    /// One column per declared vector member.
    pub(crate) vector_members: Vec<ScalarVec>,
}

pub(crate) type ObjPtr<R> = Arc<RwLock<RecordObj<R>>>;

impl<R: Record> RecordObj<R> {
    pub(crate) fn new(data: R::Data) -> Self {
        Self {
            id: ObjectId::UNTRACKED,
            data,
            relations: vec![Vec::new(); R::RELATIONS.len()],
            vector_members: R::VECTOR_MEMBERS
                .iter()
                .map(|member| ScalarVec::new(member.kind))
                .collect(),
        }
    }

    pub(crate) fn into_ptr(self) -> ObjPtr<R> {
        Arc::new(RwLock::new(self))
    }

    /// Releases the record from its collection. Only the owning collection
    /// calls this when it is cleared.
    pub(crate) fn detach(&mut self) {
        self.id = ObjectId::UNTRACKED;
    }
}

impl<R: Record> fmt::Debug for RecordObj<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(R::TYPE_NAME)
            .field("id", &self.id)
            .field("data", &self.data)
            .field("relations", &self.relations)
            .field("vector_members", &self.vector_members)
            .finish()
    }
}
