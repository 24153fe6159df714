//! Bidirectional mapping between collection names and ids.

use crate::error::{CoreError, CoreResult};
use crate::types::CollectionId;
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
struct Entries {
    ids: Vec<CollectionId>,
    names: Vec<String>,
}

impl Entries {
    fn position_of_id(&self, id: CollectionId) -> Option<usize> {
        self.ids.iter().position(|&candidate| candidate == id)
    }

    fn position_of_name(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }
}

/// Name/id table shared by a frame and everything reading or writing it.
///
/// The table only grows. All methods take `&self` and lock internally, so a
/// table can be shared through an `Arc` between a frame and its source.
///
/// # Invariants
///
/// - Every id maps to exactly one name and vice versa
/// - Entries keep their insertion order
#[derive(Debug, Default)]
pub struct CollectionIdTable {
    entries: Mutex<Entries>,
}

impl CollectionIdTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a table from parallel id and name lists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StructuralInconsistency`] if the lists differ in
    /// length or contain duplicates.
    pub fn from_parts(ids: Vec<CollectionId>, names: Vec<String>) -> CoreResult<Self> {
        if ids.len() != names.len() {
            return Err(CoreError::structural(format!(
                "id table has {} ids but {} names",
                ids.len(),
                names.len()
            )));
        }
        let unique_ids: HashSet<_> = ids.iter().collect();
        let unique_names: HashSet<_> = names.iter().collect();
        if unique_ids.len() != ids.len() || unique_names.len() != names.len() {
            return Err(CoreError::structural("id table contains duplicate entries"));
        }

        Ok(Self {
            entries: Mutex::new(Entries { ids, names }),
        })
    }

    /// Adds `name` and returns its id. Adding a known name returns the
    /// existing id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionIdCollision`] if the name hashes to the
    /// reserved id or to the id of a different name.
    pub fn add(&self, name: &str) -> CoreResult<CollectionId> {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.position_of_name(name) {
            return Ok(entries.ids[pos]);
        }

        let id = CollectionId::from_name(name);
        if !id.is_valid() {
            return Err(CoreError::CollectionIdCollision {
                name: name.to_string(),
                existing: "<invalid>".to_string(),
            });
        }
        if let Some(pos) = entries.position_of_id(id) {
            return Err(CoreError::CollectionIdCollision {
                name: name.to_string(),
                existing: entries.names[pos].clone(),
            });
        }

        entries.ids.push(id);
        entries.names.push(name.to_string());
        Ok(id)
    }

    /// Returns the name registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionIdNotFound`] for unknown ids.
    pub fn name(&self, id: CollectionId) -> CoreResult<String> {
        let entries = self.entries.lock();
        entries
            .position_of_id(id)
            .map(|pos| entries.names[pos].clone())
            .ok_or(CoreError::CollectionIdNotFound { id })
    }

    /// Returns the id registered for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CollectionNameNotFound`] for unknown names.
    pub fn collection_id(&self, name: &str) -> CoreResult<CollectionId> {
        let entries = self.entries.lock();
        entries
            .position_of_name(name)
            .map(|pos| entries.ids[pos])
            .ok_or_else(|| CoreError::CollectionNameNotFound {
                name: name.to_string(),
            })
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn present(&self, name: &str) -> bool {
        self.entries.lock().position_of_name(name).is_some()
    }

    /// Returns all ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<CollectionId> {
        self.entries.lock().ids.clone()
    }

    /// Returns all names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().names.clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().ids.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().ids.is_empty()
    }
}

impl Clone for CollectionIdTable {
    fn clone(&self) -> Self {
        Self {
            entries: Mutex::new(self.entries.lock().clone()),
        }
    }
}
