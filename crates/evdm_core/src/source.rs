//! Where a frame gets its persisted collections from.

use crate::collection::Collection;
use crate::error::CoreResult;
use crate::id_table::CollectionIdTable;
use crate::parameters::GenericParameters;
use std::sync::Arc;

/// Persisted data of one frame, handed out collection by collection.
///
/// A frame asks for a collection the first time it is needed. The source
/// returns it filled from its buffers but with references still unbound;
/// the frame binds them.
pub trait FrameSource: Send {
    /// Reads the collection stored under `name`.
    ///
    /// Returns `Ok(None)` if the source has no such collection. Each
    /// collection is handed out at most once.
    fn read_collection(&mut self, name: &str) -> CoreResult<Option<Box<dyn Collection>>>;

    /// Returns the name/id table of the persisted frame.
    fn collection_id_table(&self) -> Arc<CollectionIdTable>;

    /// Returns the parameters stored with the frame.
    fn run_parameters(&self) -> &GenericParameters;

    /// Returns `false` if the source could not provide a usable frame.
    fn is_valid(&self) -> bool;

    /// Returns the names of collections the source can still hand out.
    fn available_collections(&self) -> Vec<String> {
        self.collection_id_table().names()
    }
}
