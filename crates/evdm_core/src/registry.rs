//! Runtime registry of datamodel types.
//!
//! Backends only know collection type names and schema versions. The
//! registry turns those into empty collections of the right Rust type, so
//! that persisted buffers can be handed to them. It is an explicit object:
//! build one per datamodel (or per program) and share it behind an `Arc`.

use crate::buffers::{CollectionBuffers, PayloadBuffer, RelationBuffer, VectorMemberBuffer};
use crate::collection::{Collection, RecordCollection};
use crate::error::{CoreError, CoreResult};
use crate::record::{collection_type_name, Record};
use crate::types::SchemaVersion;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Highest schema version a factory can be registered for.
pub const MAX_SCHEMA_VERSION: SchemaVersion = 1024;

/// Builds an empty collection; the argument selects subset mode.
pub type CreationFn = Arc<dyn Fn(bool) -> Box<dyn Collection> + Send + Sync>;

/// Relation and vector member names of one value type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationNames {
    /// Relation names in declaration order.
    pub relations: Vec<&'static str>,
    /// Vector member names in declaration order.
    pub vector_members: Vec<&'static str>,
}

#[derive(Default)]
struct TypeEntry {
    /// Index `v - 1` holds the factory for schema version `v`.
    versions: Vec<Option<CreationFn>>,
}

/// Maps collection type names and schema versions to collection factories.
///
/// ```
/// use evdm_core::{DatamodelRegistry, Record};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # pub struct HitData { pub energy: f32 }
/// # pub struct Hit;
/// # impl Record for Hit { type Data = HitData; const TYPE_NAME: &'static str = "Hit"; }
/// let mut registry = DatamodelRegistry::new();
/// registry.register::<Hit>().unwrap();
///
/// let collection = registry.create_collection("HitCollection", 1, false).unwrap();
/// assert_eq!(collection.value_type_name(), "Hit");
/// ```
#[derive(Default)]
pub struct DatamodelRegistry {
    types: BTreeMap<String, TypeEntry>,
    names: BTreeMap<&'static str, RelationNames>,
}

impl DatamodelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers record type `R` for every schema version up to its current
    /// one. Versions that already have a factory keep it.
    ///
    /// # Errors
    ///
    /// Fails if `R` declares schema version 0 or one above
    /// [`MAX_SCHEMA_VERSION`].
    pub fn register<R: Record>(&mut self) -> CoreResult<&mut Self> {
        if R::SCHEMA_VERSION == 0 || R::SCHEMA_VERSION > MAX_SCHEMA_VERSION {
            return Err(CoreError::invalid_operation(format!(
                "{} declares unsupported schema version {}",
                R::TYPE_NAME,
                R::SCHEMA_VERSION
            )));
        }

        let type_name = collection_type_name::<R>();
        let create: CreationFn = Arc::new(|subset| -> Box<dyn Collection> {
            Box::new(RecordCollection::<R>::with_subset(subset))
        });
        let entry = self.types.entry(type_name.clone()).or_default();
        let latest = R::SCHEMA_VERSION as usize;
        if entry.versions.len() < latest {
            entry.versions.resize(latest, None);
        }
        for slot in entry.versions.iter_mut().take(latest) {
            if slot.is_none() {
                *slot = Some(Arc::clone(&create));
            }
        }

        self.names.insert(
            R::TYPE_NAME,
            RelationNames {
                relations: R::RELATIONS.iter().map(|r| r.name).collect(),
                vector_members: R::VECTOR_MEMBERS.iter().map(|m| m.name).collect(),
            },
        );
        debug!(collection_type = %type_name, version = R::SCHEMA_VERSION, "registered datamodel type");
        Ok(self)
    }

    /// Registers a factory for schema version `version`.
    ///
    /// If `version` is above every version known for the type, the factory
    /// also serves all versions in between. Otherwise it replaces the
    /// factory of exactly that version.
    ///
    /// # Errors
    ///
    /// Fails for schema version 0 and versions above
    /// [`MAX_SCHEMA_VERSION`].
    pub fn register_creation_fn(
        &mut self,
        collection_type: &str,
        version: SchemaVersion,
        create: CreationFn,
    ) -> CoreResult<()> {
        if version == 0 || version > MAX_SCHEMA_VERSION {
            return Err(CoreError::invalid_operation(format!(
                "schema version {version} is outside 1..={MAX_SCHEMA_VERSION}"
            )));
        }
        let entry = self.types.entry(collection_type.to_string()).or_default();
        let slot = version as usize;
        if entry.versions.len() < slot {
            debug!(
                collection_type,
                from = entry.versions.len() + 1,
                to = version,
                "filling schema versions"
            );
            entry.versions.resize(slot, Some(create));
        } else {
            entry.versions[slot - 1] = Some(create);
        }
        Ok(())
    }

    /// Creates an empty collection for a type name and schema version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownType`] if nothing is registered for the
    /// pair.
    pub fn create_collection(
        &self,
        collection_type: &str,
        version: SchemaVersion,
        subset: bool,
    ) -> CoreResult<Box<dyn Collection>> {
        let create = (version as usize)
            .checked_sub(1)
            .and_then(|slot| self.types.get(collection_type)?.versions.get(slot)?.as_ref())
            .ok_or_else(|| CoreError::UnknownType {
                type_name: collection_type.to_string(),
                version,
            })?;
        Ok(create(subset))
    }

    /// Creates a collection and fills it from raw persisted parts.
    ///
    /// `payload` is the encoded payload column, absent for subset
    /// collections.
    ///
    /// # Errors
    ///
    /// Fails for unknown types, undecodable payloads and inconsistent
    /// columns.
    pub fn create_from_raw(
        &self,
        collection_type: &str,
        version: SchemaVersion,
        subset: bool,
        payload: Option<&[u8]>,
        references: Vec<RelationBuffer>,
        vector_members: Vec<VectorMemberBuffer>,
    ) -> CoreResult<Box<dyn Collection>> {
        let mut collection = self.create_collection(collection_type, version, subset)?;
        let data: Option<Box<dyn PayloadBuffer>> = payload
            .map(|bytes| collection.decode_payload(bytes))
            .transpose()?;
        collection.set_buffers(CollectionBuffers {
            data,
            references,
            vector_members,
        })?;
        Ok(collection)
    }

    /// Returns `true` if any version of the collection type is registered.
    #[must_use]
    pub fn is_registered(&self, collection_type: &str) -> bool {
        self.types.contains_key(collection_type)
    }

    /// Returns the newest registered schema version of a collection type.
    #[must_use]
    pub fn latest_version(&self, collection_type: &str) -> Option<SchemaVersion> {
        let entry = self.types.get(collection_type)?;
        let newest = entry.versions.iter().rposition(Option::is_some)?;
        SchemaVersion::try_from(newest + 1).ok()
    }

    /// Returns the relation and vector member names of a value type.
    #[must_use]
    pub fn relation_names(&self, value_type: &str) -> Option<&RelationNames> {
        self.names.get(value_type)
    }

    /// Returns the registered collection type names, sorted.
    #[must_use]
    pub fn collection_types(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for DatamodelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatamodelRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}
