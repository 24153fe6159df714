//! A small calorimeter and tracking datamodel.
//!
//! The types cover every feature the core supports: one-to-one and
//! one-to-many relations, relations back into the same collection type,
//! a cycle between two collection types, and vector members of different
//! element types.

use evdm_core::{
    record_handle, DatamodelRegistry, Record, RelationDecl, ScalarKind, VectorMemberDecl,
};
use serde::{Deserialize, Serialize};

/// Payload of a calorimeter hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitData {
    /// Detector cell.
    pub cell_id: u64,
    /// Deposited energy in GeV.
    pub energy: f64,
    /// Time of the deposit in ns.
    pub time: f32,
}

/// A calorimeter hit, pointing back to the cluster it belongs to.
pub struct Hit;

impl Hit {
    /// One-to-one relation to the owning [`Cluster`].
    pub const CLUSTER: usize = 0;
}

impl Record for Hit {
    type Data = HitData;
    const TYPE_NAME: &'static str = "Hit";
    const RELATIONS: &'static [RelationDecl] = &[RelationDecl::one_to_one("cluster", "Cluster")];
}

/// Payload of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterData {
    /// Summed energy in GeV.
    pub energy: f64,
    /// Energy weighted position.
    pub position: [f32; 3],
}

/// A cluster of hits, possibly merged from other clusters.
pub struct Cluster;

impl Cluster {
    /// One-to-many relation to the member [`Hit`]s.
    pub const HITS: usize = 0;
    /// One-to-many relation to merged clusters.
    pub const CLUSTERS: usize = 1;
    /// Float32 vector member with shape parameters.
    pub const SHAPE: usize = 0;
}

impl Record for Cluster {
    type Data = ClusterData;
    const TYPE_NAME: &'static str = "Cluster";
    const RELATIONS: &'static [RelationDecl] = &[
        RelationDecl::one_to_many("hits", "Hit"),
        RelationDecl::one_to_many("clusters", "Cluster"),
    ];
    const VECTOR_MEMBERS: &'static [VectorMemberDecl] =
        &[VectorMemberDecl::new("shape", ScalarKind::Float32)];
}

/// Payload of a generator-level particle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McParticleData {
    /// PDG particle code.
    pub pdg: i32,
    /// Energy in GeV.
    pub energy: f64,
    /// Charge in units of e.
    pub charge: f32,
}

/// A generator-level particle with its decay tree.
pub struct McParticle;

impl McParticle {
    /// One-to-many relation to the mothers.
    pub const PARENTS: usize = 0;
    /// One-to-many relation to the decay products.
    pub const DAUGHTERS: usize = 1;
}

impl Record for McParticle {
    type Data = McParticleData;
    const TYPE_NAME: &'static str = "McParticle";
    const SCHEMA_VERSION: u32 = 2;
    const RELATIONS: &'static [RelationDecl] = &[
        RelationDecl::one_to_many("parents", "McParticle"),
        RelationDecl::one_to_many("daughters", "McParticle"),
    ];
}

/// Payload of a reconstructed track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    /// Fit quality.
    pub chi2: f32,
    /// Degrees of freedom of the fit.
    pub ndf: i32,
}

/// A reconstructed track.
pub struct Track;

impl Track {
    /// One-to-many relation to the [`Hit`]s used in the fit.
    pub const HITS: usize = 0;
    /// One-to-one relation to the matched [`McParticle`].
    pub const PARTICLE: usize = 1;
    /// Int32 vector member with hit counts per sub-detector.
    pub const SUBDETECTOR_HITS: usize = 0;
}

impl Record for Track {
    type Data = TrackData;
    const TYPE_NAME: &'static str = "Track";
    const RELATIONS: &'static [RelationDecl] = &[
        RelationDecl::one_to_many("hits", "Hit"),
        RelationDecl::one_to_one("particle", "McParticle"),
    ];
    const VECTOR_MEMBERS: &'static [VectorMemberDecl] =
        &[VectorMemberDecl::new("subdetector_hits", ScalarKind::Int32)];
}

record_handle! {
    /// Any object a reconstructed particle can be built from.
    pub enum Constituent {
        Cluster(Cluster),
        Track(Track),
    }
}

/// Returns a registry with every type of this datamodel.
pub fn registry() -> DatamodelRegistry {
    let mut registry = DatamodelRegistry::new();
    registry
        .register::<Hit>()
        .and_then(|r| r.register::<Cluster>())
        .and_then(|r| r.register::<McParticle>())
        .and_then(|r| r.register::<Track>())
        .expect("datamodel types register");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdm_core::{MutableObject, RecordCollection};

    #[test]
    fn registry_knows_all_versions() {
        let registry = registry();
        assert_eq!(registry.latest_version("McParticleCollection"), Some(2));
        assert!(registry.create_collection("McParticleCollection", 1, false).is_ok());
        assert_eq!(registry.latest_version("TrackCollection"), Some(1));
        let names = registry.relation_names("Cluster").unwrap();
        assert_eq!(names.relations, vec!["hits", "clusters"]);
        assert_eq!(names.vector_members, vec!["shape"]);
    }

    #[test]
    fn constituents_hand_back_typed_handles() {
        let mut tracks = RecordCollection::<Track>::new();
        let track = tracks.create_with(TrackData { chi2: 1.5, ndf: 4 }).unwrap();

        let constituent = Constituent::from(track.as_object());
        assert!(constituent.is_current_type::<Track>());
        assert_eq!(constituent.type_name(), "Track");
        assert_eq!(constituent.object_id(), track.object_id());
        assert!(constituent.get_value::<Cluster>().is_err());
        assert!(constituent.get_value::<Track>().unwrap().ptr_eq(&track.as_object()));

        let cluster = Constituent::from(MutableObject::<Cluster>::new());
        assert!(!cluster.object_id().is_persistable());
    }
}
