//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] writes frames through the whole stack (core,
//! codec, storage) and remembers what it wrote, so that read-back frames
//! can be checked against it.

use crate::datamodel::{Cluster, Hit, McParticle};
use crate::fixtures::{memory_reader, memory_writer};
use evdm_core::{Frame, FrameReader, FrameWriter, GenericParameters};
use evdm_storage::InMemoryBackend;
use std::collections::BTreeMap;

/// Writes frames to memory and tracks their parameters for verification.
pub struct IntegrationHarness {
    backend: InMemoryBackend,
    writer: Option<FrameWriter>,
    written: BTreeMap<String, Vec<GenericParameters>>,
}

impl IntegrationHarness {
    /// Creates a harness over an empty in-memory backend.
    pub fn new() -> Self {
        let backend = InMemoryBackend::new();
        Self {
            writer: Some(memory_writer(&backend)),
            backend,
            written: BTreeMap::new(),
        }
    }

    /// Writes `frame` to `category` and tracks its parameters.
    pub fn write(&mut self, frame: &mut Frame, category: &str) {
        self.writer
            .as_mut()
            .expect("Harness is already finished")
            .write_frame(frame, category)
            .expect("Failed to write frame");
        self.written
            .entry(category.to_string())
            .or_default()
            .push(frame.parameters().clone());
    }

    /// Finishes the file and opens a reader on it.
    pub fn finish(&mut self) -> FrameReader {
        if let Some(mut writer) = self.writer.take() {
            writer.finish().expect("Failed to finish writer");
        }
        memory_reader(&self.backend)
    }

    /// Returns the number of frames written to `category`.
    pub fn tracked_count(&self, category: &str) -> usize {
        self.written.get(category).map_or(0, Vec::len)
    }

    /// Reads every entry back and checks entry counts and parameters.
    pub fn verify_all(&mut self) {
        let mut reader = self.finish();
        let categories: Vec<String> = reader
            .available_categories()
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(
            categories,
            self.written.keys().cloned().collect::<Vec<_>>(),
            "Category mismatch"
        );

        for (category, expected) in &self.written {
            assert_eq!(reader.entries(category), expected.len());
            for (entry, parameters) in expected.iter().enumerate() {
                let data = reader
                    .read_entry(category, entry)
                    .expect("Failed to read entry")
                    .expect("Entry is missing");
                assert_eq!(
                    data.parameters(),
                    parameters,
                    "Parameter mismatch in {category}/{entry}"
                );
            }
        }
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural checks over the example scenarios.
pub mod checks {
    use super::*;

    /// Checks that every hit points to the cluster that contains it.
    pub fn check_calorimeter_links(frame: &mut Frame) {
        let clusters: Vec<_> = frame
            .get_as::<Cluster>("clusters")
            .expect("Failed to get clusters")
            .iter()
            .collect();
        // reading clusters may have left the hit -> cluster leg deferred
        frame.get_by_name("hits").expect("Failed to get hits");
        for cluster in &clusters {
            let hits = cluster
                .related::<Hit>(Cluster::HITS)
                .expect("Failed to follow hits");
            let mut energy = 0.0;
            for hit in hits {
                energy += hit.data().energy;
                let owner = hit
                    .related_one::<Cluster>(Hit::CLUSTER)
                    .expect("Failed to follow cluster")
                    .expect("Hit has no cluster");
                assert!(owner.ptr_eq(cluster), "Hit points to the wrong cluster");
            }
            assert!((energy - cluster.data().energy).abs() < 1e-9);
        }
    }

    /// Checks a decay chain of `depth` particles registered as
    /// `mc_particles`.
    pub fn check_decay_chain(frame: &mut Frame, depth: usize) {
        let particles = frame
            .get_as::<McParticle>("mc_particles")
            .expect("Failed to get particles");
        assert_eq!(particles.len(), depth);
        for (i, particle) in particles.iter().enumerate() {
            let parents = particle
                .related::<McParticle>(McParticle::PARENTS)
                .expect("Failed to follow parents");
            let daughters = particle
                .related::<McParticle>(McParticle::DAUGHTERS)
                .expect("Failed to follow daughters");
            assert_eq!(parents.len(), usize::from(i > 0));
            assert_eq!(daughters.len(), usize::from(i + 1 < depth));
            if let Some(daughter) = daughters.first() {
                assert_eq!(daughter.object_id().index, i as i32 + 1);
                let back = daughter
                    .related::<McParticle>(McParticle::PARENTS)
                    .expect("Failed to follow parents");
                assert!(back[0].ptr_eq(&particle));
            }
        }
    }
}
