//! Frame fixtures and round-trip helpers.
//!
//! Provides ready-made frames over the example datamodel and helpers that
//! push frames through a [`FrameWriter`]/[`FrameReader`] pair, either in
//! memory or through a temporary file.

use crate::datamodel::{
    registry, Cluster, ClusterData, Hit, HitData, McParticle, McParticleData, Track, TrackData,
};
use evdm_core::{Config, Frame, FrameReader, FrameWriter, MutableObject, RecordCollection};
use evdm_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A frame file in a temporary directory that is removed on drop.
pub struct TestFile {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestFile {
    /// Reserves a file called `name` in a fresh temporary directory.
    pub fn new(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join(name),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a writer for the file, replacing earlier contents.
    pub fn writer(&self) -> FrameWriter {
        FrameWriter::create(&self.path).expect("Failed to create frame file")
    }

    /// Opens the file for reading with the example datamodel.
    pub fn reader(&self) -> FrameReader {
        FrameReader::open(&self.path, Arc::new(registry())).expect("Failed to open frame file")
    }
}

/// Returns a writer appending to `backend`.
pub fn memory_writer(backend: &InMemoryBackend) -> FrameWriter {
    FrameWriter::new(Box::new(backend.clone()), Config::default())
        .expect("Failed to create writer")
}

/// Returns a reader over the contents of `backend`.
pub fn memory_reader(backend: &InMemoryBackend) -> FrameReader {
    FrameReader::new(
        Box::new(backend.read_only()),
        Arc::new(registry()),
        Config::default(),
    )
    .expect("Failed to open reader")
}

/// Writes `frame` to memory and returns it read back, with every
/// collection still unread.
pub fn roundtrip(frame: &mut Frame) -> Frame {
    let backend = InMemoryBackend::new();
    let mut writer = memory_writer(&backend);
    writer
        .write_frame(frame, "events")
        .expect("Failed to write frame");
    writer.finish().expect("Failed to finish writer");

    memory_reader(&backend)
        .read_entry("events", 0)
        .expect("Failed to read frame")
        .expect("Frame is missing")
        .into_frame()
}

/// Frames of typical shapes.
pub mod scenarios {
    use super::*;

    /// Clusters of hits, with every hit pointing back to its cluster.
    ///
    /// Registers `hits` and `clusters`; cluster `c` holds hits
    /// `c * hits_per_cluster..(c + 1) * hits_per_cluster` and has energy
    /// equal to the sum of its hits.
    pub fn calorimeter_frame(clusters: usize, hits_per_cluster: usize) -> Frame {
        let mut hit_collection = RecordCollection::<Hit>::new();
        let mut cluster_collection = RecordCollection::<Cluster>::new();

        for c in 0..clusters {
            let cluster = cluster_collection
                .create()
                .expect("Failed to create cluster");
            let mut energy = 0.0;
            for h in 0..hits_per_cluster {
                let index = c * hits_per_cluster + h;
                let hit = hit_collection
                    .create_with(HitData {
                        cell_id: index as u64,
                        energy: 0.5 + index as f64,
                        time: 1.0,
                    })
                    .expect("Failed to create hit");
                energy += hit.data().energy;
                hit.set_related(Hit::CLUSTER, &cluster)
                    .expect("Failed to link cluster");
                cluster
                    .add_related(Cluster::HITS, &hit)
                    .expect("Failed to link hit");
            }
            cluster.set_data(ClusterData {
                energy,
                position: [c as f32, 0.0, 0.0],
            });
            cluster
                .push_vector_member(Cluster::SHAPE, energy as f32)
                .expect("Failed to add shape");
        }

        let mut frame = Frame::new();
        frame.put("hits", hit_collection).expect("Failed to put hits");
        frame
            .put("clusters", cluster_collection)
            .expect("Failed to put clusters");
        frame
    }

    /// A linear decay chain of `depth` particles registered as
    /// `mc_particles`; particle `i` is the parent of particle `i + 1`.
    pub fn decay_chain_frame(depth: usize) -> Frame {
        let mut particles = RecordCollection::<McParticle>::new();
        let mut previous: Option<MutableObject<McParticle>> = None;
        for i in 0..depth {
            let particle = particles
                .create_with(McParticleData {
                    pdg: 100 + i as i32,
                    energy: 10.0 / (i as f64 + 1.0),
                    charge: 0.0,
                })
                .expect("Failed to create particle");
            if let Some(parent) = &previous {
                particle
                    .add_related(McParticle::PARENTS, parent)
                    .expect("Failed to link parent");
                parent
                    .add_related(McParticle::DAUGHTERS, &particle)
                    .expect("Failed to link daughter");
            }
            previous = Some(particle);
        }

        let mut frame = Frame::new();
        frame
            .put("mc_particles", particles)
            .expect("Failed to put particles");
        frame
    }

    /// A full event: the calorimeter frame plus particles, tracks using
    /// the hits, a subset of high-energy clusters and event parameters.
    pub fn full_event(event: i32) -> Frame {
        let mut frame = calorimeter_frame(3, 2);

        let mut particles = RecordCollection::<McParticle>::new();
        let muon = particles
            .create_with(McParticleData {
                pdg: 13,
                energy: 25.0,
                charge: -1.0,
            })
            .expect("Failed to create particle");

        let mut tracks = RecordCollection::<Track>::new();
        let track = tracks
            .create_with(TrackData { chi2: 3.5, ndf: 5 })
            .expect("Failed to create track");
        track
            .set_related(Track::PARTICLE, &muon)
            .expect("Failed to link particle");
        for hit in frame.get_as::<Hit>("hits").expect("hits").iter().take(2) {
            track
                .add_related(Track::HITS, &hit)
                .expect("Failed to link hit");
        }
        for count in [3, 0, 7] {
            track
                .push_vector_member(Track::SUBDETECTOR_HITS, count)
                .expect("Failed to add hit count");
        }

        let mut selected = RecordCollection::<Cluster>::new_subset();
        for cluster in frame.get_as::<Cluster>("clusters").expect("clusters").iter() {
            if cluster.data().energy > 5.0 {
                selected.push(&cluster).expect("Failed to select cluster");
            }
        }

        frame
            .put("mc_particles", particles)
            .expect("Failed to put particles");
        frame.put("tracks", tracks).expect("Failed to put tracks");
        frame
            .put("selected_clusters", selected)
            .expect("Failed to put subset");

        let parameters = frame.parameters_mut();
        parameters.set_value("event_number", event);
        parameters.set_value("generator", "pythia".to_string());
        parameters.set_values("beam_energies", vec![45.6_f64, 45.6]);
        parameters.set_values("trigger_weights", vec![1.0_f32, 0.5]);
        frame
    }
}
