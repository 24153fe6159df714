//! Property-based test generators using proptest.

use crate::datamodel::{HitData, McParticleData};
use evdm_core::GenericParameters;
use proptest::prelude::*;

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating sets of distinct collection names.
pub fn collection_names_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(collection_name_strategy(), 1..=max)
        .prop_map(|names| names.into_iter().collect())
}

/// Strategy for generating hit payloads with finite values.
pub fn hit_data_strategy() -> impl Strategy<Value = HitData> {
    (any::<u64>(), 0.0..1000.0_f64, -50.0..50.0_f32).prop_map(|(cell_id, energy, time)| {
        HitData {
            cell_id,
            energy,
            time,
        }
    })
}

/// Strategy for generating particle payloads.
pub fn particle_data_strategy() -> impl Strategy<Value = McParticleData> {
    (
        prop_oneof![Just(11), Just(-11), Just(13), Just(22), Just(211)],
        0.0..500.0_f64,
        prop_oneof![Just(-1.0_f32), Just(0.0), Just(1.0)],
    )
        .prop_map(|(pdg, energy, charge)| McParticleData {
            pdg,
            energy,
            charge,
        })
}

/// Strategy for generating per-record element counts of a flattened
/// column.
pub fn counts_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0_u32..8, 0..32)
}

/// Strategy for generating parameter stores with all four value types.
pub fn parameters_strategy() -> impl Strategy<Value = GenericParameters> {
    let key = || prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex");
    (
        prop::collection::btree_map(key(), prop::collection::vec(any::<i32>(), 0..4), 0..4),
        prop::collection::btree_map(key(), prop::collection::vec(-1e6..1e6_f32, 0..4), 0..4),
        prop::collection::btree_map(key(), prop::collection::vec(-1e9..1e9_f64, 0..4), 0..4),
        prop::collection::btree_map(key(), prop::collection::vec("[ -~]{0,12}", 0..4), 0..4),
    )
        .prop_map(|(ints, floats, doubles, strings)| {
            let mut parameters = GenericParameters::new();
            for (key, values) in ints {
                parameters.set_values(key, values);
            }
            for (key, values) in floats {
                parameters.set_values(key, values);
            }
            for (key, values) in doubles {
                parameters.set_values(key, values);
            }
            for (key, values) in strings {
                parameters.set_values(key, values);
            }
            parameters
        })
}
