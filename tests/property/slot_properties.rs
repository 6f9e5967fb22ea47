// tests/property/slot_properties.rs

//! Property-based tests for hash-slot derivation (§4.F / §8 scenario 5).

use cluster_topology::{calc_slot, NUM_SLOTS};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn slot_is_always_in_range(key in prop::collection::vec(any::<u8>(), 0..256)) {
        let slot = calc_slot(&key);
        prop_assert!((slot as usize) < NUM_SLOTS);
    }

    #[test]
    fn same_hash_tag_routes_to_same_slot(
        tag in "[a-zA-Z0-9_]{1,32}",
        prefix in ".{0,16}",
        suffix_a in ".{0,16}",
        suffix_b in ".{0,16}",
    ) {
        let key_a = format!("{prefix}{{{tag}}}{suffix_a}");
        let key_b = format!("{prefix}{{{tag}}}{suffix_b}");
        prop_assert_eq!(calc_slot(key_a.as_bytes()), calc_slot(key_b.as_bytes()));
    }

    #[test]
    fn hash_tag_ignores_bytes_outside_the_braces(
        tag in "[a-zA-Z0-9_]{1,32}",
        prefix_a in ".{0,16}",
        prefix_b in ".{0,16}",
    ) {
        let key_a = format!("{prefix_a}{{{tag}}}rest");
        let key_b = format!("{prefix_b}{{{tag}}}rest");
        prop_assert_eq!(calc_slot(key_a.as_bytes()), calc_slot(key_b.as_bytes()));
    }

    #[test]
    fn empty_hash_tag_falls_back_to_whole_key(key in "[a-zA-Z0-9_]{1,32}") {
        let braced = format!("{{}}{key}");
        // `{}` carries no tag contents, so it hashes as part of the whole
        // key rather than being stripped out.
        prop_assert_ne!(calc_slot(braced.as_bytes()), calc_slot(key.as_bytes()));
    }

    #[test]
    fn slot_is_deterministic(key in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(calc_slot(&key), calc_slot(&key));
    }
}
