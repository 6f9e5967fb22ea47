// tests/property/parser_properties.rs

//! Property-based tests for the Partition Parser (§4.B): round-trip parsing
//! of randomly generated `CLUSTER NODES` snapshots into canonical partitions.

use crate::test_helpers::StaticResolver;
use cluster_topology::parser::{parse, parse_cluster_nodes_text};
use cluster_topology::{NodeAddress, PartitionType, NUM_SLOTS};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Turns a set of split points into `n` contiguous, disjoint slot ranges
/// covering `0..NUM_SLOTS`.
fn build_master_ranges(splits: BTreeSet<u16>) -> (usize, Vec<(u16, u16)>) {
    let mut bounds: Vec<u16> = splits.into_iter().collect();
    bounds.sort_unstable();

    let mut ranges = Vec::new();
    let mut start = 0u16;
    for &b in &bounds {
        ranges.push((start, b - 1));
        start = b;
    }
    ranges.push((start, (NUM_SLOTS - 1) as u16));
    (ranges.len(), ranges)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Every emitted partition is a fully-formed master (has a resolved
    /// address), no two masters' ranges overlap in the source text, and the
    /// parser preserves that: the emitted slot sets are pairwise disjoint
    /// and their union matches what the snapshot handed in.
    #[test]
    fn masters_round_trip_disjoint_slot_ownership(splits in prop::collection::btree_set(1u16..(NUM_SLOTS as u16 - 1), 0..6)) {
        let (n, ranges) = build_master_ranges(splits);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let resolver = StaticResolver::new();
            let mut text = String::new();
            for (i, (start, end)) in ranges.iter().enumerate() {
                let ip = format!("10.0.{}.{}", i / 250, (i % 250) + 1);
                text.push_str(&format!(
                    "node{i:04} {ip}:7000@17000 master - 0 0 {i} connected {start}-{end}\n"
                ));
            }

            let raw_nodes = parse_cluster_nodes_text(&text);
            prop_assert_eq!(raw_nodes.len(), n);

            let partitions = parse(raw_nodes, &resolver).await;
            prop_assert_eq!(partitions.len(), n);

            let mut seen_slots: BTreeSet<u16> = BTreeSet::new();
            let mut total_slots = 0usize;
            for partition in partitions.values() {
                prop_assert_eq!(partition.partition_type, PartitionType::Master);
                prop_assert!(partition.master_address.is_some());
                for slot in partition.slots() {
                    prop_assert!(seen_slots.insert(slot), "slot {slot} claimed by more than one partition");
                    total_slots += 1;
                }
            }
            prop_assert_eq!(total_slots, NUM_SLOTS);
            prop_assert_eq!(seen_slots.len(), NUM_SLOTS);
            Ok(())
        })?;
    }

    /// A slave's address always surfaces as one of its master partition's
    /// `slave_addresses`, never as a partition of its own.
    #[test]
    fn slave_addresses_attach_to_their_master_only(slave_count in 0usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let resolver = StaticResolver::new();
            let mut text = format!("m0000 10.0.9.1:7000@17000 master - 0 0 0 connected 0-{}\n", NUM_SLOTS - 1);
            let mut expected_slaves = Vec::new();
            for i in 0..slave_count {
                let ip = format!("10.0.10.{}", i + 1);
                text.push_str(&format!(
                    "s{i:04} {ip}:7000@17000 slave m0000 0 0 0 connected\n"
                ));
                expected_slaves.push(NodeAddress::new(ip, 7000, false));
            }

            let raw_nodes = parse_cluster_nodes_text(&text);
            let partitions = parse(raw_nodes, &resolver).await;
            prop_assert_eq!(partitions.len(), 1);
            let master = &partitions["m0000"];
            prop_assert_eq!(master.slave_addresses.len(), slave_count);
            for addr in &expected_slaves {
                prop_assert!(master.slave_addresses.contains(addr));
            }
            Ok(())
        })?;
    }
}
