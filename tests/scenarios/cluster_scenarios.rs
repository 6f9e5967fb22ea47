// tests/scenarios/cluster_scenarios.rs

//! The six concrete scenarios from spec §8, exercised end-to-end against the
//! mock `ConnectionPool` and `AddressResolver` in `test_helpers`.

use super::test_helpers::{MockPoolFactory, StaticResolver};
use cluster_topology::bootstrap::{bootstrap, BootstrapOutcome};
use cluster_topology::model::{ClusterPartition, NodeAddress, NodeFlags, RawNodeInfo, SlotRange};
use cluster_topology::monitor::TopologyMonitor;
use cluster_topology::nat::IdentityNatMapper;
use cluster_topology::parser::parse;
use cluster_topology::registry::Registry;
use cluster_topology::router::Router;
use cluster_topology::shutdown::ShutdownLatch;
use cluster_topology::subscribe::NoopSubscribeService;
use cluster_topology::{calc_slot, ClusterError, ClusterTopologyConfig};
use std::collections::HashMap;
use std::sync::Arc;

fn test_registry() -> Registry {
    Registry::new(
        MockPoolFactory::new(),
        Arc::new(IdentityNatMapper),
        Arc::new(NoopSubscribeService),
        Arc::new(ClusterTopologyConfig::default()),
    )
}

fn master_node(node_id: &str, host: &str, port: u16, flags: NodeFlags, ranges: Vec<(u16, u16)>) -> RawNodeInfo {
    RawNodeInfo {
        node_id: node_id.to_string(),
        address: Some(NodeAddress::new(host, port, false)),
        flags: flags | NodeFlags::MASTER,
        slave_of: None,
        slot_ranges: ranges.into_iter().map(|(a, b)| SlotRange::new(a, b)).collect(),
    }
}

fn slave_node(node_id: &str, host: &str, port: u16, master_id: &str, flags: NodeFlags) -> RawNodeInfo {
    RawNodeInfo {
        node_id: node_id.to_string(),
        address: Some(NodeAddress::new(host, port, false)),
        flags: flags | NodeFlags::SLAVE,
        slave_of: Some(master_id.to_string()),
        slot_ranges: Vec::new(),
    }
}

fn monitor_from(
    partitions: HashMap<String, ClusterPartition>,
    router: Arc<Router>,
    registry: Arc<Registry>,
    config: Arc<ClusterTopologyConfig>,
    last_cluster_node: NodeAddress,
) -> TopologyMonitor {
    let outcome = BootstrapOutcome {
        config_endpoint: None,
        last_cluster_node,
        partitions,
    };
    TopologyMonitor::new(
        outcome,
        router,
        registry,
        Arc::new(StaticResolver::new()),
        Arc::new(NoopSubscribeService),
        config,
        Arc::new(ShutdownLatch::new()),
    )
}

/// Scenario 1: cold start, three-master cluster covering all 16384 slots.
/// Bootstrap's own wire fetch is a real TCP round trip and out of scope for
/// a unit-level test, so this drives the same populate-router-from-partitions
/// path bootstrap itself runs: parse the snapshot, then add an entry and
/// install it for every slot of every master.
#[tokio::test]
async fn cold_start_three_master_cluster_covers_all_slots() {
    let resolver = StaticResolver::new();
    let raw_nodes = vec![
        master_node("a", "10.0.0.1", 7000, NodeFlags::empty(), vec![(0, 5460)]),
        master_node("b", "10.0.0.2", 7000, NodeFlags::empty(), vec![(5461, 10922)]),
        master_node("c", "10.0.0.3", 7000, NodeFlags::empty(), vec![(10923, 16383)]),
    ];

    let partitions = parse(raw_nodes, &resolver).await;
    assert_eq!(partitions.len(), 3);

    let registry = test_registry();
    let router = Router::new();
    for partition in partitions.values() {
        let entry = registry.add_master_entry(partition, None).await.unwrap();
        for slot in partition.slots() {
            router.install(slot, entry.clone(), &registry).await;
        }
    }

    assert!(router.is_fully_covered());
    assert_eq!(router.uncovered_count(), 0);
    assert_eq!(registry.len(), 3);

    let srv1 = NodeAddress::new("10.0.0.1", 7000, false);
    let monitor = monitor_from(partitions, Arc::new(router), Arc::new(registry), Arc::new(ClusterTopologyConfig::default()), srv1.clone());
    assert_eq!(monitor.last_cluster_node(), srv1);
}

/// Scenario 2: failover. The old master is FAIL-flagged and its slots are
/// reclaimed by a freshly elected master at a new address; the existing
/// entry is repointed in place rather than torn down and rebuilt.
#[tokio::test]
async fn failover_repoints_entry_and_updates_router() {
    let resolver = StaticResolver::new();
    let registry = Arc::new(test_registry());
    let router = Arc::new(Router::new());

    let initial = parse(
        vec![master_node("a", "srv1", 7000, NodeFlags::empty(), vec![(0, 5460)])],
        &resolver,
    )
    .await;
    let entry_a = registry.add_master_entry(&initial["a"], None).await.unwrap();
    for slot in initial["a"].slots() {
        router.install(slot, entry_a.clone(), &registry).await;
    }

    let config = Arc::new(ClusterTopologyConfig::default());
    let monitor = monitor_from(initial, router.clone(), registry.clone(), config, NodeAddress::new("srv1", 7000, false));

    let new_snapshot = vec![
        master_node("a", "srv1", 7000, NodeFlags::FAIL, vec![(0, 5460)]),
        master_node("a-new", "srv4", 7000, NodeFlags::empty(), vec![(0, 5460)]),
    ];
    let new_partitions = parse(new_snapshot, &resolver).await;
    monitor.reconcile(new_partitions).await;

    let routed = router.entry_for_slot(0).unwrap();
    assert!(Arc::ptr_eq(&routed, &entry_a), "failover must repoint the existing entry, not replace it");
    assert_eq!(entry_a.master_address(), NodeAddress::new("srv4", 7000, false));
    assert_eq!(entry_a.refcount(), 5461);
}

/// Scenario 3: slave churn. A slave is added, observed in the router's next
/// tick, then marked FAIL and disconnected.
#[tokio::test]
async fn slave_churn_add_then_fail() {
    let resolver = StaticResolver::new();
    let registry = Arc::new(test_registry());
    let router = Arc::new(Router::new());

    let initial = parse(
        vec![master_node("b", "10.0.0.2", 7000, NodeFlags::empty(), vec![(0, 100)])],
        &resolver,
    )
    .await;
    let entry_b = registry.add_master_entry(&initial["b"], None).await.unwrap();
    for slot in initial["b"].slots() {
        router.install(slot, entry_b.clone(), &registry).await;
    }

    let config = Arc::new(ClusterTopologyConfig::default());
    let monitor = monitor_from(initial, router.clone(), registry.clone(), config, NodeAddress::new("10.0.0.2", 7000, false));

    let with_slave = vec![
        master_node("b", "10.0.0.2", 7000, NodeFlags::empty(), vec![(0, 100)]),
        slave_node("b-slave2", "10.0.0.20", 7000, "b", NodeFlags::empty()),
    ];
    monitor.reconcile(parse(with_slave, &resolver).await).await;
    assert!(entry_b.pool.has_slave(&NodeAddress::new("10.0.0.20", 7000, false)));

    let with_failed_slave = vec![
        master_node("b", "10.0.0.2", 7000, NodeFlags::empty(), vec![(0, 100)]),
        slave_node("b-slave2", "10.0.0.20", 7000, "b", NodeFlags::FAIL),
    ];
    monitor.reconcile(parse(with_failed_slave, &resolver).await).await;
}

/// Scenario 4: slot migration without failover. Node `a` keeps its identity
/// but sheds slots to `c`; the migration pass (not a global coverage sweep)
/// must move ownership and collapse `a`'s ranges.
#[tokio::test]
async fn slot_migration_moves_ownership_between_existing_masters() {
    let resolver = StaticResolver::new();
    let registry = Arc::new(test_registry());
    let router = Arc::new(Router::new());

    let initial = parse(
        vec![
            master_node("a", "10.0.0.1", 7000, NodeFlags::empty(), vec![(0, 5460)]),
            master_node("c", "10.0.0.3", 7000, NodeFlags::empty(), vec![(10923, 16383)]),
        ],
        &resolver,
    )
    .await;
    let entry_a = registry.add_master_entry(&initial["a"], None).await.unwrap();
    let entry_c = registry.add_master_entry(&initial["c"], None).await.unwrap();
    for slot in initial["a"].slots() {
        router.install(slot, entry_a.clone(), &registry).await;
    }
    for slot in initial["c"].slots() {
        router.install(slot, entry_c.clone(), &registry).await;
    }

    let config = Arc::new(ClusterTopologyConfig::default());
    let monitor = monitor_from(initial, router.clone(), registry.clone(), config, NodeAddress::new("10.0.0.1", 7000, false));

    let migrated = vec![
        master_node("a", "10.0.0.1", 7000, NodeFlags::empty(), vec![(0, 5000)]),
        master_node(
            "c",
            "10.0.0.3",
            7000,
            NodeFlags::empty(),
            vec![(5001, 5460), (10923, 16383)],
        ),
    ];
    monitor.reconcile(parse(migrated, &resolver).await).await;

    for slot in 5001..=5460u16 {
        let owner = router.entry_for_slot(slot).unwrap();
        assert!(Arc::ptr_eq(&owner, &entry_c), "slot {slot} should have migrated to c");
    }
    let stayed = router.entry_for_slot(100).unwrap();
    assert!(Arc::ptr_eq(&stayed, &entry_a));
}

/// Scenario 5: hash-tag routing. Two keys sharing a `{tag}` route to the
/// same slot.
#[test]
fn hash_tag_routing_groups_keys_into_one_slot() {
    assert_eq!(
        calc_slot(b"{user1000}.following"),
        calc_slot(b"{user1000}.followers")
    );
}

/// Scenario 6: all seeds unreachable. `bootstrap` must raise `Fatal`,
/// naming every failed seed, with no entries created.
#[tokio::test]
async fn all_seeds_unreachable_fails_startup_naming_both_seeds() {
    let mut config = ClusterTopologyConfig::default();
    config.node_addresses = vec!["dead1:7000".to_string(), "dead2:7000".to_string()];
    let config = Arc::new(config);

    let resolver = StaticResolver::new().failing("dead1").failing("dead2");
    let router = Router::new();
    let registry = test_registry();

    let err = bootstrap(&config, &resolver, &router, &registry).await.unwrap_err();
    match err {
        ClusterError::Fatal(msg) => {
            assert!(msg.contains("dead1"), "message should name dead1: {msg}");
            assert!(msg.contains("dead2"), "message should name dead2: {msg}");
        }
        other => panic!("expected Fatal, got {other:?}"),
    }
    assert_eq!(registry.len(), 0);
}
