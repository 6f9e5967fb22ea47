// src/monitor.rs

//! The Topology Monitor (§4.E): a self-rescheduling reconciliation loop that
//! fetches a fresh `CLUSTER NODES` snapshot each tick and diffs it against
//! the live state in four fixed passes — master change, slave change, slot
//! migration, then global slot coverage — committing Router/Registry
//! mutations as it goes.

use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, info_span, warn};

use crate::bootstrap::BootstrapOutcome;
use crate::config::{ClusterTopologyConfig, ReadMode};
use crate::control::fetch_cluster_nodes;
use crate::error::Result;
use crate::model::{ClusterPartition, NodeAddress, NodeId};
use crate::parser::parse;
use crate::pool::FreezeReason;
use crate::registry::Registry;
use crate::resolver::AddressResolver;
use crate::router::Router;
use crate::shutdown::ShutdownLatch;
use crate::slot::NUM_SLOTS;
use crate::subscribe::SubscribeService;

struct MonitorState {
    partitions: HashMap<NodeId, ClusterPartition>,
    slot_owner: Box<[Option<NodeId>]>,
}

/// Slot -> claiming node_id, computed once per tick and reused by the
/// master-change and coverage passes. A stale FAIL record's own slot
/// claims are excluded so they never shadow whichever live master has
/// actually taken the slot over.
fn build_owner_index(partitions: &HashMap<NodeId, ClusterPartition>) -> Vec<Option<NodeId>> {
    let mut owner = vec![None; NUM_SLOTS];
    for p in partitions.values().filter(|p| !p.master_fail) {
        for slot in p.slots() {
            owner[slot as usize] = Some(p.node_id.clone());
        }
    }
    owner
}

pub struct TopologyMonitor {
    router: Arc<Router>,
    registry: Arc<Registry>,
    resolver: Arc<dyn AddressResolver>,
    subscribe: Arc<dyn SubscribeService>,
    config: Arc<ClusterTopologyConfig>,
    shutdown: Arc<ShutdownLatch>,
    config_endpoint: Option<(String, u16)>,
    state: tokio::sync::Mutex<MonitorState>,
    last_cluster_node: parking_lot::RwLock<NodeAddress>,
    tick_seq: AtomicU64,
}

impl TopologyMonitor {
    pub fn new(
        outcome: BootstrapOutcome,
        router: Arc<Router>,
        registry: Arc<Registry>,
        resolver: Arc<dyn AddressResolver>,
        subscribe: Arc<dyn SubscribeService>,
        config: Arc<ClusterTopologyConfig>,
        shutdown: Arc<ShutdownLatch>,
    ) -> Self {
        let mut slot_owner = vec![None; NUM_SLOTS];
        for p in outcome.partitions.values() {
            for slot in p.slots() {
                slot_owner[slot as usize] = Some(p.node_id.clone());
            }
        }
        Self {
            router,
            registry,
            resolver,
            subscribe,
            config,
            shutdown,
            config_endpoint: outcome.config_endpoint,
            state: tokio::sync::Mutex::new(MonitorState {
                partitions: outcome.partitions,
                slot_owner: slot_owner.into_boxed_slice(),
            }),
            last_cluster_node: parking_lot::RwLock::new(outcome.last_cluster_node),
            tick_seq: AtomicU64::new(0),
        }
    }

    pub fn last_cluster_node(&self) -> NodeAddress {
        self.last_cluster_node.read().clone()
    }

    /// Spawns the self-rescheduling tick loop. Ticks never overlap: the next
    /// sleep only starts once the previous tick has fully returned.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if self.shutdown.is_shutting_down() {
                    break;
                }
                self.run_tick().await;
                if self.shutdown.is_shutting_down() {
                    break;
                }
                tokio::time::sleep(self.config.scan_interval()).await;
            }
        })
    }

    async fn build_candidates(&self) -> Vec<NodeAddress> {
        if let Some((host, port)) = &self.config_endpoint {
            match self.resolver.resolve_all(host, *port).await {
                Ok(sockets) => sockets
                    .into_iter()
                    .map(|s| NodeAddress::new(s.ip().to_string(), *port, self.config.tls_enabled))
                    .collect(),
                Err(e) => {
                    warn!(host = %host, error = %e, "endpoint re-resolution failed");
                    Vec::new()
                }
            }
        } else {
            let state = self.state.lock().await;
            let mut masters: Vec<NodeAddress> = state
                .partitions
                .values()
                .filter(|p| !p.master_fail)
                .filter_map(|p| p.master_address.clone())
                .collect();
            let mut slaves: Vec<NodeAddress> = state
                .partitions
                .values()
                .flat_map(|p| {
                    p.slave_addresses
                        .difference(&p.failed_slave_addresses)
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect();
            drop(state);
            let mut rng = rand::thread_rng();
            masters.shuffle(&mut rng);
            slaves.shuffle(&mut rng);
            masters.into_iter().chain(slaves).collect()
        }
    }

    async fn fetch_snapshot(&self, addr: &NodeAddress) -> Result<Vec<crate::model::RawNodeInfo>> {
        let sni = self.config_endpoint.as_ref().map(|(h, _)| h.as_str());
        fetch_cluster_nodes(
            addr,
            self.config.tls_enabled,
            sni,
            self.config.connect_timeout(),
            self.config.response_timeout(),
        )
        .await
    }

    /// Runs exactly one reconciliation tick. Reschedules are the caller's
    /// (`spawn`'s) responsibility; this never panics and never leaves the
    /// latch held on return.
    pub async fn run_tick(&self) {
        let Some(_guard) = self.shutdown.acquire() else {
            return;
        };
        let seq = self.tick_seq.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("topology_tick", tick = seq);
        let _enter = span.enter();

        let candidates = self.build_candidates().await;
        let mut last_error = None;
        for candidate in candidates {
            match self.fetch_snapshot(&candidate).await {
                Ok(raw_nodes) => {
                    *self.last_cluster_node.write() = candidate.clone();
                    let new_partitions = parse(raw_nodes, self.resolver.as_ref()).await;
                    self.reconcile(new_partitions).await;
                    return;
                }
                Err(e) => {
                    warn!(candidate = %candidate, error = %e, "candidate failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => warn!(error = %e, "topology tick found no reachable candidate; will retry next tick"),
            None => warn!("topology tick had no candidates to try"),
        }
    }

    /// Runs the tick's four diff passes against an already-fetched snapshot.
    /// `run_tick` is the production entry point (it owns candidate selection
    /// and the network fetch); this is exposed directly so tests — in this
    /// crate and in `tests/` — can drive the diff logic against a
    /// synthesized snapshot without a real `CLUSTER NODES` round trip.
    pub async fn reconcile(&self, new_partitions: HashMap<NodeId, ClusterPartition>) {
        let sni = self.config_endpoint.as_ref().map(|(h, _)| h.as_str());
        let mut state = self.state.lock().await;
        let new_owner_by_slot = build_owner_index(&new_partitions);

        self.check_master_nodes_change(&mut state, &new_partitions, &new_owner_by_slot, sni)
            .await;
        self.check_slave_nodes_change(&mut state, &new_partitions, sni).await;
        self.check_slots_migration(&mut state, &new_partitions).await;
        self.check_slots_change(&mut state, &new_partitions).await;
    }

    async fn check_master_nodes_change(
        &self,
        state: &mut MonitorState,
        new_partitions: &HashMap<NodeId, ClusterPartition>,
        new_owner_by_slot: &[Option<NodeId>],
        sni: Option<&str>,
    ) {
        let last_by_addr: HashMap<NodeAddress, NodeId> = state
            .partitions
            .values()
            .filter_map(|p| p.master_address.clone().map(|a| (a, p.node_id.clone())))
            .collect();

        let mut masters_elected: std::collections::HashSet<NodeAddress> = std::collections::HashSet::new();
        let mut added: Vec<NodeId> = Vec::new();

        for new_part in new_partitions.values() {
            if new_part.slot_count() == 0 {
                continue;
            }
            let Some(old_addr) = new_part.master_address.clone() else {
                continue;
            };
            match last_by_addr.get(&old_addr) {
                Some(current_node_id) if new_part.master_fail => {
                    let current_node_id = current_node_id.clone();
                    let Some(current_part) = state.partitions.get(&current_node_id).cloned() else {
                        continue;
                    };
                    let mut new_master_addr = None;
                    for slot in current_part.slots() {
                        if let Some(owner_id) = &new_owner_by_slot[slot as usize] {
                            if let Some(owner_part) = new_partitions.get(owner_id) {
                                if let Some(addr) = &owner_part.master_address {
                                    if *addr != old_addr {
                                        new_master_addr = Some(addr.clone());
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    if let Some(new_addr) = new_master_addr {
                        self.execute_failover(state, &current_node_id, &old_addr, &new_addr, sni)
                            .await;
                        masters_elected.insert(new_addr);
                    }
                }
                Some(_) => {}
                None if !new_part.master_fail => added.push(new_part.node_id.clone()),
                None => {}
            }
        }

        let to_add: Vec<NodeId> = added
            .into_iter()
            .filter(|id| {
                new_partitions
                    .get(id)
                    .and_then(|p| p.master_address.clone())
                    .map(|a| !masters_elected.contains(&a))
                    .unwrap_or(false)
            })
            .collect();

        let results = futures::future::join_all(to_add.iter().map(|id| {
            let partition = new_partitions.get(id).expect("id drawn from new_partitions");
            async move { (id.clone(), self.registry.add_master_entry(partition, sni).await) }
        }))
        .await;

        for (node_id, result) in results {
            match result {
                Ok(entry) => {
                    let Some(partition) = new_partitions.get(&node_id) else { continue };
                    for slot in partition.slots() {
                        self.router.install(slot, entry.clone(), &self.registry).await;
                        state.slot_owner[slot as usize] = Some(node_id.clone());
                    }
                    state.partitions.insert(node_id.clone(), partition.clone());
                    info!(node_id = %node_id, "new master entry added");
                }
                Err(e) => warn!(node_id = %node_id, error = %e, "failed to add master entry"),
            }
        }
    }

    async fn execute_failover(
        &self,
        state: &mut MonitorState,
        node_id: &NodeId,
        old_addr: &NodeAddress,
        new_addr: &NodeAddress,
        sni: Option<&str>,
    ) {
        let Some(entry) = self.registry.get(node_id) else {
            return;
        };
        match self.registry.change_master(&entry, new_addr, sni).await {
            Ok(()) => {
                entry.pool.node_down(old_addr).await;
                if let Some(partition) = state.partitions.get_mut(node_id) {
                    partition.master_address = Some(new_addr.clone());
                    partition.master_fail = false;
                }
                info!(node_id = %node_id, old_addr = %old_addr, new_addr = %new_addr, "master failover completed");
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "failover change_master failed, keeping prior master address");
            }
        }
    }

    async fn check_slave_nodes_change(
        &self,
        state: &mut MonitorState,
        new_partitions: &HashMap<NodeId, ClusterPartition>,
        sni: Option<&str>,
    ) {
        let current_by_addr: HashMap<NodeAddress, NodeId> = state
            .partitions
            .values()
            .filter_map(|p| p.master_address.clone().map(|a| (a, p.node_id.clone())))
            .collect();

        for new_part in new_partitions.values() {
            let Some(addr) = &new_part.master_address else { continue };
            let Some(current_node_id) = current_by_addr.get(addr).cloned() else {
                continue;
            };
            let Some(entry) = self.registry.get(&current_node_id) else {
                continue;
            };

            let (current_slaves, current_failed) = {
                let Some(p) = state.partitions.get(&current_node_id) else { continue };
                (p.slave_addresses.clone(), p.failed_slave_addresses.clone())
            };

            for slave in current_slaves.difference(&new_part.slave_addresses) {
                entry.pool.slave_down(slave, FreezeReason::Manager).await;
            }

            let mut newly_added = std::collections::BTreeSet::new();
            for slave in new_part.slave_addresses.difference(&current_slaves) {
                if entry.pool.has_slave(slave) {
                    entry.pool.slave_up(slave, FreezeReason::Manager).await;
                    newly_added.insert(slave.clone());
                } else {
                    let readonly = !matches!(self.config.read_mode, ReadMode::Master);
                    match entry.pool.add_slave(slave, readonly, sni).await {
                        Ok(()) => {
                            newly_added.insert(slave.clone());
                            info!(node_id = %current_node_id, slave = %slave, "slave added");
                        }
                        Err(e) => {
                            warn!(node_id = %current_node_id, slave = %slave, error = %e, "add_slave failed")
                        }
                    }
                }
            }

            let mut up = Vec::new();
            let mut down = Vec::new();
            for addr in current_failed.iter() {
                let still_failed = new_part.failed_slave_addresses.contains(addr);
                let still_present = new_part.slave_addresses.contains(addr);
                if !newly_added.contains(addr) && !still_failed && still_present {
                    up.push(addr.clone());
                }
            }
            for addr in new_part.failed_slave_addresses.iter() {
                if !current_failed.contains(addr) {
                    down.push(addr.clone());
                }
            }
            for addr in &up {
                entry.pool.slave_up(addr, FreezeReason::Manager).await;
            }
            for addr in &down {
                entry.pool.slave_down(addr, FreezeReason::Manager).await;
                entry.pool.node_down(addr).await;
            }

            if let Some(p) = state.partitions.get_mut(&current_node_id) {
                p.slave_addresses = new_part.slave_addresses.clone();
                p.failed_slave_addresses = new_part.failed_slave_addresses.clone();
            }
        }
    }

    async fn check_slots_migration(
        &self,
        state: &mut MonitorState,
        new_partitions: &HashMap<NodeId, ClusterPartition>,
    ) {
        let mut changed_slots: Vec<u16> = Vec::new();
        let node_ids: Vec<NodeId> = state.partitions.keys().cloned().collect();

        for node_id in node_ids {
            let Some(new_part) = new_partitions.get(&node_id) else { continue };
            let Some(entry) = self.registry.get(&node_id) else { continue };
            let current_slots = state.partitions.get(&node_id).expect("just listed").slot_set();
            let new_slots = new_part.slot_set();

            let added: Vec<u16> = new_slots.difference(&current_slots).copied().collect();
            let removed: Vec<u16> = current_slots.difference(&new_slots).copied().collect();

            for slot in &added {
                self.router.install(*slot, entry.clone(), &self.registry).await;
                state.slot_owner[*slot as usize] = Some(node_id.clone());
                changed_slots.push(*slot);
            }
            for slot in &removed {
                self.router.evict(*slot, &self.registry).await;
                state.slot_owner[*slot as usize] = None;
                changed_slots.push(*slot);
            }
            if !added.is_empty() || !removed.is_empty() {
                if let Some(p) = state.partitions.get_mut(&node_id) {
                    p.slot_ranges = new_part.slot_ranges.clone();
                }
                info!(node_id = %node_id, added = added.len(), removed = removed.len(), "slot migration applied");
            }
        }

        for slot in changed_slots {
            self.subscribe.reattach_pubsub(slot).await;
        }
    }

    async fn check_slots_change(&self, state: &mut MonitorState, new_partitions: &HashMap<NodeId, ClusterPartition>) {
        let new_coverage: usize = new_partitions.values().map(|p| p.slot_count()).sum();
        let current_coverage = state.slot_owner.iter().filter(|o| o.is_some()).count();
        if new_coverage == current_coverage && new_coverage == NUM_SLOTS {
            return;
        }

        let new_owner_by_slot = build_owner_index(new_partitions);

        for slot in 0..NUM_SLOTS {
            if state.slot_owner[slot].is_some() && new_owner_by_slot[slot].is_none() {
                self.router.evict(slot as u16, &self.registry).await;
                state.slot_owner[slot] = None;
            }
        }

        for new_part in new_partitions.values() {
            let Some(addr) = &new_part.master_address else { continue };
            for slot in new_part.slots() {
                if state.slot_owner[slot as usize].is_none() {
                    if let Some(entry) = self.registry.entry_for_uri(addr) {
                        self.router.install(slot, entry.clone(), &self.registry).await;
                        state.slot_owner[slot as usize] = Some(new_part.node_id.clone());
                    }
                }
            }
        }
        info!(new_coverage, current_coverage, "global slot coverage reconciled");
    }
}
