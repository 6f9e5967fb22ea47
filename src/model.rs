// src/model.rs

//! Canonical data model: node addresses, flags, slot ranges, and partitions.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::slot::NUM_SLOTS;

/// Opaque, server-assigned node identifier. Stable across reconnects.
pub type NodeId = String;

/// A resolved or unresolved network address for a cluster node's client port.
///
/// Equality and ordering are by `(host, port)` only, per the spec's data model —
/// the `tls` flag is carried for dialing but doesn't distinguish identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }
}

impl PartialEq for NodeAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}
impl Eq for NodeAddress {}

impl std::hash::Hash for NodeAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl PartialOrd for NodeAddress {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for NodeAddress {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.host, self.port).cmp(&(&other.host, other.port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

bitflags! {
    /// Flags reported for a node in a `CLUSTER NODES` record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u16 {
        const MASTER    = 1 << 0;
        const SLAVE     = 1 << 1;
        const FAIL      = 1 << 2;
        const PFAIL     = 1 << 3;
        const NOADDR    = 1 << 4;
        const HANDSHAKE = 1 << 5;
        const MYSELF    = 1 << 6;
    }
}

/// A closed interval of slots, `[start, end]` with `start <= end < NUM_SLOTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Self {
        debug_assert!(start <= end && (end as usize) < NUM_SLOTS);
        Self { start, end }
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.start..=self.end
    }
}

/// One gossip record as reported by `CLUSTER NODES`, before canonicalization.
#[derive(Debug, Clone)]
pub struct RawNodeInfo {
    pub node_id: NodeId,
    pub address: Option<NodeAddress>,
    pub flags: NodeFlags,
    /// `node_id` of the master this node replicates, if it is a SLAVE.
    pub slave_of: Option<NodeId>,
    pub slot_ranges: Vec<SlotRange>,
}

impl RawNodeInfo {
    pub fn is_master(&self) -> bool {
        self.flags.contains(NodeFlags::MASTER)
    }

    pub fn is_slave(&self) -> bool {
        self.flags.contains(NodeFlags::SLAVE)
    }

    pub fn is_failed(&self) -> bool {
        self.flags.contains(NodeFlags::FAIL)
    }
}

/// Whether a canonical partition currently represents a master or a (pre-flattening)
/// slave view. Only `Master` partitions are ever emitted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Master,
    Slave,
}

/// A canonical partition: one logical master and the slaves currently replicating it.
///
/// `parent` is populated only transiently, while the parser is flattening cascaded
/// slaves (a slave reported as `slave_of` another slave); it never appears on a
/// partition returned from `Parser::parse`.
#[derive(Debug, Clone)]
pub struct ClusterPartition {
    pub node_id: NodeId,
    pub partition_type: PartitionType,
    pub master_address: Option<NodeAddress>,
    pub slave_addresses: BTreeSet<NodeAddress>,
    pub failed_slave_addresses: BTreeSet<NodeAddress>,
    pub slot_ranges: Vec<SlotRange>,
    pub master_fail: bool,
    /// `node_id` of the partition this one is nested under, while type is still `Slave`.
    pub parent: Option<NodeId>,
}

impl ClusterPartition {
    pub fn new_master(node_id: NodeId) -> Self {
        Self {
            node_id,
            partition_type: PartitionType::Master,
            master_address: None,
            slave_addresses: BTreeSet::new(),
            failed_slave_addresses: BTreeSet::new(),
            slot_ranges: Vec::new(),
            master_fail: false,
            parent: None,
        }
    }

    pub fn new_slave(node_id: NodeId, parent: NodeId) -> Self {
        Self {
            node_id,
            partition_type: PartitionType::Slave,
            master_address: None,
            slave_addresses: BTreeSet::new(),
            failed_slave_addresses: BTreeSet::new(),
            slot_ranges: Vec::new(),
            master_fail: false,
            parent: Some(parent),
        }
    }

    /// Number of slots this partition currently owns, counted from `slot_ranges`.
    pub fn slot_count(&self) -> usize {
        self.slot_ranges.iter().map(|r| r.iter().count()).sum()
    }

    pub fn owns_slot(&self, slot: u16) -> bool {
        self.slot_ranges.iter().any(|r| r.contains(slot))
    }

    pub fn slots(&self) -> impl Iterator<Item = u16> + '_ {
        self.slot_ranges.iter().flat_map(|r| r.iter())
    }

    /// Expands `slot_ranges` into an explicit slot set, as §3 describes as a bitset.
    pub fn slot_set(&self) -> BTreeSet<u16> {
        self.slots().collect()
    }
}
