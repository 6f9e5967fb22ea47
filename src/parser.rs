// src/parser.rs

//! The Partition Parser (§4.B): turns a `CLUSTER NODES` snapshot into the
//! canonical set of master partitions. Two stages: `parse_cluster_nodes_text`
//! turns the wire's newline-delimited records into `RawNodeInfo`, and `parse`
//! turns those into `ClusterPartition`s, resolving addresses and flattening
//! cascaded slaves along the way.

use futures::future::join_all;
use std::collections::HashMap;
use tracing::warn;

use crate::error::ClusterError;
use crate::model::{ClusterPartition, NodeAddress, NodeFlags, NodeId, PartitionType, RawNodeInfo, SlotRange};
use crate::resolver::AddressResolver;

/// Parses one `CLUSTER NODES` reply body into its per-node gossip records.
/// Malformed individual lines are skipped rather than failing the whole
/// parse — a single stray or truncated line must not take down an otherwise
/// healthy snapshot.
pub fn parse_cluster_nodes_text(text: &str) -> Vec<RawNodeInfo> {
    text.lines().filter_map(parse_node_line).collect()
}

fn parse_node_line(line: &str) -> Option<RawNodeInfo> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.split_whitespace();
    let node_id = fields.next()?.to_string();
    let addr_field = fields.next()?;
    let flags_field = fields.next()?;
    let master_field = fields.next()?;
    let _ping_sent = fields.next()?;
    let _pong_recv = fields.next()?;
    let _config_epoch = fields.next()?;
    let _link_state = fields.next()?;

    let flags = parse_flags(flags_field);
    let address = parse_address(addr_field, flags.contains(NodeFlags::NOADDR));
    let slave_of = if master_field == "-" {
        None
    } else {
        Some(master_field.to_string())
    };
    let slot_ranges = fields.filter_map(parse_slot_token).collect();

    Some(RawNodeInfo {
        node_id,
        address,
        flags,
        slave_of,
        slot_ranges,
    })
}

fn parse_flags(field: &str) -> NodeFlags {
    let mut flags = NodeFlags::empty();
    for name in field.split(',') {
        flags |= match name {
            "master" => NodeFlags::MASTER,
            "slave" => NodeFlags::SLAVE,
            "fail" => NodeFlags::FAIL,
            "fail?" => NodeFlags::PFAIL,
            "noaddr" => NodeFlags::NOADDR,
            "handshake" => NodeFlags::HANDSHAKE,
            "myself" => NodeFlags::MYSELF,
            _ => NodeFlags::empty(),
        };
    }
    flags
}

/// Parses a `host:port[@cport]` address token. An empty string (possible per
/// §6 when the reporting node has no address for this peer yet) or a
/// `NOADDR`-flagged record yields `None`.
fn parse_address(field: &str, noaddr: bool) -> Option<NodeAddress> {
    if noaddr || field.is_empty() || field == ":0" {
        return None;
    }
    let without_bus = field.split('@').next().unwrap_or(field);
    let (host, port) = without_bus.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some(NodeAddress::new(host, port, false))
}

/// Parses one slot token. Migrating/importing tokens (`[slot-><dst]` /
/// `[slot-<src]`) are ignored for partition assignment per §6.
fn parse_slot_token(token: &str) -> Option<SlotRange> {
    if token.starts_with('[') {
        return None;
    }
    match token.split_once('-') {
        Some((a, b)) => {
            let start: u16 = a.parse().ok()?;
            let end: u16 = b.parse().ok()?;
            if start > end {
                return None;
            }
            Some(SlotRange::new(start, end))
        }
        None => {
            let slot: u16 = token.parse().ok()?;
            Some(SlotRange::new(slot, slot))
        }
    }
}

/// Turns a raw snapshot into the canonical partition set (§4.B steps 1-8).
///
/// The working map keyed by node_id, including transient slave entries and
/// their `parent` links, lives entirely inside this call and is discarded
/// before it returns — only `type == Master` partitions with a resolved
/// address are emitted.
pub async fn parse(
    raw_nodes: Vec<RawNodeInfo>,
    resolver: &dyn AddressResolver,
) -> HashMap<NodeId, ClusterPartition> {
    // Steps 1-3: filter and derive the effective master id.
    let candidates: Vec<(RawNodeInfo, NodeId)> = raw_nodes
        .into_iter()
        .filter(|n| {
            !n.flags.contains(NodeFlags::NOADDR)
                && !n.flags.contains(NodeFlags::HANDSHAKE)
                && n.address.is_some()
                && !(n.is_master() && n.slot_ranges.is_empty())
        })
        .filter_map(|n| {
            let effective_master = if n.is_slave() {
                n.slave_of.clone()
            } else {
                Some(n.node_id.clone())
            };
            effective_master.map(|m| (n, m))
        })
        .collect();

    // Step 4: resolve every surviving node's address concurrently.
    let resolutions = join_all(candidates.iter().map(|(node, _)| async move {
        let addr = node.address.as_ref().expect("filtered above");
        match resolver.resolve_all(&addr.host, addr.port).await {
            Ok(mut socks) if !socks.is_empty() => {
                let sock = socks.remove(0);
                Ok(NodeAddress::new(sock.ip().to_string(), addr.port, addr.tls))
            }
            Ok(_) => Err(ClusterError::Resolve {
                node_id: node.node_id.clone(),
                host: addr.host.clone(),
                reason: "resolver returned no addresses".into(),
            }),
            Err(e) => Err(ClusterError::Resolve {
                node_id: node.node_id.clone(),
                host: addr.host.clone(),
                reason: e.to_string(),
            }),
        }
    }))
    .await;

    let mut partitions: HashMap<NodeId, ClusterPartition> = HashMap::new();

    for ((node, effective_master), resolved) in candidates.into_iter().zip(resolutions) {
        // Resolution failures demote only the affected node (§4.B, §7).
        let resolved_addr = match resolved {
            Ok(addr) => addr,
            Err(e) => {
                warn!(node_id = %node.node_id, error = %e, "address resolution failed, skipping node");
                continue;
            }
        };

        if node.is_slave() {
            let master_part = partitions
                .entry(effective_master.clone())
                .or_insert_with(|| ClusterPartition::new_master(effective_master.clone()));
            master_part.slave_addresses.insert(resolved_addr.clone());
            if node.is_failed() {
                master_part.failed_slave_addresses.insert(resolved_addr.clone());
            }

            let slave_part = partitions
                .entry(node.node_id.clone())
                .or_insert_with(|| ClusterPartition::new_slave(node.node_id.clone(), effective_master.clone()));
            slave_part.partition_type = PartitionType::Slave;
            slave_part.parent = Some(effective_master.clone());
        } else {
            let master_part = partitions
                .entry(node.node_id.clone())
                .or_insert_with(|| ClusterPartition::new_master(node.node_id.clone()));
            master_part.partition_type = PartitionType::Master;
            master_part.master_address = Some(resolved_addr);
            master_part.slot_ranges.extend(node.slot_ranges.iter().copied());
            if node.is_failed() {
                master_part.master_fail = true;
            }
        }
    }

    // Step 7: flatten cascaded slaves up to their real master.
    let slave_ids: Vec<NodeId> = partitions
        .iter()
        .filter(|(_, p)| p.partition_type == PartitionType::Slave)
        .map(|(id, _)| id.clone())
        .collect();

    for slave_id in slave_ids {
        let Some(slave) = partitions.get(&slave_id) else {
            continue;
        };
        let Some(parent_id) = slave.parent.clone() else {
            continue;
        };
        let slave_addresses = slave.slave_addresses.clone();
        let failed_slave_addresses = slave.failed_slave_addresses.clone();
        if let Some(parent) = partitions.get_mut(&parent_id) {
            parent.slave_addresses.extend(slave_addresses);
            parent.failed_slave_addresses.extend(failed_slave_addresses);
        }
        partitions.remove(&slave_id);
    }

    // Step 8: emit only fully-formed masters.
    partitions.retain(|_, p| p.partition_type == PartitionType::Master && p.master_address.is_some());
    partitions
}
