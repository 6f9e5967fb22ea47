// src/bootstrap.rs

//! Bootstrap (§4.D): seed discovery from the configured static address list.
//! Tries each seed in order, stops at the first that yields a usable
//! snapshot, and populates the Router and Registry from it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ClusterTopologyConfig;
use crate::control::fetch_cluster_nodes;
use crate::error::{ClusterError, Result};
use crate::model::{ClusterPartition, NodeAddress, NodeId};
use crate::parser::parse;
use crate::registry::Registry;
use crate::resolver::AddressResolver;
use crate::router::Router;
use crate::slot::NUM_SLOTS;

/// What bootstrap learned, handed to the monitor so its first tick diffs
/// against reality instead of an empty snapshot.
pub struct BootstrapOutcome {
    pub config_endpoint: Option<(String, u16)>,
    pub last_cluster_node: NodeAddress,
    pub partitions: HashMap<NodeId, ClusterPartition>,
}

fn split_seed(seed: &str) -> Option<(&str, u16)> {
    let (host, port) = seed.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host, port))
}

/// A seed is recorded as the hostname endpoint only when exactly one was
/// configured and it isn't already a literal IP.
fn derive_config_endpoint(addresses: &[String]) -> Option<(String, u16)> {
    let [single] = addresses else { return None };
    let (host, port) = split_seed(single)?;
    if host.parse::<IpAddr>().is_ok() {
        None
    } else {
        Some((host.to_string(), port))
    }
}

async fn try_seed(
    seed: &str,
    config: &ClusterTopologyConfig,
    resolver: &dyn AddressResolver,
) -> Result<(NodeAddress, Vec<crate::model::RawNodeInfo>)> {
    let (host, port) = split_seed(seed).ok_or_else(|| ClusterError::Connect {
        addr: seed.to_string(),
        reason: "malformed seed address, expected host:port".into(),
    })?;

    let sockets = resolver
        .resolve_all(host, port)
        .await
        .map_err(|e| ClusterError::Connect {
            addr: seed.to_string(),
            reason: format!("seed resolution failed: {e}"),
        })?;
    let socket = sockets.first().ok_or_else(|| ClusterError::Connect {
        addr: seed.to_string(),
        reason: "seed resolved to no addresses".into(),
    })?;

    let resolved = NodeAddress::new(socket.ip().to_string(), port, config.tls_enabled);

    let raw_nodes = fetch_cluster_nodes(
        &resolved,
        config.tls_enabled,
        Some(host),
        config.connect_timeout(),
        config.response_timeout(),
    )
    .await?;
    Ok((resolved, raw_nodes))
}

/// Runs bootstrap to completion, populating `router` and `registry` with
/// every non-failed master partition found in the winning snapshot.
pub async fn bootstrap(
    config: &ClusterTopologyConfig,
    resolver: &dyn AddressResolver,
    router: &Router,
    registry: &Registry,
) -> Result<BootstrapOutcome> {
    if config.node_addresses.is_empty() {
        return Err(ClusterError::Fatal("no seed addresses configured".into()));
    }

    let config_endpoint = derive_config_endpoint(&config.node_addresses);

    let mut failed_seeds: Vec<String> = Vec::new();
    let mut winning: Option<(NodeAddress, HashMap<NodeId, ClusterPartition>)> = None;

    for seed in &config.node_addresses {
        match try_seed(seed, config, resolver).await {
            Ok((addr, raw_nodes)) => {
                let partitions = parse(raw_nodes, resolver).await;
                info!(seed = %seed, partitions = partitions.len(), "bootstrap snapshot accepted");
                winning = Some((addr, partitions));
                break;
            }
            Err(e) => {
                warn!(seed = %seed, error = %e, "bootstrap candidate failed, trying next seed");
                failed_seeds.push(format!("{seed}: {e}"));
            }
        }
    }

    let Some((last_cluster_node, partitions)) = winning else {
        let reason = if failed_seeds.is_empty() {
            "no seeds configured".to_string()
        } else {
            failed_seeds.join("; ")
        };
        return Err(ClusterError::Fatal(format!("all seeds exhausted: {reason}")));
    };

    let sni = config_endpoint.as_ref().map(|(host, _)| host.clone());
    let mut failed_masters = Vec::new();
    let results = futures::future::join_all(partitions.values().filter(|p| !p.master_fail).map(|p| {
        let sni = sni.clone();
        async move { (p.node_id.clone(), registry.add_master_entry(p, sni.as_deref()).await) }
    }))
    .await;

    let mut covered_slots = 0usize;
    for (node_id, result) in results {
        match result {
            Ok(entry) => {
                if let Some(partition) = partitions.get(&node_id) {
                    for slot in partition.slots() {
                        router.install(slot, entry.clone(), registry).await;
                        covered_slots += 1;
                    }
                }
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "failed to add master entry during bootstrap");
                failed_masters.push(node_id);
            }
        }
    }

    if covered_slots == 0 {
        return Err(ClusterError::Fatal(format!(
            "parsed snapshot produced no usable master entries; failed masters: {failed_masters:?}"
        )));
    }

    if config.check_slots_coverage && covered_slots < NUM_SLOTS {
        return Err(ClusterError::Coverage {
            covered: covered_slots,
            total: NUM_SLOTS,
        });
    }

    Ok(BootstrapOutcome {
        config_endpoint,
        last_cluster_node,
        partitions,
    })
}
